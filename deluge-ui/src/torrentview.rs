//! Torrent list component: the column model plus the rows it renders.

use std::any::Any;
use std::path::PathBuf;

use deluge_core::common::{fdate, fpcnt, fpeer, fsize, fspeed, ftime};
use deluge_core::session::TorrentStatus;

use crate::columns::{Column, ColumnModel};
use crate::component::Component;

pub const STATE_FILE: &str = "torrentview.state";

pub struct TorrentView {
    model: ColumnModel,
    torrents: Vec<TorrentStatus>,
    selected: usize,
    state_path: PathBuf,
}

impl TorrentView {
    pub fn new(ui_state_dir: impl Into<PathBuf>) -> Self {
        let state_path = ui_state_dir.into().join(STATE_FILE);
        let mut model = ColumnModel::new();
        if let Err(e) = model.load_state(&state_path) {
            tracing::warn!("Unable to load torrent view state: {:#}", e);
        }
        Self {
            model,
            torrents: Vec::new(),
            selected: 0,
            state_path,
        }
    }

    pub fn model(&self) -> &ColumnModel {
        &self.model
    }

    pub fn model_mut(&mut self) -> &mut ColumnModel {
        &mut self.model
    }

    pub fn save_state(&self) -> anyhow::Result<()> {
        self.model.save_state(&self.state_path)
    }

    /// Replace the rows, ordered by queue position.
    pub fn set_torrents(&mut self, mut torrents: Vec<TorrentStatus>) {
        torrents.sort_by_key(|t| (t.queue < 0, t.queue, t.name.clone()));
        self.torrents = torrents;
        self.selected = self.selected.min(self.torrents.len().saturating_sub(1));
    }

    pub fn torrents(&self) -> &[TorrentStatus] {
        &self.torrents
    }

    pub fn selected(&self) -> usize {
        self.selected
    }

    pub fn select_next(&mut self) {
        if self.selected + 1 < self.torrents.len() {
            self.selected += 1;
        }
    }

    pub fn select_prev(&mut self) {
        self.selected = self.selected.saturating_sub(1);
    }

    /// Header labels of the visible columns.
    pub fn headers(&self) -> Vec<(String, u16)> {
        self.model
            .visible_columns()
            .into_iter()
            .map(|c| (c.name.clone(), c.width))
            .collect()
    }

    pub fn rows(&self) -> Vec<Vec<String>> {
        let columns = self.model.visible_columns();
        self.torrents
            .iter()
            .map(|t| columns.iter().map(|c| cell_text(c, t)).collect())
            .collect()
    }
}

fn speed_cell(bps: f64) -> String {
    if bps > 0.0 {
        fspeed(bps)
    } else {
        String::new()
    }
}

/// Limits are KiB/s; negative means unlimited.
fn limit_cell(kibps: f64) -> String {
    if kibps < 0.0 {
        String::new()
    } else {
        fspeed(kibps * 1024.0)
    }
}

fn ratio_cell(ratio: f64) -> String {
    if ratio < 0.0 {
        "∞".to_string()
    } else {
        format!("{:.3}", ratio)
    }
}

fn date_cell(secs: f64) -> String {
    if secs > 0.0 {
        fdate(secs, false, false)
    } else {
        String::new()
    }
}

/// Display text of one column for one torrent.
pub fn cell_text(column: &Column, t: &TorrentStatus) -> String {
    match column.name.as_str() {
        "#" if t.queue < 0 => String::new(),
        "#" => (t.queue + 1).to_string(),
        "Name" => t.name.clone(),
        "Size" => fsize(t.total_wanted),
        "Downloaded" => fsize(t.all_time_download),
        "Uploaded" => fsize(t.total_uploaded),
        "Remaining" => fsize(t.total_remaining),
        "Progress" => format!("{} {}", t.state, fpcnt(t.progress / 100.0)),
        "Seeds" => fpeer(t.num_seeds, t.total_seeds),
        "Peers" => fpeer(t.num_peers, t.total_peers),
        "Seeds:Peers" => ratio_cell(t.seeds_peers_ratio),
        "Down Speed" => speed_cell(t.download_payload_rate),
        "Up Speed" => speed_cell(t.upload_payload_rate),
        "Down Limit" => limit_cell(t.max_download_speed),
        "Up Limit" => limit_cell(t.max_upload_speed),
        "ETA" => ftime(t.eta),
        "Ratio" => ratio_cell(t.ratio),
        "Avail" => ratio_cell(t.distributed_copies),
        "Added" => date_cell(t.time_added),
        "Completed" => date_cell(t.completed_time),
        "Complete Seen" => date_cell(t.last_seen_complete),
        "Tracker" => t.tracker_host.clone(),
        "Download Folder" => t.download_location.clone(),
        "Owner" => t.owner.clone(),
        "Shared" => if t.shared { "Yes" } else { "No" }.to_string(),
        _ => String::new(),
    }
}

impl Component for TorrentView {
    fn name(&self) -> &'static str {
        "TorrentView"
    }

    fn stop(&mut self) {
        self.torrents.clear();
        self.selected = 0;
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn torrent(name: &str, queue: i64) -> TorrentStatus {
        TorrentStatus {
            id: format!("{:0>40}", queue.unsigned_abs()),
            name: name.into(),
            queue,
            state: "Downloading".into(),
            total_wanted: 2048,
            progress: 50.0,
            num_seeds: 3,
            total_seeds: 10,
            num_peers: 1,
            total_peers: -1,
            download_payload_rate: 0.0,
            upload_payload_rate: 1024.0,
            max_download_speed: -1.0,
            max_upload_speed: 5.0,
            eta: 100,
            ratio: -1.0,
            ..Default::default()
        }
    }

    fn cell(view: &TorrentView, name: &str, t: &TorrentStatus) -> String {
        cell_text(view.model().column(name).unwrap(), t)
    }

    #[test]
    fn test_cell_formatting() {
        let dir = tempfile::tempdir().unwrap();
        let view = TorrentView::new(dir.path());
        let t = torrent("ubuntu.iso", 0);
        assert_eq!(cell(&view, "#", &t), "1");
        assert_eq!(cell(&view, "#", &torrent("seed", -1)), "");
        assert_eq!(cell(&view, "Size", &t), "2.0 KiB");
        assert_eq!(cell(&view, "Progress", &t), "Downloading 50.00%");
        assert_eq!(cell(&view, "Seeds", &t), "3 (10)");
        assert_eq!(cell(&view, "Peers", &t), "1");
        assert_eq!(cell(&view, "Down Speed", &t), "");
        assert_eq!(cell(&view, "Up Speed", &t), "1.0 KiB/s");
        assert_eq!(cell(&view, "Down Limit", &t), "");
        assert_eq!(cell(&view, "Up Limit", &t), "5.0 KiB/s");
        assert_eq!(cell(&view, "ETA", &t), "1m 40s");
        assert_eq!(cell(&view, "Ratio", &t), "∞");
        assert_eq!(cell(&view, "Added", &t), "");
        assert_eq!(cell(&view, "Shared", &t), "No");
    }

    #[test]
    fn test_rows_follow_visible_columns_and_queue_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut view = TorrentView::new(dir.path());
        view.set_torrents(vec![torrent("seed", -1), torrent("b", 1), torrent("a", 0)]);
        let names: Vec<_> = view.torrents().iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "seed"]);

        let headers = view.headers();
        let rows = view.rows();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].len(), headers.len());
        assert_eq!(headers[0].0, "#");
        assert_eq!(rows[0][1], "a");
    }

    #[test]
    fn test_selection_clamps() {
        let dir = tempfile::tempdir().unwrap();
        let mut view = TorrentView::new(dir.path());
        view.set_torrents(vec![torrent("a", 0), torrent("b", 1)]);
        view.select_next();
        view.select_next();
        assert_eq!(view.selected(), 1);
        view.set_torrents(vec![torrent("a", 0)]);
        assert_eq!(view.selected(), 0);
        view.select_prev();
        assert_eq!(view.selected(), 0);
    }

    #[test]
    fn test_column_state_persists() {
        let dir = tempfile::tempdir().unwrap();
        let mut view = TorrentView::new(dir.path());
        view.model_mut().set_visible("Ratio", true);
        view.save_state().unwrap();
        assert!(dir.path().join(STATE_FILE).exists());

        let reloaded = TorrentView::new(dir.path());
        assert!(reloaded.model().column("Ratio").unwrap().visible);
    }
}
