//! Torrent list column model.
//!
//! Every column owns one or more cells in a flat row store; `cell_index`
//! records which. Adding and removing columns keeps those indices dense.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellType {
    Bool,
    Str,
    Int,
    UInt64,
    Float,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// Bookkeeping cells that are never shown.
    Hidden,
    Text,
    Size,
    Progress,
    Speed,
    Peers,
    Time,
    Date,
    Ratio,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub kind: ColumnKind,
    pub cell_indices: Vec<usize>,
    /// Status keys this column renders.
    pub status_fields: Vec<String>,
    pub visible: bool,
    pub position: usize,
    pub width: u16,
}

/// Persisted per-column view state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnState {
    pub name: String,
    pub position: usize,
    pub visible: bool,
    pub width: u16,
}

#[derive(Debug, Clone)]
pub struct ColumnModel {
    column_index: Vec<String>,
    cell_types: Vec<CellType>,
    columns: HashMap<String, Column>,
}

impl Default for ColumnModel {
    fn default() -> Self {
        use CellType::*;
        use ColumnKind as K;

        let mut model = Self {
            column_index: Vec::new(),
            cell_types: Vec::new(),
            columns: HashMap::new(),
        };
        model.add_column("filter", K::Hidden, &[Bool], &[], false, 0);
        model.add_column("torrent_id", K::Hidden, &[Str], &[], false, 0);
        model.add_column("dirty", K::Hidden, &[Bool], &[], false, 0);
        model.add_column("#", K::Text, &[Int], &["queue"], true, 4);
        model.add_column("Name", K::Text, &[Str, Str], &["state", "name"], true, 36);
        model.add_column("Size", K::Size, &[UInt64], &["total_wanted"], true, 10);
        model.add_column("Downloaded", K::Size, &[UInt64], &["all_time_download"], false, 10);
        model.add_column("Uploaded", K::Size, &[UInt64], &["total_uploaded"], false, 10);
        model.add_column("Remaining", K::Size, &[UInt64], &["total_remaining"], false, 10);
        model.add_column("Progress", K::Progress, &[Float, Str], &["progress", "state"], true, 16);
        model.add_column("Seeds", K::Peers, &[Int, Int], &["num_seeds", "total_seeds"], true, 9);
        model.add_column("Peers", K::Peers, &[Int, Int], &["num_peers", "total_peers"], true, 9);
        model.add_column("Seeds:Peers", K::Ratio, &[Float], &["seeds_peers_ratio"], false, 6);
        model.add_column("Down Speed", K::Speed, &[Int], &["download_payload_rate"], true, 11);
        model.add_column("Up Speed", K::Speed, &[Int], &["upload_payload_rate"], true, 11);
        model.add_column("Down Limit", K::Speed, &[Float], &["max_download_speed"], false, 11);
        model.add_column("Up Limit", K::Speed, &[Float], &["max_upload_speed"], false, 11);
        model.add_column("ETA", K::Time, &[Int], &["eta"], true, 8);
        model.add_column("Ratio", K::Ratio, &[Float], &["ratio"], false, 6);
        model.add_column("Avail", K::Ratio, &[Float], &["distributed_copies"], false, 6);
        model.add_column("Added", K::Date, &[Int], &["time_added"], false, 16);
        model.add_column("Completed", K::Date, &[Int], &["completed_time"], false, 16);
        model.add_column("Complete Seen", K::Date, &[Int], &["last_seen_complete"], false, 16);
        model.add_column("Tracker", K::Text, &[Str, Str], &["tracker_host", "tracker_host"], false, 16);
        model.add_column("Download Folder", K::Text, &[Str], &["download_location"], false, 20);
        model.add_column("Owner", K::Text, &[Str], &["owner"], false, 10);
        model.add_column("Shared", K::Text, &[Bool], &["shared"], false, 6);
        model
    }
}

impl ColumnModel {
    pub fn new() -> Self {
        Self::default()
    }

    fn add_column(
        &mut self,
        name: &str,
        kind: ColumnKind,
        cell_types: &[CellType],
        status_fields: &[&str],
        visible: bool,
        width: u16,
    ) {
        let first = self.cell_types.len();
        self.cell_types.extend_from_slice(cell_types);
        let column = Column {
            name: name.to_string(),
            kind,
            cell_indices: (first..first + cell_types.len()).collect(),
            status_fields: status_fields.iter().map(|s| s.to_string()).collect(),
            visible: visible && kind != ColumnKind::Hidden,
            position: self.column_index.len(),
            width,
        };
        self.column_index.push(name.to_string());
        self.columns.insert(name.to_string(), column);
    }

    pub fn add_text_column(&mut self, name: &str, status_field: &[&str]) {
        self.add_column(name, ColumnKind::Text, &[CellType::Str], status_field, true, 12);
    }

    pub fn add_progress_column(&mut self, name: &str, status_field: &[&str], col_types: &[CellType]) {
        self.add_column(name, ColumnKind::Progress, col_types, status_field, true, 16);
    }

    /// Drop a column and its cells, shifting the cells of later columns down.
    pub fn remove_column(&mut self, name: &str) -> bool {
        let Some(removed) = self.columns.remove(name) else {
            return false;
        };
        let count = removed.cell_indices.len();
        if let Some(&first) = removed.cell_indices.first() {
            self.cell_types.drain(first..first + count);
            for column in self.columns.values_mut() {
                for idx in &mut column.cell_indices {
                    if *idx > first {
                        *idx -= count;
                    }
                }
            }
        }
        self.column_index.retain(|c| c != name);
        for column in self.columns.values_mut() {
            if column.position > removed.position {
                column.position -= 1;
            }
        }
        true
    }

    pub fn column_index(&self) -> &[String] {
        &self.column_index
    }

    pub fn cell_types(&self) -> &[CellType] {
        &self.cell_types
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.get(name)
    }

    pub fn set_visible(&mut self, name: &str, visible: bool) {
        if let Some(c) = self.columns.get_mut(name) {
            if c.kind != ColumnKind::Hidden {
                c.visible = visible;
            }
        }
    }

    /// Visible columns in display order.
    pub fn visible_columns(&self) -> Vec<&Column> {
        let mut cols: Vec<&Column> = self.columns.values().filter(|c| c.visible).collect();
        cols.sort_by_key(|c| c.position);
        cols
    }

    pub fn state(&self) -> Vec<ColumnState> {
        self.column_index
            .iter()
            .filter_map(|name| self.columns.get(name))
            .filter(|c| c.kind != ColumnKind::Hidden)
            .map(|c| ColumnState {
                name: c.name.clone(),
                position: c.position,
                visible: c.visible,
                width: c.width,
            })
            .collect()
    }

    pub fn save_state(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(&self.state())?)?;
        tracing::debug!("Saved column state to {}", path.display());
        Ok(())
    }

    /// Apply saved state. Unknown columns in the file are ignored; a missing
    /// file leaves the defaults alone.
    pub fn load_state(&mut self, path: &Path) -> anyhow::Result<()> {
        let data = match std::fs::read_to_string(path) {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        let states: Vec<ColumnState> = serde_json::from_str(&data)?;
        for state in states {
            if let Some(c) = self.columns.get_mut(&state.name) {
                if c.kind == ColumnKind::Hidden {
                    continue;
                }
                c.visible = state.visible;
                c.position = state.position;
                c.width = state.width;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEFAULT_COLUMN_INDEX: [&str; 27] = [
        "filter", "torrent_id", "dirty", "#", "Name", "Size", "Downloaded", "Uploaded",
        "Remaining", "Progress", "Seeds", "Peers", "Seeds:Peers", "Down Speed", "Up Speed",
        "Down Limit", "Up Limit", "ETA", "Ratio", "Avail", "Added", "Completed",
        "Complete Seen", "Tracker", "Download Folder", "Owner", "Shared",
    ];

    fn default_cell_types() -> Vec<CellType> {
        use CellType::*;
        vec![
            Bool, Str, Bool, Int, Str, Str, UInt64, UInt64, UInt64, UInt64, Float, Str, Int, Int,
            Int, Int, Float, Int, Int, Float, Float, Int, Float, Float, Int, Int, Int, Str, Str,
            Str, Str, Bool,
        ]
    }

    #[test]
    fn test_default_columns() {
        let model = ColumnModel::new();
        assert_eq!(model.column_index(), DEFAULT_COLUMN_INDEX);
        assert_eq!(model.cell_types(), default_cell_types().as_slice());
        assert_eq!(model.column("Download Folder").unwrap().cell_indices, vec![29]);
        assert_eq!(model.column("Progress").unwrap().cell_indices, vec![10, 11]);
    }

    #[test]
    fn test_add_columns() {
        let mut model = ColumnModel::new();
        model.add_text_column("Test column", &["label"]);
        model.add_text_column("Test column2", &["label2"]);
        assert_eq!(model.cell_types().len(), default_cell_types().len() + 2);
        assert_eq!(model.column_index().len(), DEFAULT_COLUMN_INDEX.len() + 2);
        assert_eq!(model.column_index()[DEFAULT_COLUMN_INDEX.len()], "Test column");
        assert_eq!(model.column("Test column").unwrap().cell_indices, vec![32]);
        assert_eq!(model.column("Test column2").unwrap().cell_indices, vec![33]);
    }

    #[test]
    fn test_remove_columns() {
        let mut model = ColumnModel::new();
        model.add_text_column("Test column", &["label"]);
        model.add_text_column("Test column2", &["label2"]);

        assert!(model.remove_column("Test column"));
        assert_eq!(model.column_index().last().unwrap(), "Test column2");
        assert_eq!(model.column("Test column2").unwrap().cell_indices, vec![32]);

        assert!(model.remove_column("Test column2"));
        assert!(!model.remove_column("Test column2"));
        assert_eq!(model.column_index(), DEFAULT_COLUMN_INDEX);
        assert_eq!(model.cell_types(), default_cell_types().as_slice());
        assert_eq!(model.column("Shared").unwrap().cell_indices, vec![31]);
    }

    #[test]
    fn test_add_remove_multiple_cell_column() {
        let mut model = ColumnModel::new();
        model.add_progress_column(
            "Test column3",
            &["progress", "label3"],
            &[CellType::Float, CellType::Str],
        );
        assert_eq!(model.cell_types().len(), default_cell_types().len() + 2);
        assert_eq!(model.column_index().len(), DEFAULT_COLUMN_INDEX.len() + 1);
        assert_eq!(model.column("Test column3").unwrap().cell_indices, vec![32, 33]);

        model.remove_column("Test column3");
        assert_eq!(model.cell_types(), default_cell_types().as_slice());
        assert_eq!(model.column("Shared").unwrap().cell_indices, vec![31]);
    }

    #[test]
    fn test_removing_middle_column_shifts_later_cells() {
        let mut model = ColumnModel::new();
        model.remove_column("Progress");
        assert_eq!(model.column("Seeds").unwrap().cell_indices, vec![10, 11]);
        assert_eq!(model.column("Shared").unwrap().cell_indices, vec![29]);
        assert_eq!(model.column("Size").unwrap().cell_indices, vec![6]);
    }

    #[test]
    fn test_state_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ui_state").join("torrentview.state");

        let mut model = ColumnModel::new();
        model.set_visible("Ratio", true);
        model.set_visible("Size", false);
        model.set_visible("filter", true);
        model.save_state(&path).unwrap();

        let mut fresh = ColumnModel::new();
        fresh.load_state(&path).unwrap();
        assert!(fresh.column("Ratio").unwrap().visible);
        assert!(!fresh.column("Size").unwrap().visible);
        assert!(!fresh.column("filter").unwrap().visible);
        let names: Vec<_> = fresh.visible_columns().iter().map(|c| c.name.clone()).collect();
        assert_eq!(names.first().map(String::as_str), Some("#"));
        assert!(names.contains(&"Ratio".to_string()));

        let mut untouched = ColumnModel::new();
        untouched.load_state(&dir.path().join("missing")).unwrap();
        assert!(untouched.column("Size").unwrap().visible);
    }
}
