//! Bottom status line: connection, transfer rates, RPC traffic.

use std::any::Any;

use deluge_core::common::fspeed;
use deluge_core::session::TorrentStatus;

use crate::component::Component;

#[derive(Debug, Default)]
pub struct StatusBar {
    connection: Option<String>,
    torrents: usize,
    download_rate: f64,
    upload_rate: f64,
    rpc: Option<String>,
}

impl StatusBar {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_connected(&mut self, host: &str, port: u16, version: &str) {
        self.connection = Some(format!("{}:{} (v{})", host, port, version));
    }

    pub fn set_torrents(&mut self, torrents: &[TorrentStatus]) {
        self.torrents = torrents.len();
        self.download_rate = torrents.iter().map(|t| t.download_payload_rate).sum();
        self.upload_rate = torrents.iter().map(|t| t.upload_payload_rate).sum();
    }

    pub fn set_rpc_stats(&mut self, line: String) {
        self.rpc = Some(line);
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Colour markup for the status line.
    pub fn markup(&self) -> String {
        let Some(conn) = &self.connection else {
            return "{!status!}Not Connected".to_string();
        };
        let mut line = format!(
            "{{!status!}}{} {{!status,-bold!}}| Torrents: {} | D: {} | U: {}",
            conn,
            self.torrents,
            fspeed(self.download_rate),
            fspeed(self.upload_rate),
        );
        if let Some(rpc) = &self.rpc {
            line.push_str(" | ");
            line.push_str(rpc);
        }
        line
    }
}

impl Component for StatusBar {
    fn name(&self) -> &'static str {
        "StatusBar"
    }

    fn stop(&mut self) {
        *self = Self::default();
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
