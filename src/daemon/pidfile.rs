//! `deluged.pid` handling. The file holds `<pid>;<port>` and guards a config
//! directory against a second daemon.

use std::fs;
use std::net::{SocketAddr, TcpStream};
use std::path::Path;
use std::time::Duration;

use crate::common::is_process_running;

pub const PID_FILE: &str = "deluged.pid";

pub fn write_pid_file(path: &Path, pid: u32, port: u16) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, format!("{};{}\n", pid, port))
}

/// `(pid, port)` from a daemon PID file; `None` when unreadable or malformed.
pub fn read_pid_file(path: &Path) -> Option<(u32, u16)> {
    let content = fs::read_to_string(path).ok()?;
    let line = content.lines().next()?.trim();
    let (pid, port) = line.split_once(';')?;
    Some((pid.trim().parse().ok()?, port.trim().parse().ok()?))
}

pub fn remove_pid_file(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => tracing::debug!("Removed pid file {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("Unable to remove pid file {}: {}", path.display(), e),
    }
}

/// A daemon owns `pid_file` when its process is alive and its RPC port
/// accepts connections on localhost.
pub fn is_daemon_running(pid_file: &Path) -> bool {
    let Some((pid, port)) = read_pid_file(pid_file) else {
        return false;
    };
    if !is_process_running(pid) {
        return false;
    }
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    TcpStream::connect_timeout(&addr, Duration::from_millis(500)).is_ok()
}
