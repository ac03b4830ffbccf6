//! Filesystem, network-address and process checks.

use std::net::IpAddr;
use std::path::Path;

use walkdir::WalkDir;

#[derive(thiserror::Error, Debug)]
pub enum InvalidPathError {
    #[error("{0} is not a valid path")]
    NotFound(String),
    #[error("Unable to query free space for {path}: {reason}")]
    Query { path: String, reason: String },
}

/// Size in bytes of a file, or the summed size of all files below a directory.
///
/// Returns -1 when the path does not exist.
pub fn get_path_size(path: impl AsRef<Path>) -> i64 {
    let path = path.as_ref();
    if !path.exists() {
        return -1;
    }
    if path.is_file() {
        return path.metadata().map(|m| m.len() as i64).unwrap_or(-1);
    }
    WalkDir::new(path)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len() as i64)
        .sum()
}

/// Bytes available to unprivileged users on the filesystem holding `path`.
pub fn free_space(path: &str) -> Result<u64, InvalidPathError> {
    if path.is_empty() || !Path::new(path).exists() {
        return Err(InvalidPathError::NotFound(path.to_string()));
    }

    #[cfg(unix)]
    {
        let stat = nix::sys::statvfs::statvfs(path).map_err(|e| InvalidPathError::Query {
            path: path.to_string(),
            reason: e.to_string(),
        })?;
        #[allow(clippy::unnecessary_cast)]
        Ok(stat.blocks_available() as u64 * stat.fragment_size() as u64)
    }

    #[cfg(not(unix))]
    {
        use sysinfo::Disks;

        let target = std::fs::canonicalize(path).map_err(|e| InvalidPathError::Query {
            path: path.to_string(),
            reason: e.to_string(),
        })?;
        let disks = Disks::new_with_refreshed_list();
        disks
            .list()
            .iter()
            .filter(|d| target.starts_with(d.mount_point()))
            .max_by_key(|d| d.mount_point().as_os_str().len())
            .map(|d| d.available_space())
            .ok_or_else(|| InvalidPathError::Query {
                path: path.to_string(),
                reason: "no disk found for path".to_string(),
            })
    }
}

/// True for a literal IPv4 or IPv6 address.
pub fn is_ip(ip: &str) -> bool {
    ip.parse::<IpAddr>().is_ok()
}

/// Whether a process with this PID exists.
pub fn is_process_running(pid: u32) -> bool {
    #[cfg(unix)]
    {
        use nix::sys::signal::kill;
        use nix::unistd::Pid;

        match i32::try_from(pid) {
            // EPERM still means the process exists, it just belongs to someone else.
            Ok(raw) => match kill(Pid::from_raw(raw), None) {
                Ok(()) => true,
                Err(nix::errno::Errno::EPERM) => true,
                Err(_) => false,
            },
            Err(_) => false,
        }
    }

    #[cfg(not(unix))]
    {
        use sysinfo::{Pid, System};

        let mut sys = System::new();
        sys.refresh_processes();
        sys.process(Pid::from_u32(pid)).is_some()
    }
}
