//! Helpers shared by the daemon, the UI shell and the web pages.
//!
//! Formatting of sizes, speeds and durations, magnet-link handling, version
//! comparison, filesystem/process checks and shutdown signals.

pub mod format;
pub mod magnet;
pub mod profile;
pub mod signals;
pub mod size;
pub mod system;
pub mod version;

pub use format::{fdate, fpcnt, fpcnt_with, fpeer, fsize, fsize_with, fspeed, fspeed_with, ftime};
pub use magnet::{create_magnet_uri, get_magnet_info, is_infohash, is_magnet, is_url, MagnetInfo};
pub use profile::run_profiled;
pub use signals::cancel_on_signal;
pub use size::{parse_human_size, tokenize, InvalidSize, Token};
pub use system::{free_space, get_path_size, is_ip, is_process_running};
pub use version::VersionSplit;

/// Version string reported by the daemon and the clients.
pub fn get_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Default location torrents are downloaded to: `~/Downloads` when it exists,
/// otherwise the home directory.
pub fn get_default_download_dir() -> String {
    let home = home_dir();
    let downloads = home.join("Downloads");
    if downloads.is_dir() {
        downloads.to_string_lossy().into_owned()
    } else {
        home.to_string_lossy().into_owned()
    }
}

pub(crate) fn home_dir() -> std::path::PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(std::path::PathBuf::from)
            .unwrap_or_else(|_| std::path::PathBuf::from("."))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(std::path::PathBuf::from)
            .unwrap_or_else(|_| std::path::PathBuf::from("."))
    }
}
