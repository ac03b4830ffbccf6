//! `deluged` command line entry point.

use clap::{Args, Parser};
use std::path::{Path, PathBuf};
use tracing::level_filters::LevelFilter;

use crate::common::run_profiled;
use crate::config::{get_config_dir, resolve_config_dir};
use crate::daemon::{is_daemon_running, Daemon, DaemonOptions, PID_FILE};
use crate::error::DelugeError;
use crate::logging::{parse_log_level, setup_logging, LogOptions};
use crate::session::MemorySession;

/// Options every Deluge process understands.
#[derive(Debug, Clone, Args)]
pub struct ProcessArgs {
    /// Set the config directory path
    #[arg(short = 'c', long = "config", value_name = "config")]
    pub config: Option<PathBuf>,

    /// Output to specified logfile instead of stdout
    #[arg(short = 'l', long = "logfile", value_name = "file")]
    pub logfile: Option<PathBuf>,

    /// Set the log level (none, error, warning, info, debug, trace, garbage)
    #[arg(short = 'L', long = "loglevel", value_name = "level", default_value = "info", value_parser = parse_log_level)]
    pub loglevel: LevelFilter,

    /// Rotate the logfile daily
    #[arg(long)]
    pub logrotate: bool,

    /// Pidfile to store the process id
    #[arg(short = 'P', long = "pidfile", value_name = "file")]
    pub pidfile: Option<PathBuf>,

    /// Profile the process; results go to <file> or stdout
    #[arg(long, value_name = "file", num_args = 0..=1, default_missing_value = "")]
    pub profile: Option<String>,
}

#[derive(Debug, Clone, Parser)]
#[command(name = "deluged", version, about = "Deluge BitTorrent daemon")]
pub struct DaemonArgs {
    /// IP address to listen for UI connections
    #[arg(short = 'u', long = "ui-interface", value_name = "ip-addr")]
    pub ui_interface: Option<String>,

    /// Port to listen for UI connections on
    #[arg(short = 'p', long = "port", value_name = "port")]
    pub port: Option<u16>,

    /// IP address to listen for BitTorrent connections
    #[arg(short = 'i', long = "interface", value_name = "ip-addr")]
    pub listen_interface: Option<String>,

    /// Config keys to be unmodified by `set_config` RPC
    #[arg(long = "read-only-config-keys", value_name = "comma-separated-keys", default_value = "")]
    pub read_only_config_keys: String,

    #[command(flatten)]
    pub process: ProcessArgs,
}

impl DaemonArgs {
    pub fn read_only_keys(&self) -> Vec<String> {
        self.read_only_config_keys
            .split(',')
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string)
            .collect()
    }
}

fn already_running_message(pid_file: &Path) -> String {
    format!(
        "Cannot run multiple daemons using the same config directory.\n\
         If you believe this is an error, you can force a start by deleting: {}",
        pid_file.display()
    )
}

fn logging_failed_message(logfile: &Path, err: &anyhow::Error) -> String {
    format!("Unable to set up logging to {}: {:#}", logfile.display(), err)
}

/// Run the daemon described by `args`.
///
/// With `skip_start` the constructed daemon is returned without serving.
/// Any failure has already been logged when this returns `Err`; the caller
/// only needs to pick an exit code.
pub fn start_daemon(args: DaemonArgs, skip_start: bool) -> anyhow::Result<Option<Daemon>> {
    let config_dir = resolve_config_dir(args.process.config.as_deref());

    let pid_file = get_config_dir(&config_dir, PID_FILE);
    if is_daemon_running(&pid_file) {
        println!("{}", already_running_message(&pid_file));
        return Err(DelugeError::DaemonRunning.into());
    }

    let logfile = args
        .process
        .logfile
        .clone()
        .unwrap_or_else(|| get_config_dir(&config_dir, "deluged.log"));
    let _log_guard = match setup_logging(&LogOptions {
        level: args.process.loglevel,
        logfile: Some(logfile.clone()),
        rotate: args.process.logrotate,
        stdout: true,
    }) {
        Ok(guard) => guard,
        Err(e) => {
            // Nothing is listening to tracing yet.
            eprintln!("{}", logging_failed_message(&logfile, &e));
            return Err(e);
        }
    };

    if let Some(pidfile) = &args.process.pidfile {
        std::fs::write(pidfile, format!("{}\n", std::process::id()))?;
    }

    let options = DaemonOptions {
        listen_interface: args.listen_interface.clone(),
        ui_interface: args.ui_interface.clone(),
        port: args.port,
        read_only_config_keys: args.read_only_keys(),
        config_dir,
    };

    let run_daemon = || -> anyhow::Result<Option<Daemon>> {
        let daemon = Daemon::new(options, Box::new(MemorySession::new()))?;
        if skip_start {
            return Ok(Some(daemon));
        }
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?;
        runtime.block_on(daemon.start())?;
        Ok(None)
    };

    let profile_file = args.process.profile.as_deref().filter(|f| !f.is_empty()).map(Path::new);
    let result = run_profiled(run_daemon, args.process.profile.is_some(), profile_file);

    if let Some(pidfile) = &args.process.pidfile {
        if let Err(e) = std::fs::remove_file(pidfile) {
            tracing::warn!("Unable to remove pidfile {}: {}", pidfile.display(), e);
        }
    }

    if let Err(e) = &result {
        tracing::error!("{:#}", e);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_daemon_args() {
        let args = DaemonArgs::try_parse_from([
            "deluged",
            "-u",
            "0.0.0.0",
            "-p",
            "58900",
            "-i",
            "10.0.0.2",
            "--read-only-config-keys",
            "allow_remote, daemon_port,,",
            "-L",
            "warning",
            "--profile",
        ])
        .unwrap();
        assert_eq!(args.ui_interface.as_deref(), Some("0.0.0.0"));
        assert_eq!(args.port, Some(58900));
        assert_eq!(args.listen_interface.as_deref(), Some("10.0.0.2"));
        assert_eq!(args.read_only_keys(), vec!["allow_remote", "daemon_port"]);
        assert_eq!(args.process.loglevel, LevelFilter::WARN);
        assert_eq!(args.process.profile.as_deref(), Some(""));
    }

    #[test]
    fn test_parse_defaults_and_bad_level() {
        let args = DaemonArgs::try_parse_from(["deluged"]).unwrap();
        assert!(args.read_only_keys().is_empty());
        assert_eq!(args.process.loglevel, LevelFilter::INFO);
        assert!(args.process.profile.is_none());

        assert!(DaemonArgs::try_parse_from(["deluged", "-L", "shouty"]).is_err());
        assert!(DaemonArgs::try_parse_from(["deluged", "-p", "notaport"]).is_err());
    }

    #[test]
    fn test_already_running_message() {
        let msg = already_running_message(Path::new("/cfg/deluged.pid"));
        assert!(msg.starts_with("Cannot run multiple daemons using the same config directory."));
        assert!(msg.ends_with("force a start by deleting: /cfg/deluged.pid"));
    }

    #[test]
    fn test_skip_start_returns_daemon_and_removes_pidfile() {
        let dir = tempfile::tempdir().unwrap();
        let pidfile = dir.path().join("process.pid");
        let args = DaemonArgs::try_parse_from([
            "deluged",
            "-c",
            dir.path().to_str().unwrap(),
            "-p",
            "0",
            "-P",
            pidfile.to_str().unwrap(),
        ])
        .unwrap();

        let daemon = start_daemon(args, true).unwrap().unwrap();
        assert_eq!(daemon.port(), 0);
        assert_eq!(daemon.interface(), "127.0.0.1");
        assert!(!pidfile.exists());
        assert!(dir.path().join("auth").exists());
    }

    #[test]
    fn test_unusable_logfile_fails_before_start() {
        let dir = tempfile::tempdir().unwrap();
        let logfile = dir.path().join("deluged.log");
        std::fs::create_dir(&logfile).unwrap();
        let pidfile = dir.path().join("process.pid");
        let args = DaemonArgs::try_parse_from([
            "deluged",
            "-c",
            dir.path().to_str().unwrap(),
            "-l",
            logfile.to_str().unwrap(),
            "-P",
            pidfile.to_str().unwrap(),
        ])
        .unwrap();

        let Err(err) = start_daemon(args, true) else {
            panic!("daemon started with an unusable log file");
        };
        assert!(!pidfile.exists());
        let msg = logging_failed_message(&logfile, &err);
        assert!(msg.starts_with("Unable to set up logging to "), "{}", msg);
        assert!(msg.contains("deluged.log"), "{}", msg);
    }
}
