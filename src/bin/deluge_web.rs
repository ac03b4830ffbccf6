use clap::Parser;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::level_filters::LevelFilter;

use deluge_core::common::cancel_on_signal;
use deluge_core::config::resolve_config_dir;
use deluge_core::logging::{parse_log_level, setup_logging, LogOptions};
use deluge_core::webui::{self, WebOptions};

#[derive(Debug, Parser)]
#[command(name = "deluge-web", version, about = "Deluge web configuration pages")]
struct Args {
    /// Port the web server listens on
    #[arg(short = 'p', long)]
    port: Option<u16>,

    /// IP address the web server binds to
    #[arg(short = 'i', long)]
    interface: Option<String>,

    /// Daemon host
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Daemon RPC port
    #[arg(long, default_value_t = 58846)]
    daemon_port: u16,

    /// Daemon username (empty uses the local client account)
    #[arg(short = 'u', long, default_value = "", env = "DELUGE_USERNAME")]
    username: String,

    #[arg(long, default_value = "", env = "DELUGE_PASSWORD", hide_env_values = true)]
    password: String,

    /// Set the config directory path
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Set the log level (none, error, warning, info, debug, trace)
    #[arg(short = 'L', long, default_value = "info", value_parser = parse_log_level)]
    loglevel: LevelFilter,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let _guard = setup_logging(&LogOptions {
        level: args.loglevel,
        ..LogOptions::default()
    })?;

    let shutdown = CancellationToken::new();
    cancel_on_signal(shutdown.clone());

    let options = WebOptions {
        port: args.port,
        interface: args.interface,
        host: args.host,
        daemon_port: args.daemon_port,
        username: args.username,
        password: args.password,
        config_dir: resolve_config_dir(args.config.as_deref()),
    };
    webui::run(options, shutdown).await
}
