use clap::Parser;
use std::path::PathBuf;
use tracing::level_filters::LevelFilter;

use deluge_core::config::{get_config_dir, resolve_config_dir};
use deluge_core::logging::{parse_log_level, setup_logging, LogOptions};

#[derive(Debug, Parser)]
#[command(name = "deluge", version, about = "Deluge BitTorrent client")]
struct Args {
    /// Set the config directory path
    #[arg(short = 'c', long = "config", value_name = "config")]
    config: Option<PathBuf>,

    /// Output to specified logfile (defaults to deluge-ui.log in the config directory)
    #[arg(short = 'l', long = "logfile", value_name = "file")]
    logfile: Option<PathBuf>,

    /// Set the log level (none, error, warning, info, debug, trace, garbage)
    #[arg(short = 'L', long = "loglevel", value_name = "level", default_value = "info", value_parser = parse_log_level)]
    loglevel: LevelFilter,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config_dir = resolve_config_dir(args.config.as_deref());
    std::fs::create_dir_all(&config_dir)?;

    // The terminal belongs to the UI, so logs only go to the file.
    let _guard = setup_logging(&LogOptions {
        level: args.loglevel,
        logfile: Some(
            args.logfile
                .unwrap_or_else(|| get_config_dir(&config_dir, "deluge-ui.log")),
        ),
        rotate: false,
        stdout: false,
    })?;

    tracing::info!("Deluge ui {}", env!("CARGO_PKG_VERSION"));
    deluge_ui::tui::run(config_dir).await
}
