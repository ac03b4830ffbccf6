use clap::Parser;
use deluge_core::entry::{start_daemon, DaemonArgs};

fn main() {
    let args = DaemonArgs::parse();
    if start_daemon(args, false).is_err() {
        std::process::exit(1);
    }
}
