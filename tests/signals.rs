//! SIGTERM stops the servers the same way Ctrl+C does.
#![cfg(unix)]

use nix::sys::signal::{raise, Signal};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use deluge_core::common::cancel_on_signal;

#[tokio::test]
async fn test_sigterm_cancels_shutdown_token() {
    let shutdown = CancellationToken::new();
    let watcher = cancel_on_signal(shutdown.clone());

    raise(Signal::SIGTERM).unwrap();

    tokio::time::timeout(Duration::from_secs(5), shutdown.cancelled())
        .await
        .expect("SIGTERM should cancel the shutdown token");
    watcher.await.unwrap();
}
