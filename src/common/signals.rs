//! Shutdown on Ctrl+C or SIGTERM.

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Cancel `shutdown` when the process is interrupted or terminated.
///
/// The handlers are registered before this returns, so a signal raised right
/// after the call is not lost. The task also ends once `shutdown` is
/// cancelled by someone else. Must be called from within a tokio runtime.
pub fn cancel_on_signal(shutdown: CancellationToken) -> JoinHandle<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let handlers = signal(SignalKind::interrupt())
            .and_then(|int| signal(SignalKind::terminate()).map(|term| (int, term)));
        match handlers {
            Ok((mut int, mut term)) => tokio::spawn(async move {
                tokio::select! {
                    _ = int.recv() => tracing::info!("Interrupt received"),
                    _ = term.recv() => tracing::info!("SIGTERM received"),
                    _ = shutdown.cancelled() => return,
                }
                shutdown.cancel();
            }),
            Err(e) => {
                tracing::warn!("Unable to install signal handlers: {}", e);
                tokio::spawn(ctrl_c_only(shutdown))
            }
        }
    }
    #[cfg(not(unix))]
    {
        tokio::spawn(ctrl_c_only(shutdown))
    }
}

async fn ctrl_c_only(shutdown: CancellationToken) {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                tracing::warn!("Unable to listen for Ctrl+C: {}", e);
                return;
            }
            tracing::info!("Interrupt received");
        }
        _ = shutdown.cancelled() => return,
    }
    shutdown.cancel();
}
