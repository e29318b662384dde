use tokio::signal::unix::{signal, SignalKind};
use tracing::{info, warn};

/// Resolves on the first SIGINT, SIGTERM or SIGPROF.
///
/// A handler that cannot be installed is logged and never fires, the others
/// keep working.
pub(crate) async fn wait_for_shutdown_signal() -> &'static str {
    tokio::select! {
        _ = recv(SignalKind::interrupt(), "SIGINT") => "SIGINT",
        _ = recv(SignalKind::terminate(), "SIGTERM") => "SIGTERM",
        _ = recv(SignalKind::from_raw(libc::SIGPROF), "SIGPROF") => "SIGPROF",
    }
}

async fn recv(kind: SignalKind, name: &'static str) {
    match signal(kind) {
        Ok(mut stream) => {
            if stream.recv().await.is_some() {
                info!("received {name}");
                return;
            }
            std::future::pending::<()>().await
        }
        Err(e) => {
            warn!("failed to install {name} handler: {e}");
            std::future::pending::<()>().await
        }
    }
}
