// Server loop module
// Accepts connections until a shutdown signal arrives

use hyper_util::server::graceful::GracefulShutdown;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

use super::connection::accept_connection;
use crate::config;
use crate::logger;

/// Run the accept loop until `shutdown` resolves, then drain
///
/// After the signal the listener is closed, idle keep-alive connections are
/// told to close and in-flight requests get up to `request_timeout` to
/// finish before this returns.
pub async fn start_server_loop<S>(
    listener: TcpListener,
    state: Arc<config::AppState>,
    shutdown: S,
) -> Result<(), Box<dyn std::error::Error>>
where
    S: Future<Output = &'static str>,
{
    let active_connections = Arc::new(AtomicUsize::new(0));
    let graceful = GracefulShutdown::new();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            accept_result = listener.accept() => {
                match accept_result {
                    Ok((stream, peer_addr)) => {
                        accept_connection(stream, peer_addr, &state, &active_connections, &graceful);
                    }
                    Err(e) => {
                        logger::log_error(&format!("Failed to accept connection: {e}"));
                    }
                }
            }

            signal = &mut shutdown => {
                logger::log_info(&format!("{signal} received, shutting down"));
                break;
            }
        }
    }

    drop(listener);
    let limit = Duration::from_secs(state.config.performance.request_timeout);
    drain(graceful, &active_connections, limit).await;
    Ok(())
}

/// Wait for open connections to finish, at most `limit`
async fn drain(graceful: GracefulShutdown, active: &AtomicUsize, limit: Duration) {
    let open = active.load(Ordering::SeqCst);
    if open > 0 {
        logger::log_info(&format!("Waiting for {open} open connection(s) to finish"));
    }
    if tokio::time::timeout(limit, graceful.shutdown()).await.is_err() {
        logger::log_warning(&format!(
            "{} connection(s) still open after {} seconds, closing",
            active.load(Ordering::SeqCst),
            limit.as_secs()
        ));
    }
}
