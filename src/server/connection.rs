// Connection handling module
// Admits a TCP connection against the configured cap and serves it on its own task

use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use hyper_util::server::graceful::GracefulShutdown;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;

use crate::config::AppState;
use crate::handler;
use crate::logger;

/// One occupied slot in the active connection count, released on drop
struct ConnectionSlot {
    counter: Arc<AtomicUsize>,
}

impl ConnectionSlot {
    /// Take a slot unless `limit` slots are already held
    fn acquire(counter: &Arc<AtomicUsize>, limit: Option<u64>) -> Result<Self, usize> {
        // Increment first so two racing accepts cannot both see a free slot
        let held = counter.fetch_add(1, Ordering::SeqCst);
        let slot = Self {
            counter: Arc::clone(counter),
        };
        match limit {
            Some(max) if held >= usize::try_from(max).unwrap_or(usize::MAX) => Err(held),
            _ => Ok(slot),
        }
    }
}

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Admit `stream` and serve it in a spawned task
///
/// Connections past `performance.max_connections` are closed immediately.
/// Admitted connections are registered with `graceful` so shutdown can let
/// their in-flight request finish.
pub fn accept_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    state: &Arc<AppState>,
    active: &Arc<AtomicUsize>,
    graceful: &GracefulShutdown,
) {
    let performance = &state.config.performance;
    let slot = match ConnectionSlot::acquire(active, performance.max_connections) {
        Ok(slot) => slot,
        Err(held) => {
            logger::log_warning(&format!(
                "Max connections reached: {held}/{}. Connection from {peer_addr} rejected.",
                performance.max_connections.unwrap_or_default()
            ));
            return;
        }
    };

    logger::log_debug(&format!("Connection accepted from: {peer_addr}"));

    let mut builder = http1::Builder::new();
    builder.keep_alive(performance.keep_alive);

    let service_state = Arc::clone(state);
    let conn = builder.serve_connection(
        TokioIo::new(stream),
        service_fn(move |req| handler::handle_request(req, Arc::clone(&service_state), peer_addr)),
    );
    let limit = Duration::from_secs(performance.request_timeout);

    tokio::spawn(serve_connection(graceful.watch(conn), peer_addr, limit, slot));
}

/// Drive one connection to completion, bounded by `limit`
async fn serve_connection<C>(conn: C, peer_addr: SocketAddr, limit: Duration, _slot: ConnectionSlot)
where
    C: Future<Output = Result<(), hyper::Error>>,
{
    match tokio::time::timeout(limit, conn).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => logger::log_connection_error(&err),
        Err(_) => logger::log_warning(&format!(
            "Connection from {peer_addr} timed out after {} seconds",
            limit.as_secs()
        )),
    }
}
