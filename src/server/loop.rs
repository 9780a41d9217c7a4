// Server loop module
// Accepts connections until shutdown, then drains in-flight requests

use std::future::Future;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use super::connection::accept_connection;
use crate::config::AppState;
use crate::logger;

/// How long open connections may keep running after shutdown is requested
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Accept connections until `shutdown` resolves
pub async fn start_server_loop(
    listener: TcpListener,
    state: Arc<AppState>,
    shutdown: impl Future<Output = ()>,
) -> Result<(), Box<dyn std::error::Error>> {
    let active_connections = Arc::new(AtomicUsize::new(0));
    let tracker = TaskTracker::new();
    let stop_token = CancellationToken::new();
    let mut shutdown = std::pin::pin!(shutdown);

    loop {
        tokio::select! {
            accept_result = listener.accept() => {
                match accept_result {
                    Ok((stream, peer_addr)) => {
                        accept_connection(
                            stream,
                            peer_addr,
                            &state,
                            &active_connections,
                            &tracker,
                            &stop_token,
                        );
                    }
                    Err(e) => {
                        logger::log_error(&format!("Failed to accept connection: {e}"));
                    }
                }
            }

            () = &mut shutdown => break,
        }
    }

    // Stop accepting; let in-flight transfers finish
    drop(listener);
    stop_token.cancel();
    tracker.close();
    if tokio::time::timeout(DRAIN_TIMEOUT, tracker.wait()).await.is_err() {
        logger::log_warning(&format!(
            "{} connection(s) still open after {}s, exiting anyway",
            tracker.len(),
            DRAIN_TIMEOUT.as_secs()
        ));
    }
    Ok(())
}
