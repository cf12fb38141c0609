//! The source node: accepts sink connections over WebSocket, handles
//! their clock-sync handshake, and broadcasts captured audio to every
//! sink that has reached `client_ready`.

pub mod capture;
pub mod error;
pub mod handler;
pub mod scheduler;

pub use error::SourceError;
pub use scheduler::{SinkId, SourceScheduler, SourceState};

use std::sync::Arc;

use airsync_audio::CaptureSource;
use airsync_clock::Clock;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// Binds `addr`, starts accepting sink connections, and runs the capture
/// loop until `capture` reports end of stream. The listener shuts down
/// gracefully once capture ends, driven by a [`CancellationToken`] rather
/// than an abrupt task abort — in-flight sink connections get a chance to
/// finish their current send before the socket closes.
pub async fn run(addr: &str, capture: Box<dyn CaptureSource>, clock: Arc<dyn Clock>) -> Result<(), SourceError> {
    let scheduler = Arc::new(SourceScheduler::new(clock));
    let listener = TcpListener::bind(addr).await?;
    scheduler.set_state(SourceState::Listening);
    tracing::info!(%addr, "source listening for sinks");

    let shutdown = CancellationToken::new();
    let app = handler::router(scheduler.clone());
    let server_shutdown = shutdown.clone();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { server_shutdown.cancelled().await })
            .await
    });

    let capture_result = capture::run(scheduler, capture).await;
    shutdown.cancel();
    let _ = server.await;
    capture_result
}
