//! Pulls bytes from a [`CaptureSource`], re-chunks them to the session
//! frame size, and hands each complete frame to the scheduler to
//! broadcast. Ends the stream (and flushes any trailing partial frame)
//! once the capture source reports end of stream.

use std::sync::Arc;

use airsync_audio::{CaptureSource, Framer};
use airsync_config::BYTES_PER_FRAME;

use crate::error::SourceError;
use crate::scheduler::{SourceScheduler, SourceState};

pub async fn run(
    scheduler: Arc<SourceScheduler>,
    mut capture: Box<dyn CaptureSource>,
) -> Result<(), SourceError> {
    let mut framer = Framer::new(BYTES_PER_FRAME);

    while let Some(bytes) = capture.next_bytes().await.map_err(SourceError::Capture)? {
        for frame in framer.push(&bytes) {
            // Streaming requires both a captured frame (this one) and at
            // least one registered sink; re-checked per frame until a sink
            // shows up, since capture may start before any sink connects.
            if scheduler.state() != SourceState::Streaming && scheduler.sink_count().await > 0 {
                scheduler.set_state(SourceState::Streaming);
            }
            scheduler.broadcast_frame(frame).await;
        }
    }

    if let Some(tail) = framer.flush() {
        scheduler.broadcast_frame(tail).await;
    }

    Ok(())
}
