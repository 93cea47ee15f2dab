//! Lifecycle Guard
//!
//! Idempotent release of everything a scan session holds. Runs on explicit
//! close, on unmount, after a successful check-in, and from the
//! acquisition-error path. Calling it twice, or on a session that never
//! acquired anything, does nothing.
//!
//! Teardown comes in two halves. [`LifecycleGuard::release`] runs under the
//! session lock (timer, tracks, sink) and hands back the decoder;
//! [`LifecycleGuard::finish`] stops the decoder once the lock is dropped.

use log::{debug, warn};

use crate::decoder::DecoderEngine;
use crate::device::{MediaStream, VideoSink};
use crate::scanner::session::SessionHandles;

/// Teardown routine for session-owned resources
pub struct LifecycleGuard;

impl LifecycleGuard {
    /// Cancel the resume timer, stop every track, and detach the sink
    ///
    /// Returns the decoder, if one was held, for [`LifecycleGuard::finish`].
    /// Pass `sink` only when the sink is bound to this session's stream.
    pub fn release(
        handles: &mut SessionHandles,
        sink: Option<&mut dyn VideoSink>,
    ) -> Option<Box<dyn DecoderEngine>> {
        if let Some(timer) = handles.resume_timer.take() {
            debug!("Cancelling pending resume timer");
            timer.abort();
        }

        if let Some(mut stream) = handles.stream.take() {
            release_stream(stream.as_mut());
        }

        if let Some(sink) = sink {
            detach_sink(sink);
        }

        handles.decoder.take()
    }

    /// Stop a decoder taken out by [`LifecycleGuard::release`]
    pub async fn finish(decoder: Option<Box<dyn DecoderEngine>>) {
        if let Some(mut decoder) = decoder {
            stop_decoder(decoder.as_mut()).await;
        }
    }
}

/// Stop every track of a stream
pub fn release_stream(stream: &mut dyn MediaStream) {
    if stream.is_live() {
        debug!("Stopping tracks of stream {} ({})", stream.id(), stream.device_id());
        stream.stop_tracks();
    }
}

/// Clear the sink's source so the platform lets go of the camera
pub fn detach_sink(sink: &mut dyn VideoSink) {
    if sink.is_attached() {
        debug!("Detaching video sink {}", sink.source_id());
        sink.detach();
    }
}

/// Stop a decoder that is still active; errors from stop are logged, never raised
pub async fn stop_decoder(decoder: &mut dyn DecoderEngine) {
    let state = decoder.state();
    if !state.is_active() {
        return;
    }
    if let Err(e) = decoder.stop().await {
        warn!("Decoder stop failed while {} (ignored): {}", state, e);
    }
}
