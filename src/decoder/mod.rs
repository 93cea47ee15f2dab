//! QR decoder engine interface
//!
//! The decoding algorithm itself is a black box. The coordinator only needs
//! to start an engine on a video sink, pause/resume it around a check-in,
//! stop it on teardown, and receive its results. Results arrive as
//! [`DecoderEvent`]s on a channel handed to [`DecoderEngine::start`], which
//! serializes delivery and lets tests drive a fake engine deterministically.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::mpsc;

use crate::core::error::Result;

/// Sub-rectangle of the frame the decoder searches within
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionRegion {
    pub width: u32,
    pub height: u32,
}

impl DetectionRegion {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl Default for DetectionRegion {
    fn default() -> Self {
        Self::new(250, 250)
    }
}

/// Decoder engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecoderConfig {
    /// Frames sampled per second
    pub fps: u32,
    /// Region searched for a code
    pub detection_region: DetectionRegion,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            fps: 10,
            detection_region: DetectionRegion::default(),
        }
    }
}

/// Engine state as reported by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderState {
    Idle,
    Scanning,
    Paused,
}

impl DecoderState {
    /// Whether the engine holds the stream and must be stopped on teardown
    pub fn is_active(&self) -> bool {
        matches!(self, DecoderState::Scanning | DecoderState::Paused)
    }
}

impl fmt::Display for DecoderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DecoderState::Idle => "idle",
            DecoderState::Scanning => "scanning",
            DecoderState::Paused => "paused",
        };
        write!(f, "{}", name)
    }
}

/// One result reported by the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecoderEvent {
    /// A code was found and decoded to this text
    Decoded(String),
    /// A frame could not be decoded; the string is the engine's classification
    ScanError(String),
}

/// Channel end the engine reports results on
pub type DecoderEventSender = mpsc::UnboundedSender<DecoderEvent>;

/// Channel end the coordinator pumps results from
pub type DecoderEventReceiver = mpsc::UnboundedReceiver<DecoderEvent>;

/// A frame-decoding engine bound to one video sink
#[async_trait]
pub trait DecoderEngine: Send {
    /// Start sampling frames from the sink identified by `source_id`
    ///
    /// Results are sent on `events` until the engine is stopped. Events are
    /// delivered serially, in the order the engine produced them.
    async fn start(
        &mut self,
        source_id: &str,
        config: &DecoderConfig,
        events: DecoderEventSender,
    ) -> Result<()>;

    /// Stop producing results without releasing the stream
    fn pause(&mut self, keep_last_frame: bool);

    /// Resume producing results after a pause
    fn resume(&mut self);

    /// Stop sampling and release the engine's hold on the sink
    async fn stop(&mut self) -> Result<()>;

    /// Current engine state
    fn state(&self) -> DecoderState;
}

/// Creates a fresh engine for each scan session
pub trait DecoderProvider: Send + Sync {
    fn create_decoder(&self) -> Box<dyn DecoderEngine>;
}

/// Fragments of engine error strings that only mean "no code in this frame"
const NOISE_MARKERS: &[&str] = &[
    "notfoundexception",
    "no multiformat readers",
    "no code found",
    "no qr code found",
    "parse error",
    "checksumexception",
    "formatexception",
];

/// Whether an engine scan error is per-frame noise rather than a real failure
///
/// The engine reports an error for nearly every frame without a code in it;
/// surfacing those would make the status line flicker.
pub fn is_decoder_noise(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.trim().is_empty() || NOISE_MARKERS.iter().any(|m| lower.contains(m))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noise_classification() {
        assert!(is_decoder_noise(
            "QR code parse error, error = NotFoundException: No MultiFormat Readers were able to detect the code."
        ));
        assert!(is_decoder_noise("No code found"));
        assert!(is_decoder_noise(""));
        assert!(!is_decoder_noise("Video stream ended"));
        assert!(!is_decoder_noise("Canvas context lost"));
    }

    #[test]
    fn test_decoder_state_activity() {
        assert!(DecoderState::Scanning.is_active());
        assert!(DecoderState::Paused.is_active());
        assert!(!DecoderState::Idle.is_active());
        assert_eq!(DecoderState::Paused.to_string(), "paused");
    }

    #[test]
    fn test_default_config() {
        let config = DecoderConfig::default();
        assert_eq!(config.fps, 10);
        assert_eq!(config.detection_region, DetectionRegion::new(250, 250));
    }
}
