//! Camera platform abstraction traits for testability
//!
//! This module defines the seams between the scan coordinator and the
//! platform: listing cameras, acquiring a live stream, and binding that
//! stream to a video sink. The mock platform in `testdb` and any real
//! platform adapter implement the same traits, so the coordinator runs
//! unchanged against either.
//!
//! # Architecture
//!
//! - `CameraEnumerator` - Lists available camera devices
//! - `StreamAcquirer` - Opens an exclusive live stream on one device
//! - `MediaStream` - An owned live stream whose tracks can be stopped
//! - `VideoSink` - Receives a stream and exposes it to the decoder
//! - `CameraDevice` - Device id plus human-readable label (shared, not a trait)

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug, Display};

use crate::core::error::Result;

/// A camera reported by the platform
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CameraDevice {
    /// Opaque platform device id
    pub id: String,
    /// Human-readable label (e.g., "Back Camera", "FaceTime HD Camera (Front)")
    pub label: String,
}

impl CameraDevice {
    /// Create a new CameraDevice
    pub fn new(id: &str, label: &str) -> Self {
        Self {
            id: id.to_string(),
            label: label.to_string(),
        }
    }

    /// Check if the label marks a front-facing camera
    pub fn is_front_facing(&self) -> bool {
        label_contains_any(&self.label, super::selector::FRONT_MARKERS)
    }

    /// Check if the label marks a rear/environment-facing camera
    pub fn is_rear_facing(&self) -> bool {
        label_contains_any(&self.label, super::selector::REAR_MARKERS)
    }

    /// Label to display, falling back to the id when the platform hides labels
    pub fn display_label(&self) -> &str {
        if self.label.trim().is_empty() {
            &self.id
        } else {
            &self.label
        }
    }
}

impl Display for CameraDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.display_label(), self.id)
    }
}

fn label_contains_any(label: &str, markers: &[&str]) -> bool {
    let lower = label.to_lowercase();
    markers.iter().any(|m| lower.contains(m))
}

/// Constraints for a stream request
///
/// Streams are always bound to one exact device id; the platform must not
/// substitute another camera.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConstraints {
    /// Device id the stream must come from
    pub exact_device_id: String,
}

impl StreamConstraints {
    /// Constraints requiring exactly this device
    pub fn exact(device_id: &str) -> Self {
        Self {
            exact_device_id: device_id.to_string(),
        }
    }
}

/// A live video stream owned by exactly one scan session
pub trait MediaStream: Send + Debug {
    /// Platform stream id
    fn id(&self) -> &str;

    /// Device the stream was acquired from
    fn device_id(&self) -> &str;

    /// Whether any track is still running
    fn is_live(&self) -> bool;

    /// Stop every track on the stream
    ///
    /// Must be idempotent: stopping an already stopped stream is a no-op.
    fn stop_tracks(&mut self);
}

/// The surface a live stream is rendered into and sampled from
pub trait VideoSink: Send {
    /// Identifier the decoder engine uses to locate this sink
    fn source_id(&self) -> &str;

    /// Bind a stream as the sink's source
    fn attach(&mut self, stream: &dyn MediaStream) -> Result<()>;

    /// Start playback of the attached stream
    fn play(&mut self) -> Result<()>;

    /// Clear the source and force a reload so the platform releases the hardware
    ///
    /// Must be idempotent.
    fn detach(&mut self);

    /// Whether a stream is currently attached
    fn is_attached(&self) -> bool;
}

/// Trait for camera enumeration
#[async_trait]
pub trait CameraEnumerator: Send + Sync {
    /// List the cameras currently available
    async fn list_cameras(&self) -> Result<Vec<CameraDevice>>;
}

/// Trait for live stream acquisition
///
/// Acquisition may suspend indefinitely while the user answers a
/// permission prompt; callers must not assume it resolves promptly.
///
/// Adapters report platform failures through
/// [`classify_acquisition_error`](crate::device::classify_acquisition_error)
/// so the coordinator sees the shared error taxonomy.
#[async_trait]
pub trait StreamAcquirer: Send + Sync {
    /// Request an exclusive live stream satisfying the constraints
    async fn acquire_stream(&self, constraints: &StreamConstraints)
        -> Result<Box<dyn MediaStream>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camera_device_creation() {
        let device = CameraDevice::new("cam1", "Back Camera");
        assert_eq!(device.id, "cam1");
        assert_eq!(device.label, "Back Camera");
        assert_eq!(device.to_string(), "Back Camera (cam1)");
    }

    #[test]
    fn test_facing_detection() {
        assert!(CameraDevice::new("a", "FRONT camera").is_front_facing());
        assert!(CameraDevice::new("b", "camera2 0, facing back").is_rear_facing());
        assert!(CameraDevice::new("c", "Environment Facing").is_rear_facing());

        let usb = CameraDevice::new("d", "USB Webcam");
        assert!(!usb.is_front_facing());
        assert!(!usb.is_rear_facing());
    }

    #[test]
    fn test_display_label_falls_back_to_id() {
        let hidden = CameraDevice::new("3f9a", "");
        assert_eq!(hidden.display_label(), "3f9a");
    }

    #[test]
    fn test_exact_constraints() {
        let constraints = StreamConstraints::exact("cam1");
        assert_eq!(constraints.exact_device_id, "cam1");
    }
}
