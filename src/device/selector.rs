//! Camera selection and acquisition error classification
//!
//! Both functions here are pure: no platform access, no logging side effects
//! beyond what the caller does with the result.

use crate::core::error::ScanError;
use crate::device::traits::CameraDevice;

/// Label markers identifying a front-facing camera
pub const FRONT_MARKERS: &[&str] = &["front"];

/// Label markers identifying a rear/environment-facing camera
pub const REAR_MARKERS: &[&str] = &["back", "environment"];

/// Pick the camera to scan with
///
/// Preference order: the first front-facing device, then the first
/// rear/environment-facing device, then the first device in the list.
/// Returns `None` for an empty list; the caller reports
/// [`ScanError::DeviceNotFound`].
pub fn select_camera(devices: &[CameraDevice]) -> Option<&CameraDevice> {
    devices
        .iter()
        .find(|d| d.is_front_facing())
        .or_else(|| devices.iter().find(|d| d.is_rear_facing()))
        .or_else(|| devices.first())
}

/// Map a platform acquisition failure onto the error taxonomy
///
/// `name` is the platform's error class (e.g. `NotAllowedError`), `message`
/// its human-readable text.
pub fn classify_acquisition_error(name: &str, message: &str) -> ScanError {
    match name {
        "NotAllowedError" | "PermissionDeniedError" | "SecurityError" => {
            ScanError::PermissionDenied
        }
        "NotFoundError" | "DevicesNotFoundError" => ScanError::DeviceNotFound,
        "NotReadableError" | "TrackStartError" | "AbortError" => {
            ScanError::StreamRead(non_empty_or(message, "camera is in use or unreadable"))
        }
        "OverconstrainedError" | "ConstraintNotSatisfiedError" => {
            ScanError::Overconstrained(non_empty_or(message, "deviceId"))
        }
        _ => ScanError::StreamRead(non_empty_or(message, name)),
    }
}

fn non_empty_or(message: &str, fallback: &str) -> String {
    if message.trim().is_empty() {
        fallback.to_string()
    } else {
        message.to_string()
    }
}
