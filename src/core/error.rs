//! Error types for the check-in scanner
//!
//! Every failure a scan session can hit is one variant of [`ScanError`].
//! Variants fall into two groups: fatal errors stop the session until the
//! user retries, recoverable errors (check-in submission failures) return the
//! session to scanning after a cool-down.

use std::fmt;
use thiserror::Error;

/// Main error type for the check-in scanner
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScanError {
    /// The scanner was opened without a target event, or a request was malformed
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The platform failed while listing camera devices
    #[error("Failed to enumerate cameras: {0}")]
    DeviceEnumeration(String),

    /// The platform reported no camera devices
    #[error("No camera found on this device.")]
    DeviceNotFound,

    /// The user or the platform refused camera access
    #[error("Camera permission denied. Please allow camera access and try again.")]
    PermissionDenied,

    /// The camera exists but could not be read (usually in use by another application)
    #[error("Could not start the camera: {0}")]
    StreamRead(String),

    /// The requested device id no longer satisfies the stream constraints
    #[error("The selected camera does not support the requested settings: {0}")]
    Overconstrained(String),

    /// The decoder engine failed to start on the bound stream
    #[error("Failed to start QR decoder: {0}")]
    DecoderStart(String),

    /// The check-in request never got a response
    #[error("Network error: {0}")]
    Network(String),

    /// The check-in endpoint answered with a failure
    #[error("Check-in rejected: {message}")]
    Api {
        /// Server result code, if the body could be parsed
        code: Option<i64>,
        /// Server-supplied message, or a generic one
        message: String,
    },
}

/// Copyable classification of a [`ScanError`], kept on the session as `last_error_kind`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    DeviceEnumeration,
    DeviceNotFound,
    PermissionDenied,
    StreamRead,
    Overconstrained,
    DecoderStart,
    Network,
    Api,
    /// Non-noise error reported by the decoder while scanning
    Decoder,
}

impl ErrorKind {
    /// Whether the session may return to scanning on its own after this kind of error
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ErrorKind::Network | ErrorKind::Api | ErrorKind::Decoder)
    }

    /// Short name used in logs and scenario reports
    pub fn name(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "ValidationError",
            ErrorKind::DeviceEnumeration => "DeviceEnumerationError",
            ErrorKind::DeviceNotFound => "DeviceNotFoundError",
            ErrorKind::PermissionDenied => "PermissionDeniedError",
            ErrorKind::StreamRead => "StreamReadError",
            ErrorKind::Overconstrained => "OverconstrainedError",
            ErrorKind::DecoderStart => "DecoderStartError",
            ErrorKind::Network => "NetworkError",
            ErrorKind::Api => "ApiError",
            ErrorKind::Decoder => "DecoderError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl ScanError {
    /// Classification of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            ScanError::Validation(_) => ErrorKind::Validation,
            ScanError::DeviceEnumeration(_) => ErrorKind::DeviceEnumeration,
            ScanError::DeviceNotFound => ErrorKind::DeviceNotFound,
            ScanError::PermissionDenied => ErrorKind::PermissionDenied,
            ScanError::StreamRead(_) => ErrorKind::StreamRead,
            ScanError::Overconstrained(_) => ErrorKind::Overconstrained,
            ScanError::DecoderStart(_) => ErrorKind::DecoderStart,
            ScanError::Network(_) => ErrorKind::Network,
            ScanError::Api { .. } => ErrorKind::Api,
        }
    }

    /// Check-in failures are recoverable; everything else ends the session
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ScanError::Network(_) | ScanError::Api { .. })
    }

    /// Message shown to the user for this error
    pub fn user_message(&self) -> String {
        match self {
            ScanError::Api { message, .. } => message.clone(),
            ScanError::Network(_) => {
                "Could not reach the server. Scanning will resume shortly.".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl From<reqwest::Error> for ScanError {
    fn from(err: reqwest::Error) -> Self {
        ScanError::Network(err.to_string())
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, ScanError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_checkin_failures_are_recoverable() {
        assert!(ScanError::Network("timeout".into()).is_recoverable());
        assert!(ScanError::Api {
            code: Some(4000),
            message: "expired".into()
        }
        .is_recoverable());

        assert!(!ScanError::DeviceNotFound.is_recoverable());
        assert!(!ScanError::PermissionDenied.is_recoverable());
        assert!(!ScanError::Validation("no event".into()).is_recoverable());
        assert!(!ScanError::StreamRead("busy".into()).is_recoverable());
    }

    #[test]
    fn test_kind_mapping() {
        assert_eq!(ScanError::DeviceNotFound.kind(), ErrorKind::DeviceNotFound);
        assert_eq!(
            ScanError::Overconstrained("deviceId".into()).kind(),
            ErrorKind::Overconstrained
        );
        assert_eq!(ErrorKind::Api.to_string(), "ApiError");
        assert!(ErrorKind::Decoder.is_recoverable());
        assert!(!ErrorKind::DecoderStart.is_recoverable());
    }

    #[test]
    fn test_api_user_message_is_server_message() {
        let err = ScanError::Api {
            code: Some(4000),
            message: "expired".into(),
        };
        assert_eq!(err.user_message(), "expired");
        assert_eq!(err.to_string(), "Check-in rejected: expired");
    }
}
