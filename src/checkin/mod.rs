//! Check-in submission
//!
//! A check-in redeems one decoded payload as attendance for an event. The
//! submitter makes exactly one attempt per call and never retries; the scan
//! coordinator decides what happens after a failure.
//!
//! # Submodules
//!
//! - `http` - reqwest-based submitter for the events API

pub mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::error::{Result, ScanError};

pub use http::HttpCheckInSubmitter;

/// Result code the events API uses for success
pub const SUCCESS_CODE: i64 = 1000;

/// Message used when the server rejects a check-in without explaining why
pub const GENERIC_FAILURE_MESSAGE: &str = "Check-in failed";

/// Message used when the server accepts a check-in without a message
pub const GENERIC_SUCCESS_MESSAGE: &str = "Check-in successful";

/// One check-in attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckInRequest {
    pub event_id: String,
    pub payload: String,
}

impl CheckInRequest {
    pub fn new(event_id: &str, payload: &str) -> Self {
        Self {
            event_id: event_id.to_string(),
            payload: payload.to_string(),
        }
    }

    /// Reject requests that must never reach the network
    pub fn validate(&self) -> Result<()> {
        if self.event_id.trim().is_empty() {
            return Err(ScanError::Validation("event id is required".to_string()));
        }
        if self.payload.is_empty() {
            return Err(ScanError::Validation("QR payload is empty".to_string()));
        }
        Ok(())
    }
}

/// Server verdict on a check-in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckInOutcome {
    pub accepted: bool,
    pub message: String,
}

impl CheckInOutcome {
    pub fn accepted(message: &str) -> Self {
        Self {
            accepted: true,
            message: message.to_string(),
        }
    }
}

/// Envelope every events API response uses
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse {
    pub code: i64,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
}

/// Sends check-in requests to the backend
#[async_trait]
pub trait CheckInSubmitter: Send + Sync {
    /// Make a single check-in attempt
    ///
    /// Returns an accepted outcome on success, [`ScanError::Api`] when the
    /// server rejects the payload, and [`ScanError::Network`] when no
    /// response arrives.
    async fn submit(&self, request: &CheckInRequest) -> Result<CheckInOutcome>;
}

/// Classify a raw HTTP response from the check-in endpoint
pub fn classify_response(status: u16, body: &str) -> Result<CheckInOutcome> {
    let parsed: Option<ApiResponse> = serde_json::from_str(body).ok();
    let success_status = (200..300).contains(&status);

    match parsed {
        Some(resp) if success_status && resp.code == SUCCESS_CODE => {
            let message = resp
                .message
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| GENERIC_SUCCESS_MESSAGE.to_string());
            Ok(CheckInOutcome::accepted(&message))
        }
        Some(resp) => Err(ScanError::Api {
            code: Some(resp.code),
            message: resp
                .message
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| GENERIC_FAILURE_MESSAGE.to_string()),
        }),
        None => Err(ScanError::Api {
            code: None,
            message: format!("{} (HTTP {})", GENERIC_FAILURE_MESSAGE, status),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_code_accepted() {
        let outcome = classify_response(200, r#"{"code":1000,"result":{"id":"a1"}}"#).unwrap();
        assert!(outcome.accepted);
        assert_eq!(outcome.message, GENERIC_SUCCESS_MESSAGE);

        let outcome =
            classify_response(200, r#"{"code":1000,"message":"Welcome, Ana"}"#).unwrap();
        assert_eq!(outcome.message, "Welcome, Ana");
    }

    #[test]
    fn test_api_error_carries_server_message() {
        let err = classify_response(200, r#"{"code":4000,"message":"expired"}"#).unwrap_err();
        assert_eq!(
            err,
            ScanError::Api {
                code: Some(4000),
                message: "expired".to_string()
            }
        );
    }

    #[test]
    fn test_non_2xx_with_envelope() {
        let err =
            classify_response(400, r#"{"code":1000,"message":"already checked in"}"#).unwrap_err();
        assert!(matches!(err, ScanError::Api { message, .. } if message == "already checked in"));
    }

    #[test]
    fn test_missing_message_uses_generic() {
        let err = classify_response(409, r#"{"code":4009}"#).unwrap_err();
        assert!(matches!(err, ScanError::Api { message, .. } if message == GENERIC_FAILURE_MESSAGE));
    }

    #[test]
    fn test_unparseable_body() {
        let err = classify_response(502, "<html>Bad Gateway</html>").unwrap_err();
        assert!(matches!(
            err,
            ScanError::Api { code: None, message } if message.contains("HTTP 502")
        ));
    }

    #[test]
    fn test_request_validation() {
        assert!(CheckInRequest::new("E1", "QR-123").validate().is_ok());
        assert!(matches!(
            CheckInRequest::new(" ", "QR-123").validate(),
            Err(ScanError::Validation(_))
        ));
        assert!(CheckInRequest::new("E1", "").validate().is_err());
    }
}
