//! Recording check-in submitter
//!
//! Replays scripted server verdicts in order and keeps a log of every
//! request it received. Once the script runs out every check-in is accepted.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::checkin::{CheckInOutcome, CheckInRequest, CheckInSubmitter, GENERIC_SUCCESS_MESSAGE};
use crate::core::error::{Result, ScanError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One scripted server verdict
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedOutcome {
    Accept(String),
    Reject { code: i64, message: String },
    NetworkError(String),
}

impl ScriptedOutcome {
    fn into_result(self) -> Result<CheckInOutcome> {
        match self {
            ScriptedOutcome::Accept(message) => Ok(CheckInOutcome::accepted(&message)),
            ScriptedOutcome::Reject { code, message } => Err(ScanError::Api {
                code: Some(code),
                message,
            }),
            ScriptedOutcome::NetworkError(message) => Err(ScanError::Network(message)),
        }
    }
}

/// Check-in submitter that records calls and replays scripted outcomes
#[derive(Debug, Default)]
pub struct RecordingSubmitter {
    script: Mutex<VecDeque<ScriptedOutcome>>,
    calls: Mutex<Vec<CheckInRequest>>,
    latency: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl RecordingSubmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Submitter that replays `outcomes` in order
    pub fn scripted(outcomes: Vec<ScriptedOutcome>) -> Self {
        Self {
            script: Mutex::new(outcomes.into()),
            ..Self::default()
        }
    }

    /// Delay every response by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn push(&self, outcome: ScriptedOutcome) {
        lock(&self.script).push_back(outcome);
    }

    pub fn push_accept(&self, message: &str) {
        self.push(ScriptedOutcome::Accept(message.to_string()));
    }

    pub fn push_reject(&self, code: i64, message: &str) {
        self.push(ScriptedOutcome::Reject {
            code,
            message: message.to_string(),
        });
    }

    pub fn push_network_error(&self, message: &str) {
        self.push(ScriptedOutcome::NetworkError(message.to_string()));
    }

    /// Every request received, in order
    pub fn calls(&self) -> Vec<CheckInRequest> {
        lock(&self.calls).clone()
    }

    pub fn call_count(&self) -> usize {
        lock(&self.calls).len()
    }

    /// Highest number of concurrently running submissions
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CheckInSubmitter for RecordingSubmitter {
    async fn submit(&self, request: &CheckInRequest) -> Result<CheckInOutcome> {
        request.validate()?;
        lock(&self.calls).push(request.clone());

        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let next = lock(&self.script).pop_front();
        next.unwrap_or_else(|| ScriptedOutcome::Accept(GENERIC_SUCCESS_MESSAGE.to_string()))
            .into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_replays_script_then_accepts() {
        let submitter = RecordingSubmitter::scripted(vec![
            ScriptedOutcome::Reject {
                code: 4000,
                message: "expired".into(),
            },
            ScriptedOutcome::NetworkError("timed out".into()),
        ]);
        let request = CheckInRequest::new("E1", "QR-1");

        assert!(matches!(
            submitter.submit(&request).await,
            Err(ScanError::Api { code: Some(4000), .. })
        ));
        assert!(matches!(
            submitter.submit(&request).await,
            Err(ScanError::Network(_))
        ));
        let outcome = submitter.submit(&request).await.unwrap();
        assert!(outcome.accepted);
        assert_eq!(submitter.call_count(), 3);
        assert_eq!(submitter.max_in_flight(), 1);
    }

    #[tokio::test]
    async fn test_invalid_request_not_recorded() {
        let submitter = RecordingSubmitter::new();
        let result = submitter.submit(&CheckInRequest::new("E1", "")).await;
        assert!(matches!(result, Err(ScanError::Validation(_))));
        assert_eq!(submitter.call_count(), 0);
    }
}
