//! Scanner events
//!
//! Everything the scanner tells its host travels as a [`ScanEvent`] on an
//! unbounded channel, so any UI layer can consume them from its own loop.

use crate::checkin::CheckInOutcome;
use crate::core::error::{ErrorKind, ScanError};
use crate::scanner::session::ScanState;

/// Severity of a user notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Success,
    Info,
    Warning,
    Error,
}

/// Events emitted by the scan coordinator
#[derive(Debug, Clone, PartialEq)]
pub enum ScanEvent {
    /// The session moved between states
    StateChanged {
        generation: u64,
        from: ScanState,
        to: ScanState,
    },

    /// Status line update; `text: None` clears it
    Message {
        kind: Option<ErrorKind>,
        text: Option<String>,
    },

    /// Toast-style notification
    Notification {
        level: NotificationLevel,
        message: String,
    },

    /// A check-in was accepted. Emitted exactly once per successful check-in.
    CheckInSucceeded {
        event_id: String,
        payload: String,
        outcome: CheckInOutcome,
    },

    /// The session stopped on a fatal error. Emitted exactly once per fatal error.
    Failed { error: ScanError },

    /// The scanner asks its host to close the dialog
    CloseRequested,
}

impl ScanEvent {
    /// Whether this event reports a successful check-in
    pub fn is_success(&self) -> bool {
        matches!(self, ScanEvent::CheckInSucceeded { .. })
    }

    /// Whether this event reports a fatal failure
    pub fn is_failure(&self) -> bool {
        matches!(self, ScanEvent::Failed { .. })
    }
}
