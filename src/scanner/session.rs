//! Scan session state
//!
//! A session is one open-to-closed cycle of the scanner. It exclusively owns
//! the live stream and the decoder engine it acquired, and it carries the
//! cancellation token every async continuation checks before touching it.

use chrono::{DateTime, Utc};
use std::fmt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::core::error::{ErrorKind, ScanError};
use crate::decoder::{DecoderConfig, DecoderEngine};
use crate::device::{CameraDevice, MediaStream};

// =============================================================================
// Scan State
// =============================================================================

/// Lifecycle state of a scan session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScanState {
    /// Created, nothing requested yet
    Idle,
    /// Waiting for the platform's camera list
    Enumerating,
    /// Waiting for the stream and the decoder to start
    Acquiring,
    /// Decoder running, decode events accepted
    Scanning,
    /// One check-in in flight (or cooling down after a failed one)
    Processing,
    /// Stopped on an error; fatal errors stay here until closed or retried
    PausedError,
    /// Torn down; terminal
    Closed,
}

impl ScanState {
    /// Whether the transition graph allows moving from `self` to `next`
    pub fn can_transition_to(&self, next: ScanState) -> bool {
        use ScanState::*;
        match (self, next) {
            (Closed, _) => false,
            (_, Closed) => true,
            (Idle, Enumerating) => true,
            (Enumerating, Acquiring) | (Enumerating, PausedError) => true,
            (Acquiring, Scanning) | (Acquiring, PausedError) => true,
            (Scanning, Processing) | (Processing, Scanning) => true,
            // Fatal errors may interrupt a check-in
            (Processing, PausedError) => true,
            (Scanning, PausedError) | (PausedError, Scanning) => true,
            _ => false,
        }
    }

    /// Whether the session is past its terminal transition
    pub fn is_closed(&self) -> bool {
        matches!(self, ScanState::Closed)
    }

    /// Human-readable name for logs and reports
    pub fn name(&self) -> &'static str {
        match self {
            ScanState::Idle => "Idle",
            ScanState::Enumerating => "Enumerating",
            ScanState::Acquiring => "Acquiring",
            ScanState::Scanning => "Scanning",
            ScanState::Processing => "Processing",
            ScanState::PausedError => "Paused-Error",
            ScanState::Closed => "Closed",
        }
    }
}

impl fmt::Display for ScanState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

// =============================================================================
// Session Token
// =============================================================================

/// Per-session cancellation token
///
/// Cloned into every task the session spawns. Teardown cancels it; a
/// continuation holding a cancelled token, or a token from an older
/// generation, must discard its result.
#[derive(Debug, Clone)]
pub struct SessionToken {
    generation: u64,
    cancel: CancellationToken,
}

impl SessionToken {
    pub fn new(generation: u64) -> Self {
        Self {
            generation,
            cancel: CancellationToken::new(),
        }
    }

    /// Generation number of the session this token belongs to
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Resolves once the session is torn down
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await
    }
}

// =============================================================================
// Scan Result
// =============================================================================

/// One decoded payload, consumed immediately by the submitter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanResult {
    pub payload: String,
    pub observed_at: DateTime<Utc>,
}

impl ScanResult {
    pub fn new(payload: String) -> Self {
        Self {
            payload,
            observed_at: Utc::now(),
        }
    }
}

// =============================================================================
// Session Handles
// =============================================================================

/// Hardware and timer handles owned by one session
#[derive(Default)]
pub struct SessionHandles {
    pub stream: Option<Box<dyn MediaStream>>,
    pub decoder: Option<Box<dyn DecoderEngine>>,
    pub resume_timer: Option<JoinHandle<()>>,
}

impl SessionHandles {
    /// Whether nothing is held
    pub fn is_empty(&self) -> bool {
        self.stream.is_none() && self.decoder.is_none() && self.resume_timer.is_none()
    }
}

impl fmt::Debug for SessionHandles {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandles")
            .field("stream", &self.stream.as_ref().map(|s| s.id().to_string()))
            .field("decoder", &self.decoder.as_ref().map(|d| d.state()))
            .field("resume_timer", &self.resume_timer.is_some())
            .finish()
    }
}

// =============================================================================
// Scan Session
// =============================================================================

/// One open-to-closed cycle of the scanner
#[derive(Debug)]
pub struct ScanSession {
    pub token: SessionToken,
    pub event_id: String,
    pub event_name: String,
    pub decoder_config: DecoderConfig,
    pub state: ScanState,
    pub selected_device: Option<CameraDevice>,
    pub handles: SessionHandles,
    pub last_error_kind: Option<ErrorKind>,
    pub last_error_message: Option<String>,
    /// True for the whole life of one in-flight check-in, cool-down included
    pub processing: bool,
    /// Set when the session stopped on an error that needs a manual retry
    pub fatal: bool,
}

impl ScanSession {
    pub fn new(
        generation: u64,
        event_id: &str,
        event_name: &str,
        decoder_config: DecoderConfig,
    ) -> Self {
        Self {
            token: SessionToken::new(generation),
            event_id: event_id.to_string(),
            event_name: event_name.to_string(),
            decoder_config,
            state: ScanState::Idle,
            selected_device: None,
            handles: SessionHandles::default(),
            last_error_kind: None,
            last_error_message: None,
            processing: false,
            fatal: false,
        }
    }

    pub fn generation(&self) -> u64 {
        self.token.generation()
    }

    /// Whether `token` belongs to this session and the session is still live
    pub fn is_live_for(&self, token: &SessionToken) -> bool {
        self.token.generation() == token.generation()
            && !token.is_cancelled()
            && !self.state.is_closed()
    }

    /// Record an error on the session
    pub fn record_error(&mut self, kind: ErrorKind, message: String) {
        self.last_error_kind = Some(kind);
        self.last_error_message = Some(message);
    }

    /// Record a taxonomy error on the session
    pub fn record_scan_error(&mut self, error: &ScanError) {
        self.record_error(error.kind(), error.user_message());
    }

    pub fn clear_error(&mut self) {
        self.last_error_kind = None;
        self.last_error_message = None;
    }

    /// Read-only view of the session
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            generation: self.generation(),
            event_id: self.event_id.clone(),
            event_name: self.event_name.clone(),
            state: self.state,
            selected_device_id: self.selected_device.as_ref().map(|d| d.id.clone()),
            has_stream: self.handles.stream.is_some(),
            has_decoder: self.handles.decoder.is_some(),
            last_error_kind: self.last_error_kind,
            last_error_message: self.last_error_message.clone(),
            processing: self.processing,
            fatal: self.fatal,
        }
    }
}

/// Copyable view of a session for hosts and tests
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub generation: u64,
    pub event_id: String,
    pub event_name: String,
    pub state: ScanState,
    pub selected_device_id: Option<String>,
    pub has_stream: bool,
    pub has_decoder: bool,
    pub last_error_kind: Option<ErrorKind>,
    pub last_error_message: Option<String>,
    pub processing: bool,
    pub fatal: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_path_allowed() {
        use ScanState::*;
        assert!(Idle.can_transition_to(Enumerating));
        assert!(Enumerating.can_transition_to(Acquiring));
        assert!(Acquiring.can_transition_to(Scanning));
        assert!(Scanning.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Closed));
    }

    #[test]
    fn test_only_declared_loops_revisit() {
        use ScanState::*;
        assert!(Processing.can_transition_to(Scanning));
        assert!(PausedError.can_transition_to(Scanning));
        assert!(Scanning.can_transition_to(PausedError));
        assert!(Processing.can_transition_to(PausedError));

        assert!(!Scanning.can_transition_to(Acquiring));
        assert!(!Acquiring.can_transition_to(Enumerating));
        assert!(!PausedError.can_transition_to(Acquiring));
        assert!(!Idle.can_transition_to(Scanning));
    }

    #[test]
    fn test_closed_is_terminal_and_reachable() {
        use ScanState::*;
        for state in [Idle, Enumerating, Acquiring, Scanning, Processing, PausedError] {
            assert!(state.can_transition_to(Closed), "{} -> Closed", state);
            assert!(!Closed.can_transition_to(state));
        }
        assert!(!Closed.can_transition_to(Closed));
    }

    #[test]
    fn test_session_liveness() {
        let session = ScanSession::new(3, "E1", "Spring Gala", DecoderConfig::default());
        let token = session.token.clone();
        assert!(session.is_live_for(&token));
        assert!(!session.is_live_for(&SessionToken::new(2)));

        token.cancel();
        assert!(!session.is_live_for(&token));
        assert!(session.token.is_cancelled());
    }

    #[test]
    fn test_error_recording() {
        let mut session = ScanSession::new(1, "E1", "", DecoderConfig::default());
        session.record_scan_error(&ScanError::DeviceNotFound);
        let snap = session.snapshot();
        assert_eq!(snap.last_error_kind, Some(ErrorKind::DeviceNotFound));
        assert!(snap.last_error_message.is_some());

        session.clear_error();
        assert!(session.snapshot().last_error_kind.is_none());
    }
}
