//! Predefined scan scenarios
//!
//! Each scenario scripts a mock platform, a decoder and a check-in server,
//! then drives the coordinator through a list of steps. The runner checks
//! the observed outcome against [`ExpectedResults`] and against the
//! lifecycle invariants that hold for every scenario.

use std::time::Duration;

use super::mock_camera::{MockCameraConfig, PlatformError};
use super::mock_checkin::ScriptedOutcome;
use crate::core::error::{ErrorKind, ScanError};
use crate::device::CameraDevice;
use crate::scanner::ScanState;

/// One step of a scenario script
#[derive(Debug, Clone, PartialEq)]
pub enum ScenarioStep {
    /// Open the scanner for an event
    Open(String),
    /// Let pending tasks run
    Settle,
    /// Wait out the resume cool-down
    CoolDown,
    /// Wait a fixed time
    Wait(Duration),
    /// Decoder reports a payload (only while scanning)
    Decode(String),
    /// Deliver a decode callback regardless of decoder state
    InjectDecode(String),
    /// Decoder reports a per-frame error
    DecoderError(String),
    /// Decoder engine dies and closes its event channel
    DecoderExit,
    /// Resolve one held acquisition
    ReleaseAcquisition,
    /// Stop failing acquisitions
    ClearAcquisitionError,
    Close,
    Retry,
}

/// A complete scenario: platform, scripts, steps and expectations
#[derive(Debug, Clone)]
pub struct ScanScenario {
    /// Scenario name for identification
    pub name: String,
    /// What this scenario tests
    pub description: String,
    pub camera: MockCameraConfig,
    /// Server verdicts, replayed in order
    pub check_ins: Vec<ScriptedOutcome>,
    pub submit_latency: Duration,
    pub decoder_start_error: Option<ScanError>,
    pub steps: Vec<ScenarioStep>,
    pub expected: ExpectedResults,
    /// Tags for filtering scenarios
    pub tags: Vec<String>,
}

/// Expected observations after the last step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedResults {
    pub final_state: ScanState,
    /// Check-in requests that reached the server
    pub submissions: usize,
    /// `CheckInSucceeded` events
    pub successes: usize,
    /// `Failed` events
    pub failures: usize,
    /// Error recorded on the session at the end, if any
    pub last_error: Option<ErrorKind>,
    /// Streams still live after the last step
    pub live_streams: usize,
    /// Acquisition calls, when the scenario cares
    pub acquisitions: Option<usize>,
    /// Camera the selector must pick, when the scenario cares
    pub selected_device: Option<String>,
}

impl Default for ExpectedResults {
    fn default() -> Self {
        Self {
            final_state: ScanState::Closed,
            submissions: 0,
            successes: 0,
            failures: 0,
            last_error: None,
            live_streams: 0,
            acquisitions: None,
            selected_device: None,
        }
    }
}

impl ScanScenario {
    pub fn new(
        name: &str,
        description: &str,
        camera: MockCameraConfig,
        steps: Vec<ScenarioStep>,
        expected: ExpectedResults,
    ) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            camera,
            check_ins: Vec::new(),
            submit_latency: Duration::ZERO,
            decoder_start_error: None,
            steps,
            expected,
            tags: Vec::new(),
        }
    }

    pub fn with_check_ins(mut self, outcomes: Vec<ScriptedOutcome>) -> Self {
        self.check_ins = outcomes;
        self
    }

    pub fn with_submit_latency(mut self, latency: Duration) -> Self {
        self.submit_latency = latency;
        self
    }

    pub fn with_decoder_start_error(mut self, error: ScanError) -> Self {
        self.decoder_start_error = Some(error);
        self
    }

    /// Add tags to the scenario
    pub fn with_tags(mut self, tags: Vec<&str>) -> Self {
        self.tags = tags.into_iter().map(String::from).collect();
        self
    }
}

fn open(event_id: &str) -> ScenarioStep {
    ScenarioStep::Open(event_id.to_string())
}

fn decode(payload: &str) -> ScenarioStep {
    ScenarioStep::Decode(payload.to_string())
}

fn inject(payload: &str) -> ScenarioStep {
    ScenarioStep::InjectDecode(payload.to_string())
}

fn back_camera() -> MockCameraConfig {
    MockCameraConfig::with_devices(vec![CameraDevice::new("cam1", "Back Camera")])
}

/// Collection of all predefined scenarios
pub struct ScenarioLibrary;

impl ScenarioLibrary {
    // =========================================================================
    // CORE LIFECYCLE
    // =========================================================================

    /// Scenario A: one scan, accepted, scanner closes
    pub fn accepted_check_in() -> ScanScenario {
        use ScenarioStep::*;
        ScanScenario::new(
            "accepted_check_in",
            "Back camera, one QR code, server accepts, scanner closes",
            back_camera(),
            vec![open("E1"), Settle, decode("QR-123"), Settle],
            ExpectedResults {
                final_state: ScanState::Closed,
                submissions: 1,
                successes: 1,
                selected_device: Some("cam1".to_string()),
                ..Default::default()
            },
        )
        .with_tags(vec!["lifecycle", "check-in", "basic"])
    }

    /// Scenario B: server rejects, scanning resumes on the same stream
    pub fn rejected_check_in() -> ScanScenario {
        use ScenarioStep::*;
        ScanScenario::new(
            "rejected_check_in",
            "Server rejects with code 4000; scanning resumes after the cool-down",
            back_camera(),
            vec![open("E1"), Settle, decode("QR-123"), Settle, CoolDown],
            ExpectedResults {
                final_state: ScanState::Scanning,
                submissions: 1,
                live_streams: 1,
                acquisitions: Some(1),
                ..Default::default()
            },
        )
        .with_check_ins(vec![ScriptedOutcome::Reject {
            code: 4000,
            message: "expired".to_string(),
        }])
        .with_tags(vec!["lifecycle", "check-in", "recoverable"])
    }

    /// Scenario C: no cameras at all
    pub fn no_cameras() -> ScanScenario {
        use ScenarioStep::*;
        ScanScenario::new(
            "no_cameras",
            "Enumeration returns an empty list; no acquisition is attempted",
            MockCameraConfig::with_devices(vec![]),
            vec![open("E1"), Settle],
            ExpectedResults {
                final_state: ScanState::PausedError,
                failures: 1,
                last_error: Some(ErrorKind::DeviceNotFound),
                acquisitions: Some(0),
                ..Default::default()
            },
        )
        .with_tags(vec!["acquisition", "error"])
    }

    /// Scenario D: close wins the race against a pending acquisition
    pub fn close_during_acquisition() -> ScanScenario {
        use ScenarioStep::*;
        ScanScenario::new(
            "close_during_acquisition",
            "Scanner closes while the permission prompt is open; the late stream is released",
            MockCameraConfig {
                hold_acquisition: true,
                ..back_camera()
            },
            vec![open("E1"), Settle, Close, ReleaseAcquisition, Settle],
            ExpectedResults {
                final_state: ScanState::Closed,
                acquisitions: Some(1),
                ..Default::default()
            },
        )
        .with_tags(vec!["race", "acquisition"])
    }

    // =========================================================================
    // ACQUISITION
    // =========================================================================

    pub fn permission_denied() -> ScanScenario {
        use ScenarioStep::*;
        ScanScenario::new(
            "permission_denied",
            "User denies camera access",
            MockCameraConfig {
                acquisition_error: Some(PlatformError::not_allowed()),
                ..back_camera()
            },
            vec![open("E1"), Settle],
            ExpectedResults {
                final_state: ScanState::PausedError,
                failures: 1,
                last_error: Some(ErrorKind::PermissionDenied),
                ..Default::default()
            },
        )
        .with_tags(vec!["acquisition", "error"])
    }

    pub fn overconstrained_camera() -> ScanScenario {
        use ScenarioStep::*;
        ScanScenario::new(
            "overconstrained_camera",
            "Selected camera cannot satisfy the exact device constraint",
            MockCameraConfig {
                acquisition_error: Some(PlatformError::overconstrained("deviceId")),
                ..back_camera()
            },
            vec![open("E1"), Settle],
            ExpectedResults {
                final_state: ScanState::PausedError,
                failures: 1,
                last_error: Some(ErrorKind::Overconstrained),
                acquisitions: Some(1),
                ..Default::default()
            },
        )
        .with_tags(vec!["acquisition", "error"])
    }

    pub fn prefers_front_camera() -> ScanScenario {
        use ScenarioStep::*;
        ScanScenario::new(
            "prefers_front_camera",
            "Front camera listed after the back camera is still the one used",
            MockCameraConfig::with_devices(vec![
                CameraDevice::new("cam-usb", "USB Video Device"),
                CameraDevice::new("cam-back", "Back Camera"),
                CameraDevice::new("cam-front", "Front Camera"),
            ]),
            vec![open("E1"), Settle],
            ExpectedResults {
                final_state: ScanState::Scanning,
                live_streams: 1,
                selected_device: Some("cam-front".to_string()),
                ..Default::default()
            },
        )
        .with_tags(vec!["acquisition", "basic"])
    }

    pub fn decoder_start_failure() -> ScanScenario {
        use ScenarioStep::*;
        ScanScenario::new(
            "decoder_start_failure",
            "Decoder fails to start; the acquired stream is released",
            back_camera(),
            vec![open("E1"), Settle],
            ExpectedResults {
                final_state: ScanState::PausedError,
                failures: 1,
                last_error: Some(ErrorKind::DecoderStart),
                acquisitions: Some(1),
                ..Default::default()
            },
        )
        .with_decoder_start_error(ScanError::DecoderStart("canvas unavailable".to_string()))
        .with_tags(vec!["acquisition", "decoder", "error"])
    }

    pub fn manual_retry() -> ScanScenario {
        use ScenarioStep::*;
        ScanScenario::new(
            "manual_retry",
            "Camera busy on first open; a manual retry starts scanning",
            MockCameraConfig {
                acquisition_error: Some(PlatformError::not_readable(
                    "Could not start video source",
                )),
                ..back_camera()
            },
            vec![open("E1"), Settle, ClearAcquisitionError, Retry, Settle],
            ExpectedResults {
                final_state: ScanState::Scanning,
                failures: 1,
                live_streams: 1,
                acquisitions: Some(2),
                ..Default::default()
            },
        )
        .with_tags(vec!["acquisition", "recoverable"])
    }

    pub fn missing_event() -> ScanScenario {
        use ScenarioStep::*;
        ScanScenario::new(
            "missing_event",
            "Scanner opened without an event id; no hardware is touched",
            back_camera(),
            vec![open(""), Settle],
            ExpectedResults {
                final_state: ScanState::Idle,
                failures: 1,
                acquisitions: Some(0),
                ..Default::default()
            },
        )
        .with_tags(vec!["lifecycle", "error"])
    }

    // =========================================================================
    // DECODING AND CHECK-IN
    // =========================================================================

    pub fn recoverable_resume() -> ScanScenario {
        use ScenarioStep::*;
        ScanScenario::new(
            "recoverable_resume",
            "Network error on the first check-in; the next scan succeeds",
            back_camera(),
            vec![
                open("E1"),
                Settle,
                decode("QR-1"),
                Settle,
                CoolDown,
                decode("QR-2"),
                Settle,
            ],
            ExpectedResults {
                final_state: ScanState::Closed,
                submissions: 2,
                successes: 1,
                ..Default::default()
            },
        )
        .with_check_ins(vec![ScriptedOutcome::NetworkError(
            "connection reset".to_string(),
        )])
        .with_tags(vec!["check-in", "recoverable"])
    }

    pub fn burst_dedup() -> ScanScenario {
        use ScenarioStep::*;
        ScanScenario::new(
            "burst_dedup",
            "Five decodes in one burst plus a late one; exactly one check-in",
            back_camera(),
            vec![
                open("E1"),
                Settle,
                inject("QR-1"),
                inject("QR-2"),
                inject("QR-3"),
                inject("QR-4"),
                inject("QR-5"),
                Settle,
                inject("QR-late"),
                Wait(Duration::from_millis(80)),
            ],
            ExpectedResults {
                final_state: ScanState::Closed,
                submissions: 1,
                successes: 1,
                ..Default::default()
            },
        )
        .with_submit_latency(Duration::from_millis(50))
        .with_tags(vec!["check-in", "race"])
    }

    pub fn decoder_noise() -> ScanScenario {
        use ScenarioStep::*;
        ScanScenario::new(
            "decoder_noise",
            "Per-frame 'no code found' errors are ignored",
            back_camera(),
            vec![
                open("E1"),
                Settle,
                DecoderError("NotFoundException: No MultiFormat Readers were able to detect the code.".to_string()),
                DecoderError("QR code parse error".to_string()),
                Settle,
            ],
            ExpectedResults {
                final_state: ScanState::Scanning,
                live_streams: 1,
                ..Default::default()
            },
        )
        .with_tags(vec!["decoder"])
    }

    pub fn decoder_error_resume() -> ScanScenario {
        use ScenarioStep::*;
        ScanScenario::new(
            "decoder_error_resume",
            "A real decoder error pauses scanning until the cool-down ends",
            back_camera(),
            vec![
                open("E1"),
                Settle,
                DecoderError("Video stream stalled".to_string()),
                Settle,
                inject("QR-ignored"),
                Settle,
                CoolDown,
            ],
            ExpectedResults {
                final_state: ScanState::Scanning,
                live_streams: 1,
                ..Default::default()
            },
        )
        .with_tags(vec!["decoder", "recoverable"])
    }

    pub fn decoder_engine_exit() -> ScanScenario {
        use ScenarioStep::*;
        ScanScenario::new(
            "decoder_engine_exit",
            "Decoder engine stops on its own; the camera is released and the host told once",
            back_camera(),
            vec![open("E1"), Settle, DecoderExit, Settle, CoolDown],
            ExpectedResults {
                final_state: ScanState::PausedError,
                failures: 1,
                last_error: Some(ErrorKind::DecoderStart),
                ..Default::default()
            },
        )
        .with_tags(vec!["decoder", "error"])
    }

    // =========================================================================
    // COLLECTIONS
    // =========================================================================

    /// Get all available scenarios
    pub fn all_scenarios() -> Vec<ScanScenario> {
        vec![
            Self::accepted_check_in(),
            Self::rejected_check_in(),
            Self::no_cameras(),
            Self::close_during_acquisition(),
            Self::permission_denied(),
            Self::overconstrained_camera(),
            Self::prefers_front_camera(),
            Self::decoder_start_failure(),
            Self::manual_retry(),
            Self::missing_event(),
            Self::recoverable_resume(),
            Self::burst_dedup(),
            Self::decoder_noise(),
            Self::decoder_error_resume(),
            Self::decoder_engine_exit(),
        ]
    }

    /// Scenarios carrying `tag`
    pub fn scenarios_by_tag(tag: &str) -> Vec<ScanScenario> {
        Self::all_scenarios()
            .into_iter()
            .filter(|s| s.tags.iter().any(|t| t == tag))
            .collect()
    }

    pub fn by_name(name: &str) -> Option<ScanScenario> {
        Self::all_scenarios().into_iter().find(|s| s.name == name)
    }
}
