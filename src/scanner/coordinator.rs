//! Scan Coordinator
//!
//! Owns the scan session lifecycle: enumerate cameras, pick one, acquire a
//! stream, bind it to the video sink, start the decoder, gate its results,
//! drive a single check-in per scan, and tear everything down.
//!
//! # Concurrency model
//!
//! All platform and network calls are suspension points. Session state
//! lives behind one mutex that is never held across an `.await`. Every
//! continuation carries the session's [`SessionToken`] and re-checks it
//! after resuming; a result that arrives after teardown is released or
//! dropped instead of being applied.
//!
//! Decoder results are pumped serially from a channel. The decode handler
//! is a guard, not a queue: while a check-in is in flight, or whenever the
//! session is not `Scanning`, decoded payloads are discarded.

use log::{debug, error, info, warn};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TryRecvError};
use tokio::task::JoinHandle;

use crate::checkin::{CheckInOutcome, CheckInRequest, CheckInSubmitter};
use crate::core::config::ScannerConfig;
use crate::core::error::{ErrorKind, Result, ScanError};
use crate::decoder::{
    is_decoder_noise, DecoderConfig, DecoderEngine, DecoderEvent, DecoderEventReceiver,
    DecoderProvider,
};
use crate::device::{
    select_camera, CameraDevice, CameraEnumerator, MediaStream, StreamAcquirer,
    StreamConstraints, VideoSink,
};
use crate::scanner::events::{NotificationLevel, ScanEvent};
use crate::scanner::guard::{release_stream, LifecycleGuard};
use crate::scanner::session::{
    ScanResult, ScanSession, ScanState, SessionHandles, SessionSnapshot, SessionToken,
};

/// Status line shown while the decoder is running
pub const SCANNING_PROMPT: &str = "Point the camera at a QR code";

/// Status line shown while a check-in is in flight
pub const PROCESSING_PROMPT: &str = "Checking in...";

// =============================================================================
// Settings and Platform
// =============================================================================

/// Coordinator tuning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorSettings {
    /// Cool-down between a failed check-in and resumed decoding
    pub resume_delay: Duration,
    /// Keep the last frame on screen while decoding is paused
    pub keep_last_frame: bool,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            resume_delay: Duration::from_millis(1000),
            keep_last_frame: true,
        }
    }
}

impl From<&ScannerConfig> for CoordinatorSettings {
    fn from(config: &ScannerConfig) -> Self {
        Self {
            resume_delay: config.resume_delay(),
            keep_last_frame: config.keep_last_frame_on_pause,
        }
    }
}

/// Platform collaborators the coordinator drives
pub struct ScanPlatform {
    pub enumerator: Arc<dyn CameraEnumerator>,
    pub acquirer: Arc<dyn StreamAcquirer>,
    pub decoders: Arc<dyn DecoderProvider>,
    pub sink: Box<dyn VideoSink>,
}

// =============================================================================
// Shared State
// =============================================================================

struct Inner {
    session: Option<ScanSession>,
    sink: Box<dyn VideoSink>,
    /// Generation of the session whose stream is bound to the sink
    sink_owner: Option<u64>,
    next_generation: u64,
    /// Task running the latest session's acquisition and decode pump
    lifecycle: Option<JoinHandle<()>>,
}

impl Inner {
    fn live_session(&mut self, token: &SessionToken) -> Option<&mut ScanSession> {
        self.session.as_mut().filter(|s| s.is_live_for(token))
    }
}

/// Hand out the sink only to the session that bound it
fn owned_sink<'a>(
    sink: &'a mut Box<dyn VideoSink>,
    sink_owner: &mut Option<u64>,
    generation: u64,
) -> Option<&'a mut dyn VideoSink> {
    if *sink_owner == Some(generation) {
        *sink_owner = None;
        Some(sink.as_mut())
    } else {
        None
    }
}

struct Shared {
    enumerator: Arc<dyn CameraEnumerator>,
    acquirer: Arc<dyn StreamAcquirer>,
    decoders: Arc<dyn DecoderProvider>,
    submitter: Arc<dyn CheckInSubmitter>,
    settings: CoordinatorSettings,
    inner: Mutex<Inner>,
    events: mpsc::UnboundedSender<ScanEvent>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: ScanEvent) {
        // The host may have stopped listening; events are advisory.
        let _ = self.events.send(event);
    }

    fn transition(&self, session: &mut ScanSession, to: ScanState) -> bool {
        let from = session.state;
        if !from.can_transition_to(to) {
            warn!(
                "Ignoring invalid scanner transition {} -> {} (session {})",
                from,
                to,
                session.generation()
            );
            return false;
        }

        session.state = to;
        info!(
            "Scanner session {} [{}]: {} -> {}",
            session.generation(),
            session.event_id,
            from,
            to
        );
        self.emit(ScanEvent::StateChanged {
            generation: session.generation(),
            from,
            to,
        });
        true
    }

    /// Close the current session if it is not closed already
    ///
    /// Returns the decoder to stop once the lock is released.
    fn shutdown_locked(&self, inner: &mut Inner) -> Option<Box<dyn DecoderEngine>> {
        let Inner {
            session,
            sink,
            sink_owner,
            ..
        } = inner;
        let session = session.as_mut()?;
        if session.state.is_closed() {
            return None;
        }

        session.token.cancel();
        let sink = owned_sink(sink, sink_owner, session.generation());
        let decoder = LifecycleGuard::release(&mut session.handles, sink);
        session.processing = false;
        self.transition(session, ScanState::Closed);
        decoder
    }

    /// Stop the session on a fatal error
    fn fail(&self, token: &SessionToken, err: ScanError) {
        let decoder = {
            let mut guard = self.lock();
            let Inner {
                session,
                sink,
                sink_owner,
                ..
            } = &mut *guard;
            let Some(session) = session
                .as_mut()
                .filter(|s| s.is_live_for(token) && !s.fatal)
            else {
                debug!("Dropping error for stopped session {}: {}", token.generation(), err);
                return;
            };

            error!(
                "Scanner stopped for event {}: {} ({})",
                session.event_id,
                err,
                err.kind()
            );
            session.record_scan_error(&err);
            session.fatal = true;
            session.processing = false;
            let sink = owned_sink(sink, sink_owner, session.generation());
            let decoder = LifecycleGuard::release(&mut session.handles, sink);
            self.transition(session, ScanState::PausedError);

            self.emit(ScanEvent::Message {
                kind: Some(err.kind()),
                text: Some(err.user_message()),
            });
            self.emit(ScanEvent::Notification {
                level: NotificationLevel::Error,
                message: err.user_message(),
            });
            self.emit(ScanEvent::Failed { error: err });
            decoder
        };

        if decoder.is_some() {
            tokio::spawn(LifecycleGuard::finish(decoder));
        }
    }

    /// Release hardware that never made it into the session
    async fn release_uncommitted(
        &self,
        token: &SessionToken,
        stream: Option<Box<dyn MediaStream>>,
        decoder: Option<Box<dyn DecoderEngine>>,
    ) {
        let mut handles = SessionHandles {
            stream,
            decoder,
            resume_timer: None,
        };
        let decoder = {
            let mut guard = self.lock();
            let Inner {
                sink, sink_owner, ..
            } = &mut *guard;
            let sink = owned_sink(sink, sink_owner, token.generation());
            LifecycleGuard::release(&mut handles, sink)
        };
        LifecycleGuard::finish(decoder).await;
    }

    // -------------------------------------------------------------------------
    // Acquisition
    // -------------------------------------------------------------------------

    async fn run_lifecycle(self: Arc<Self>, token: SessionToken) {
        let Some(device) = self.enumerate(&token).await else {
            return;
        };
        let Some((stream, decoder, events)) = self.acquire(&token, &device).await else {
            return;
        };
        if !self.commit(&token, stream, decoder).await {
            return;
        }
        self.pump(&token, events).await;
        debug!("Decode pump for session {} finished", token.generation());
    }

    async fn enumerate(&self, token: &SessionToken) -> Option<CameraDevice> {
        let listed = self.enumerator.list_cameras().await;
        if token.is_cancelled() {
            debug!(
                "Session {} closed during enumeration; discarding camera list",
                token.generation()
            );
            return None;
        }

        let devices = match listed {
            Ok(devices) => devices,
            Err(e) => {
                let err = match e {
                    ScanError::DeviceNotFound
                    | ScanError::DeviceEnumeration(_)
                    | ScanError::PermissionDenied => e,
                    other => ScanError::DeviceEnumeration(other.to_string()),
                };
                self.fail(token, err);
                return None;
            }
        };

        debug!("Platform reported {} camera(s)", devices.len());
        let Some(device) = select_camera(&devices).cloned() else {
            self.fail(token, ScanError::DeviceNotFound);
            return None;
        };

        let mut inner = self.lock();
        let session = inner.live_session(token)?;
        info!("Selected camera {}", device);
        session.selected_device = Some(device.clone());
        self.transition(session, ScanState::Acquiring);
        Some(device)
    }

    async fn acquire(
        &self,
        token: &SessionToken,
        device: &CameraDevice,
    ) -> Option<(Box<dyn MediaStream>, Box<dyn DecoderEngine>, DecoderEventReceiver)> {
        let acquired = self
            .acquirer
            .acquire_stream(&StreamConstraints::exact(&device.id))
            .await;

        let mut stream = match acquired {
            Ok(stream) => stream,
            Err(e) => {
                self.fail(token, e);
                return None;
            }
        };

        if token.is_cancelled() {
            info!(
                "Session {} closed while acquiring; releasing late stream {}",
                token.generation(),
                stream.id()
            );
            release_stream(stream.as_mut());
            return None;
        }

        let bound: Option<Result<(String, DecoderConfig)>> = {
            let mut guard = self.lock();
            let Inner {
                session,
                sink,
                sink_owner,
                ..
            } = &mut *guard;
            session
                .as_mut()
                .filter(|s| s.is_live_for(token))
                .map(|session| -> Result<(String, DecoderConfig)> {
                    sink.attach(stream.as_ref())?;
                    *sink_owner = Some(token.generation());
                    sink.play()?;
                    Ok((sink.source_id().to_string(), session.decoder_config.clone()))
                })
        };

        let (source_id, config) = match bound {
            Some(Ok(bound)) => bound,
            Some(Err(e)) => {
                self.release_uncommitted(token, Some(stream), None).await;
                self.fail(token, e);
                return None;
            }
            None => {
                self.release_uncommitted(token, Some(stream), None).await;
                return None;
            }
        };

        let (tx, rx) = mpsc::unbounded_channel();
        let mut decoder = self.decoders.create_decoder();
        if let Err(e) = decoder.start(&source_id, &config, tx).await {
            let err = match e {
                ScanError::DecoderStart(_)
                | ScanError::PermissionDenied
                | ScanError::StreamRead(_)
                | ScanError::Overconstrained(_) => e,
                other => ScanError::DecoderStart(other.to_string()),
            };
            self.release_uncommitted(token, Some(stream), Some(decoder))
                .await;
            self.fail(token, err);
            return None;
        }

        Some((stream, decoder, rx))
    }

    /// Hand the acquired handles to the session, or release them if it closed meanwhile
    async fn commit(
        &self,
        token: &SessionToken,
        stream: Box<dyn MediaStream>,
        decoder: Box<dyn DecoderEngine>,
    ) -> bool {
        let rejected = {
            let mut inner = self.lock();
            match inner.live_session(token) {
                Some(session) => {
                    session.handles.stream = Some(stream);
                    session.handles.decoder = Some(decoder);
                    session.clear_error();
                    self.transition(session, ScanState::Scanning);
                    self.emit(ScanEvent::Message {
                        kind: None,
                        text: Some(SCANNING_PROMPT.to_string()),
                    });
                    None
                }
                None => Some((stream, decoder)),
            }
        };

        match rejected {
            None => true,
            Some((stream, decoder)) => {
                info!(
                    "Session {} closed while the decoder was starting; releasing",
                    token.generation()
                );
                self.release_uncommitted(token, Some(stream), Some(decoder))
                    .await;
                false
            }
        }
    }

    // -------------------------------------------------------------------------
    // Decoding
    // -------------------------------------------------------------------------

    async fn pump(self: &Arc<Self>, token: &SessionToken, mut events: DecoderEventReceiver) {
        loop {
            let event = tokio::select! {
                _ = token.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => event,
                    None => {
                        if !token.is_cancelled() {
                            self.fail(
                                token,
                                ScanError::DecoderStart(
                                    "decoder engine stopped unexpectedly".to_string(),
                                ),
                            );
                        }
                        break;
                    }
                },
            };

            match event {
                DecoderEvent::Decoded(payload) => self.on_decode(token, payload),
                DecoderEvent::ScanError(message) => self.on_scan_error(token, message),
            }
        }
    }

    fn on_decode(self: &Arc<Self>, token: &SessionToken, payload: String) {
        let request = {
            let mut inner = self.lock();
            let Some(session) = inner.live_session(token) else {
                return;
            };
            if session.processing || session.state != ScanState::Scanning {
                debug!(
                    "Discarding decode event while {} (processing: {})",
                    session.state, session.processing
                );
                return;
            }

            session.processing = true;
            if let Some(decoder) = session.handles.decoder.as_mut() {
                decoder.pause(self.settings.keep_last_frame);
            }
            self.transition(session, ScanState::Processing);

            let result = ScanResult::new(payload);
            info!(
                "QR code decoded at {}; checking in to event {}",
                result.observed_at.format("%H:%M:%S%.3f"),
                session.event_id
            );
            self.emit(ScanEvent::Message {
                kind: None,
                text: Some(PROCESSING_PROMPT.to_string()),
            });
            CheckInRequest::new(&session.event_id, &result.payload)
        };

        let shared = Arc::clone(self);
        let token = token.clone();
        tokio::spawn(async move { shared.submit(token, request).await });
    }

    fn on_scan_error(self: &Arc<Self>, token: &SessionToken, message: String) {
        if is_decoder_noise(&message) {
            return;
        }

        let mut inner = self.lock();
        let Some(session) = inner.live_session(token) else {
            return;
        };
        if session.processing || session.state != ScanState::Scanning {
            debug!("Ignoring decoder error while {}: {}", session.state, message);
            return;
        }

        warn!("Decoder error on event {}: {}", session.event_id, message);
        if let Some(decoder) = session.handles.decoder.as_mut() {
            decoder.pause(self.settings.keep_last_frame);
        }
        session.record_error(ErrorKind::Decoder, message.clone());
        self.transition(session, ScanState::PausedError);
        self.emit(ScanEvent::Message {
            kind: Some(ErrorKind::Decoder),
            text: Some(message),
        });
        self.schedule_resume(session, token);
    }

    // -------------------------------------------------------------------------
    // Check-in
    // -------------------------------------------------------------------------

    async fn submit(self: Arc<Self>, token: SessionToken, request: CheckInRequest) {
        let result = self.submitter.submit(&request).await;
        if token.is_cancelled() {
            info!(
                "Scanner closed while check-in for event {} was in flight; discarding result",
                request.event_id
            );
            return;
        }

        match result {
            Ok(outcome) if outcome.accepted => self.on_check_in_accepted(&token, request, outcome).await,
            Ok(outcome) => self.on_check_in_failed(
                &token,
                ScanError::Api {
                    code: None,
                    message: outcome.message,
                },
            ),
            Err(e) => self.on_check_in_failed(&token, e),
        }
    }

    async fn on_check_in_accepted(
        &self,
        token: &SessionToken,
        request: CheckInRequest,
        outcome: CheckInOutcome,
    ) {
        let decoder = {
            let mut inner = self.lock();
            if inner.live_session(token).is_none() {
                return;
            }

            info!("Check-in accepted for event {}", request.event_id);
            self.emit(ScanEvent::Notification {
                level: NotificationLevel::Success,
                message: outcome.message.clone(),
            });
            self.emit(ScanEvent::CheckInSucceeded {
                event_id: request.event_id,
                payload: request.payload,
                outcome,
            });
            let decoder = self.shutdown_locked(&mut inner);
            self.emit(ScanEvent::CloseRequested);
            decoder
        };
        LifecycleGuard::finish(decoder).await;
    }

    fn on_check_in_failed(self: &Arc<Self>, token: &SessionToken, err: ScanError) {
        let mut inner = self.lock();
        let Some(session) = inner.live_session(token) else {
            return;
        };
        if session.fatal {
            warn!("Check-in failed after the scanner stopped: {}", err);
            return;
        }

        warn!(
            "Check-in failed for event {} ({}): {}; resuming in {:?}",
            session.event_id,
            err.kind(),
            err,
            self.settings.resume_delay
        );
        session.record_scan_error(&err);
        self.emit(ScanEvent::Message {
            kind: Some(err.kind()),
            text: Some(err.user_message()),
        });
        self.emit(ScanEvent::Notification {
            level: NotificationLevel::Warning,
            message: err.user_message(),
        });
        self.schedule_resume(session, token);
    }

    // -------------------------------------------------------------------------
    // Resume
    // -------------------------------------------------------------------------

    fn schedule_resume(self: &Arc<Self>, session: &mut ScanSession, token: &SessionToken) {
        if let Some(previous) = session.handles.resume_timer.take() {
            previous.abort();
        }

        let shared = Arc::clone(self);
        let token = token.clone();
        let delay = self.settings.resume_delay;
        session.handles.resume_timer = Some(tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => shared.resume_scanning(&token),
            }
        }));
    }

    fn resume_scanning(&self, token: &SessionToken) {
        let mut inner = self.lock();
        let Some(session) = inner.live_session(token) else {
            return;
        };
        if session.fatal || !matches!(session.state, ScanState::Processing | ScanState::PausedError) {
            return;
        }

        session.handles.resume_timer = None;
        if let Some(decoder) = session.handles.decoder.as_mut() {
            decoder.resume();
        }
        session.processing = false;
        session.clear_error();
        self.transition(session, ScanState::Scanning);
        self.emit(ScanEvent::Message {
            kind: None,
            text: None,
        });
    }
}

// =============================================================================
// Scan Coordinator
// =============================================================================

/// Scan/check-in lifecycle coordinator
///
/// One coordinator serves one scanner surface. Sessions are opened with
/// [`open`](Self::open), closed with [`close`](Self::close), and torn down
/// automatically when the coordinator is dropped. Must be used from within
/// a Tokio runtime.
pub struct ScanCoordinator {
    shared: Arc<Shared>,
    event_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<ScanEvent>>,
}

impl ScanCoordinator {
    /// Create a coordinator over the given platform and submitter
    pub fn new(
        platform: ScanPlatform,
        submitter: Arc<dyn CheckInSubmitter>,
        settings: CoordinatorSettings,
    ) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let shared = Shared {
            enumerator: platform.enumerator,
            acquirer: platform.acquirer,
            decoders: platform.decoders,
            submitter,
            settings,
            inner: Mutex::new(Inner {
                session: None,
                sink: platform.sink,
                sink_owner: None,
                next_generation: 1,
                lifecycle: None,
            }),
            events: event_tx,
        };

        Self {
            shared: Arc::new(shared),
            event_rx: tokio::sync::Mutex::new(event_rx),
        }
    }

    /// Open a scan session for an event
    ///
    /// Returns the new session's generation number. An empty event id is a
    /// [`ScanError::Validation`] and touches no hardware. Opening while a
    /// session is live is rejected; a session stopped on a fatal error is
    /// closed first.
    pub fn open(&self, event_id: &str, event_name: &str, config: DecoderConfig) -> Result<u64> {
        let event_id = event_id.trim();
        if event_id.is_empty() {
            let err = ScanError::Validation("select an event before scanning".to_string());
            warn!("Scanner opened without an event id");
            self.shared.emit(ScanEvent::Message {
                kind: Some(err.kind()),
                text: Some(err.user_message()),
            });
            self.shared.emit(ScanEvent::Notification {
                level: NotificationLevel::Error,
                message: err.user_message(),
            });
            self.shared.emit(ScanEvent::Failed { error: err.clone() });
            return Err(err);
        }

        let mut inner = self.shared.lock();
        if let Some(live) = inner
            .session
            .as_ref()
            .filter(|s| !s.state.is_closed() && !s.fatal)
        {
            return Err(ScanError::Validation(format!(
                "scanner is already open for event {}",
                live.event_id
            )));
        }
        let stale_decoder = self.shared.shutdown_locked(&mut inner);

        let generation = inner.next_generation;
        inner.next_generation += 1;

        let mut session = ScanSession::new(generation, event_id, event_name, config);
        let token = session.token.clone();
        info!(
            "Opening scanner for event {} ({}) as session {}",
            event_id,
            if event_name.is_empty() { "unnamed" } else { event_name },
            generation
        );
        self.shared.transition(&mut session, ScanState::Enumerating);
        inner.session = Some(session);

        // A previous session may still be waiting on the platform; it must
        // release its late stream before this one acquires.
        let previous = inner.lifecycle.take();
        let shared = Arc::clone(&self.shared);
        inner.lifecycle = Some(tokio::spawn(async move {
            if let Some(previous) = previous {
                let _ = previous.await;
            }
            shared.run_lifecycle(token).await;
        }));
        drop(inner);

        if stale_decoder.is_some() {
            tokio::spawn(LifecycleGuard::finish(stale_decoder));
        }
        Ok(generation)
    }

    /// Close the current session and release all of its resources
    ///
    /// Idempotent; closing an already closed (or never opened) scanner does nothing.
    pub async fn close(&self) {
        let decoder = {
            let mut inner = self.shared.lock();
            self.shared.shutdown_locked(&mut inner)
        };
        LifecycleGuard::finish(decoder).await;
    }

    /// Manually retry after a fatal error
    ///
    /// Fully tears down the failed session, then opens a new one for the
    /// same event.
    pub async fn retry(&self) -> Result<u64> {
        let (event_id, event_name, config) = {
            let inner = self.shared.lock();
            match inner.session.as_ref() {
                Some(s) if s.fatal && s.state == ScanState::PausedError => {
                    (s.event_id.clone(), s.event_name.clone(), s.decoder_config.clone())
                }
                _ => {
                    return Err(ScanError::Validation(
                        "retry is only possible after a camera error".to_string(),
                    ))
                }
            }
        };

        info!("Retrying scanner for event {}", event_id);
        self.close().await;
        self.open(&event_id, &event_name, config)
    }

    /// State of the current session, `Idle` if none was ever opened
    pub fn state(&self) -> ScanState {
        self.shared
            .lock()
            .session
            .as_ref()
            .map(|s| s.state)
            .unwrap_or(ScanState::Idle)
    }

    /// Snapshot of the current session
    pub fn snapshot(&self) -> Option<SessionSnapshot> {
        self.shared.lock().session.as_ref().map(|s| s.snapshot())
    }

    /// Whether a check-in is in flight or cooling down
    pub fn is_processing(&self) -> bool {
        self.shared
            .lock()
            .session
            .as_ref()
            .is_some_and(|s| s.processing)
    }

    pub fn settings(&self) -> &CoordinatorSettings {
        &self.shared.settings
    }

    /// Try to receive the next event (non-blocking)
    pub fn try_recv_event(&self) -> Option<ScanEvent> {
        let mut rx = self.event_rx.try_lock().ok()?;
        match rx.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Wait for the next event
    pub async fn next_event(&self) -> Option<ScanEvent> {
        self.event_rx.lock().await.recv().await
    }

    /// Drain all pending events
    pub fn drain_events(&self) -> Vec<ScanEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.try_recv_event() {
            events.push(event);
        }
        events
    }
}

impl Drop for ScanCoordinator {
    fn drop(&mut self) {
        let decoder = {
            let mut inner = self.shared.lock();
            self.shared.shutdown_locked(&mut inner)
        };
        if decoder.is_none() {
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(LifecycleGuard::finish(decoder));
            }
            Err(_) => warn!("Scanner dropped outside a runtime; decoder left to the platform"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testdb::{
        DecoderProbe, MockCameraConfig, MockCameraPlatform, MockVideoSink, PlatformError,
        RecordingSubmitter, ScriptedDecoderProvider, ScriptedOutcome, SinkProbe,
    };

    struct Harness {
        coordinator: ScanCoordinator,
        platform: Arc<MockCameraPlatform>,
        decoder: DecoderProbe,
        sink: SinkProbe,
        submitter: Arc<RecordingSubmitter>,
    }

    fn harness_with(camera: MockCameraConfig, submitter: RecordingSubmitter) -> Harness {
        let platform = Arc::new(MockCameraPlatform::new(camera));
        let provider = ScriptedDecoderProvider::new();
        let decoder = provider.probe();
        let sink = MockVideoSink::new("reader");
        let sink_probe = sink.probe();
        let submitter = Arc::new(submitter);

        let coordinator = ScanCoordinator::new(
            ScanPlatform {
                enumerator: platform.clone(),
                acquirer: platform.clone(),
                decoders: Arc::new(provider),
                sink: Box::new(sink),
            },
            submitter.clone(),
            CoordinatorSettings::default(),
        );

        Harness {
            coordinator,
            platform,
            decoder,
            sink: sink_probe,
            submitter,
        }
    }

    fn back_camera() -> MockCameraConfig {
        MockCameraConfig::with_devices(vec![CameraDevice::new("cam1", "Back Camera")])
    }

    /// Let every spawned task run until the runtime is idle
    async fn settle() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    async fn scanning_harness(submitter: RecordingSubmitter) -> Harness {
        let h = harness_with(back_camera(), submitter);
        h.coordinator
            .open("E1", "Spring Gala", DecoderConfig::default())
            .unwrap();
        settle().await;
        assert_eq!(h.coordinator.state(), ScanState::Scanning);
        h
    }

    fn successes(events: &[ScanEvent]) -> usize {
        events.iter().filter(|e| e.is_success()).count()
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_reaches_scanning() {
        let h = scanning_harness(RecordingSubmitter::new()).await;

        let snap = h.coordinator.snapshot().unwrap();
        assert_eq!(snap.selected_device_id.as_deref(), Some("cam1"));
        assert!(snap.has_stream);
        assert!(snap.has_decoder);
        assert!(!snap.processing);
        assert_eq!(h.platform.stats().live_streams(), 1);
        assert!(h.sink.is_attached());
        assert_eq!(h.decoder.last_source().as_deref(), Some("reader"));

        let states: Vec<ScanState> = h
            .coordinator
            .drain_events()
            .into_iter()
            .filter_map(|e| match e {
                ScanEvent::StateChanged { to, .. } => Some(to),
                _ => None,
            })
            .collect();
        assert_eq!(
            states,
            vec![ScanState::Enumerating, ScanState::Acquiring, ScanState::Scanning]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_event_id_is_validation_error() {
        let h = harness_with(back_camera(), RecordingSubmitter::new());
        let result = h.coordinator.open("  ", "", DecoderConfig::default());
        assert!(matches!(result, Err(ScanError::Validation(_))));
        settle().await;

        assert_eq!(h.coordinator.state(), ScanState::Idle);
        assert_eq!(h.platform.stats().enumerations(), 0);
        assert_eq!(h.platform.stats().acquisitions(), 0);
        let events = h.coordinator.drain_events();
        assert_eq!(events.iter().filter(|e| e.is_failure()).count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_successful_check_in_closes_once() {
        let h = scanning_harness(RecordingSubmitter::new()).await;
        h.coordinator.drain_events();

        assert!(h.decoder.emit_decode("QR-123"));
        settle().await;

        assert_eq!(h.coordinator.state(), ScanState::Closed);
        let calls = h.submitter.calls();
        assert_eq!(calls, vec![CheckInRequest::new("E1", "QR-123")]);

        let events = h.coordinator.drain_events();
        assert_eq!(successes(&events), 1);
        assert!(events.contains(&ScanEvent::CloseRequested));
        assert_eq!(h.platform.stats().live_streams(), 0);
        assert!(!h.sink.is_attached());
        assert_eq!(h.decoder.stops(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_check_in_resumes_after_cool_down() {
        let submitter = RecordingSubmitter::new();
        submitter.push_reject(4000, "expired");
        let h = scanning_harness(submitter).await;

        h.decoder.emit_decode("QR-123");
        settle().await;

        assert_eq!(h.coordinator.state(), ScanState::Processing);
        assert!(h.coordinator.is_processing());
        let snap = h.coordinator.snapshot().unwrap();
        assert_eq!(snap.last_error_kind, Some(ErrorKind::Api));
        assert_eq!(snap.last_error_message.as_deref(), Some("expired"));

        tokio::time::sleep(Duration::from_millis(1100)).await;

        assert_eq!(h.coordinator.state(), ScanState::Scanning);
        assert!(!h.coordinator.is_processing());
        assert!(h.coordinator.snapshot().unwrap().last_error_kind.is_none());
        assert_eq!(h.platform.stats().live_streams(), 1);
        assert_eq!(h.platform.stats().acquisitions(), 1);
        assert_eq!(h.decoder.resumes(), 1);
        assert_eq!(successes(&h.coordinator.drain_events()), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resume_accepts_exactly_one_more_scan() {
        let submitter = RecordingSubmitter::new();
        submitter.push_network_error("connection reset");
        let h = scanning_harness(submitter).await;

        h.decoder.emit_decode("QR-1");
        settle().await;
        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert_eq!(h.coordinator.state(), ScanState::Scanning);

        h.decoder.inject_decode("QR-2");
        h.decoder.inject_decode("QR-3");
        settle().await;

        assert_eq!(h.submitter.call_count(), 2);
        assert_eq!(h.submitter.calls()[1].payload, "QR-2");
        assert_eq!(h.coordinator.state(), ScanState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_decode_burst_submits_once() {
        let h = scanning_harness(RecordingSubmitter::new().with_latency(Duration::from_millis(300)))
            .await;

        for i in 0..5 {
            h.decoder.inject_decode(&format!("QR-{}", i));
        }
        settle().await;
        assert_eq!(h.coordinator.state(), ScanState::Processing);

        h.decoder.inject_decode("QR-late");
        tokio::time::sleep(Duration::from_millis(400)).await;

        assert_eq!(h.submitter.call_count(), 1);
        assert_eq!(h.submitter.max_in_flight(), 1);
        assert_eq!(h.submitter.calls()[0].payload, "QR-0");
        assert_eq!(h.decoder.pauses(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_decoder_noise_is_suppressed() {
        let h = scanning_harness(RecordingSubmitter::new()).await;
        h.coordinator.drain_events();

        h.decoder
            .emit_scan_error("QR code parse error, error = NotFoundException: No MultiFormat Readers");
        settle().await;

        assert_eq!(h.coordinator.state(), ScanState::Scanning);
        assert!(h.coordinator.drain_events().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_decoder_error_pauses_then_resumes() {
        let h = scanning_harness(RecordingSubmitter::new()).await;

        h.decoder.emit_scan_error("Video frame unavailable");
        settle().await;
        assert_eq!(h.coordinator.state(), ScanState::PausedError);
        assert_eq!(
            h.coordinator.snapshot().unwrap().last_error_kind,
            Some(ErrorKind::Decoder)
        );

        // Decodes are ignored while paused on an error
        h.decoder.inject_decode("QR-ignored");
        settle().await;
        assert_eq!(h.submitter.call_count(), 0);

        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert_eq!(h.coordinator.state(), ScanState::Scanning);
        assert_eq!(h.platform.stats().live_streams(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_cameras_is_fatal() {
        let h = harness_with(MockCameraConfig::with_devices(vec![]), RecordingSubmitter::new());
        h.coordinator.open("E1", "", DecoderConfig::default()).unwrap();
        settle().await;

        let snap = h.coordinator.snapshot().unwrap();
        assert_eq!(snap.state, ScanState::PausedError);
        assert!(snap.fatal);
        assert_eq!(snap.last_error_kind, Some(ErrorKind::DeviceNotFound));
        assert_eq!(h.platform.stats().acquisitions(), 0);

        let events = h.coordinator.drain_events();
        let failures: Vec<&ScanEvent> = events.iter().filter(|e| e.is_failure()).collect();
        assert_eq!(failures.len(), 1);
        assert!(matches!(
            failures[0],
            ScanEvent::Failed {
                error: ScanError::DeviceNotFound
            }
        ));

        // No automatic re-enumeration
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(h.platform.stats().enumerations(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_enumeration_failure_is_classified() {
        let camera = MockCameraConfig {
            enumeration_error: Some(ScanError::StreamRead("media devices unavailable".into())),
            ..back_camera()
        };
        let h = harness_with(camera, RecordingSubmitter::new());
        h.coordinator.open("E1", "", DecoderConfig::default()).unwrap();
        settle().await;

        assert_eq!(
            h.coordinator.snapshot().unwrap().last_error_kind,
            Some(ErrorKind::DeviceEnumeration)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_permission_denied_is_fatal_without_leak() {
        let camera = MockCameraConfig {
            acquisition_error: Some(PlatformError::not_allowed()),
            ..back_camera()
        };
        let h = harness_with(camera, RecordingSubmitter::new());
        h.coordinator.open("E1", "", DecoderConfig::default()).unwrap();
        settle().await;

        let snap = h.coordinator.snapshot().unwrap();
        assert_eq!(snap.state, ScanState::PausedError);
        assert_eq!(snap.last_error_kind, Some(ErrorKind::PermissionDenied));
        assert_eq!(h.platform.stats().live_streams(), 0);
        assert_eq!(h.decoder.created(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_decoder_start_failure_releases_stream() {
        let h = harness_with(back_camera(), RecordingSubmitter::new());
        h.decoder
            .fail_next_start(ScanError::DecoderStart("canvas unavailable".into()));
        h.coordinator.open("E1", "", DecoderConfig::default()).unwrap();
        settle().await;

        let snap = h.coordinator.snapshot().unwrap();
        assert_eq!(snap.state, ScanState::PausedError);
        assert_eq!(snap.last_error_kind, Some(ErrorKind::DecoderStart));
        assert_eq!(h.platform.stats().live_streams(), 0);
        assert!(!h.sink.is_attached());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sink_play_failure_releases_stream() {
        let h = harness_with(back_camera(), RecordingSubmitter::new());
        h.sink.fail_play(true);
        h.coordinator.open("E1", "", DecoderConfig::default()).unwrap();
        settle().await;

        let snap = h.coordinator.snapshot().unwrap();
        assert_eq!(snap.state, ScanState::PausedError);
        assert!(snap.fatal);
        assert_eq!(snap.last_error_kind, Some(ErrorKind::StreamRead));
        assert_eq!(h.platform.stats().live_streams(), 0);
        assert_eq!(h.sink.attaches(), 1);
        assert!(!h.sink.is_attached());
        assert_eq!(h.decoder.created(), 0);

        let events = h.coordinator.drain_events();
        assert_eq!(events.iter().filter(|e| e.is_failure()).count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overconstrained_camera_is_fatal() {
        let camera = MockCameraConfig {
            acquisition_error: Some(PlatformError::overconstrained("deviceId")),
            ..back_camera()
        };
        let h = harness_with(camera, RecordingSubmitter::new());
        h.coordinator.open("E1", "", DecoderConfig::default()).unwrap();
        settle().await;

        let snap = h.coordinator.snapshot().unwrap();
        assert_eq!(snap.state, ScanState::PausedError);
        assert_eq!(snap.last_error_kind, Some(ErrorKind::Overconstrained));
        assert_eq!(h.platform.stats().live_streams(), 0);
        assert!(!h.sink.is_attached());

        let events = h.coordinator.drain_events();
        let failures: Vec<&ScanEvent> = events.iter().filter(|e| e.is_failure()).collect();
        assert_eq!(failures.len(), 1);
        assert!(matches!(
            failures[0],
            ScanEvent::Failed {
                error: ScanError::Overconstrained(_)
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_decoder_engine_exit_is_fatal() {
        let h = scanning_harness(RecordingSubmitter::new()).await;
        h.coordinator.drain_events();

        h.decoder.disconnect();
        settle().await;

        let snap = h.coordinator.snapshot().unwrap();
        assert_eq!(snap.state, ScanState::PausedError);
        assert!(snap.fatal);
        assert_eq!(snap.last_error_kind, Some(ErrorKind::DecoderStart));
        assert_eq!(h.platform.stats().live_streams(), 0);
        assert!(!h.sink.is_attached());

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(h.coordinator.state(), ScanState::PausedError);
        let events = h.coordinator.drain_events();
        assert_eq!(events.iter().filter(|e| e.is_failure()).count(), 1);
        assert!(events.iter().any(|e| matches!(
            e,
            ScanEvent::Message {
                kind: Some(ErrorKind::DecoderStart),
                text: Some(_)
            }
        )));
    }

    #[tokio::test(start_paused = true)]
    async fn test_decoder_engine_exit_during_check_in() {
        let h = scanning_harness(
            RecordingSubmitter::scripted(vec![ScriptedOutcome::NetworkError(
                "connection reset".to_string(),
            )])
            .with_latency(Duration::from_millis(300)),
        )
        .await;

        h.decoder.emit_decode("QR-7");
        settle().await;
        assert_eq!(h.coordinator.state(), ScanState::Processing);

        h.decoder.disconnect();
        settle().await;
        assert_eq!(h.coordinator.state(), ScanState::PausedError);
        assert!(!h.coordinator.is_processing());

        // The late failure neither resumes scanning nor raises a second failure
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(h.coordinator.state(), ScanState::PausedError);
        assert_eq!(h.platform.stats().live_streams(), 0);
        let events = h.coordinator.drain_events();
        assert_eq!(events.iter().filter(|e| e.is_failure()).count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_during_acquisition_discards_late_stream() {
        let camera = MockCameraConfig {
            hold_acquisition: true,
            ..back_camera()
        };
        let h = harness_with(camera, RecordingSubmitter::new());
        h.coordinator.open("E1", "", DecoderConfig::default()).unwrap();
        settle().await;
        assert_eq!(h.coordinator.state(), ScanState::Acquiring);

        h.coordinator.close().await;
        assert_eq!(h.coordinator.state(), ScanState::Closed);
        h.coordinator.drain_events();

        h.platform.release_acquisition();
        settle().await;

        assert_eq!(h.platform.stats().acquisitions(), 1);
        assert_eq!(h.platform.stats().live_streams(), 0);
        assert_eq!(h.platform.stats().max_live_streams(), 1);
        assert_eq!(h.coordinator.state(), ScanState::Closed);
        assert!(!h.sink.is_attached());
        assert_eq!(h.decoder.created(), 0);
        assert!(h
            .coordinator
            .drain_events()
            .iter()
            .all(|e| !matches!(e, ScanEvent::StateChanged { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_while_check_in_in_flight() {
        let h = scanning_harness(RecordingSubmitter::new().with_latency(Duration::from_millis(500)))
            .await;

        h.decoder.emit_decode("QR-123");
        settle().await;
        h.coordinator.close().await;
        assert_eq!(h.platform.stats().live_streams(), 0);

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(h.submitter.call_count(), 1);
        assert_eq!(h.coordinator.state(), ScanState::Closed);
        assert_eq!(successes(&h.coordinator.drain_events()), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_cancels_pending_resume() {
        let submitter = RecordingSubmitter::new();
        submitter.push_reject(4000, "expired");
        let h = scanning_harness(submitter).await;

        h.decoder.emit_decode("QR-123");
        settle().await;
        h.coordinator.close().await;
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert_eq!(h.coordinator.state(), ScanState::Closed);
        assert_eq!(h.decoder.resumes(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_is_idempotent() {
        let h = scanning_harness(RecordingSubmitter::new()).await;

        h.coordinator.close().await;
        h.coordinator.close().await;

        assert_eq!(h.platform.stats().releases(), 1);
        assert_eq!(h.sink.detaches(), 1);
        assert_eq!(h.decoder.stops(), 1);
        let closes = h
            .coordinator
            .drain_events()
            .into_iter()
            .filter(|e| matches!(e, ScanEvent::StateChanged { to: ScanState::Closed, .. }))
            .count();
        assert_eq!(closes, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_while_live_is_rejected() {
        let h = scanning_harness(RecordingSubmitter::new()).await;
        assert!(h
            .coordinator
            .open("E2", "", DecoderConfig::default())
            .is_err());
        assert_eq!(h.platform.stats().acquisitions(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reopen_after_close_uses_fresh_session() {
        let h = scanning_harness(RecordingSubmitter::new()).await;
        h.coordinator.close().await;

        let generation = h
            .coordinator
            .open("E2", "", DecoderConfig::default())
            .unwrap();
        settle().await;

        let snap = h.coordinator.snapshot().unwrap();
        assert_eq!(snap.generation, generation);
        assert_eq!(snap.event_id, "E2");
        assert_eq!(snap.state, ScanState::Scanning);
        assert_eq!(h.platform.stats().live_streams(), 1);
        assert_eq!(h.platform.stats().max_live_streams(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reopen_waits_for_late_stream_release() {
        let camera = MockCameraConfig {
            hold_acquisition: true,
            ..back_camera()
        };
        let h = harness_with(camera, RecordingSubmitter::new());
        h.coordinator.open("E1", "", DecoderConfig::default()).unwrap();
        settle().await;
        h.coordinator.close().await;

        h.coordinator.open("E1", "", DecoderConfig::default()).unwrap();
        settle().await;
        assert_eq!(h.platform.stats().acquisitions(), 1);

        h.platform.release_acquisition();
        settle().await;
        h.platform.release_acquisition();
        settle().await;

        assert_eq!(h.coordinator.state(), ScanState::Scanning);
        assert_eq!(h.platform.stats().acquisitions(), 2);
        assert_eq!(h.platform.stats().live_streams(), 1);
        assert_eq!(h.platform.stats().max_live_streams(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_retry_after_fatal_error() {
        let camera = MockCameraConfig {
            acquisition_error: Some(PlatformError::not_readable("camera busy")),
            ..back_camera()
        };
        let h = harness_with(camera, RecordingSubmitter::new());
        h.coordinator.open("E1", "Gala", DecoderConfig::default()).unwrap();
        settle().await;
        assert_eq!(h.coordinator.state(), ScanState::PausedError);

        h.platform.set_acquisition_error(None);
        h.coordinator.retry().await.unwrap();
        settle().await;

        let snap = h.coordinator.snapshot().unwrap();
        assert_eq!(snap.state, ScanState::Scanning);
        assert_eq!(snap.event_name, "Gala");
        assert_eq!(h.platform.stats().live_streams(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_requires_fatal_error() {
        let h = scanning_harness(RecordingSubmitter::new()).await;
        assert!(h.coordinator.retry().await.is_err());
        assert_eq!(h.coordinator.state(), ScanState::Scanning);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_tears_down() {
        let h = scanning_harness(RecordingSubmitter::new()).await;
        let Harness {
            coordinator,
            platform,
            sink,
            decoder,
            ..
        } = h;

        drop(coordinator);
        settle().await;

        assert_eq!(platform.stats().live_streams(), 0);
        assert!(!sink.is_attached());
        assert_eq!(decoder.stops(), 1);
    }
}
