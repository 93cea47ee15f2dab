//! Scripted decoder engine
//!
//! [`ScriptedDecoder`] never looks at frames. Tests push decode results and
//! engine errors through a [`DecoderProbe`], which also exposes call counts.

use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::core::error::{Result, ScanError};
use crate::decoder::{
    DecoderConfig, DecoderEngine, DecoderEvent, DecoderEventSender, DecoderProvider, DecoderState,
};

#[derive(Debug, Default)]
struct Script {
    /// Id of the most recently created engine
    current: usize,
    created: usize,
    state: Option<DecoderState>,
    sender: Option<DecoderEventSender>,
    source: Option<String>,
    config: Option<DecoderConfig>,
    starts: usize,
    stops: usize,
    pauses: usize,
    resumes: usize,
    kept_last_frame: Option<bool>,
    fail_next_start: Option<ScanError>,
    fail_stop: bool,
}

type SharedScript = Arc<Mutex<Script>>;

fn lock(script: &SharedScript) -> MutexGuard<'_, Script> {
    script.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Hands out [`ScriptedDecoder`]s that share one script
#[derive(Clone, Default)]
pub struct ScriptedDecoderProvider {
    script: SharedScript,
}

impl ScriptedDecoderProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn probe(&self) -> DecoderProbe {
        DecoderProbe {
            script: Arc::clone(&self.script),
        }
    }
}

impl DecoderProvider for ScriptedDecoderProvider {
    fn create_decoder(&self) -> Box<dyn DecoderEngine> {
        let mut script = lock(&self.script);
        script.created += 1;
        script.current = script.created;
        script.state = Some(DecoderState::Idle);
        script.sender = None;
        Box::new(ScriptedDecoder {
            id: script.created,
            state: DecoderState::Idle,
            script: Arc::clone(&self.script),
        })
    }
}

/// Fake decoder engine driven by a [`DecoderProbe`]
pub struct ScriptedDecoder {
    id: usize,
    state: DecoderState,
    script: SharedScript,
}

impl ScriptedDecoder {
    fn set_state(&mut self, script: &mut Script, state: DecoderState) {
        self.state = state;
        if script.current == self.id {
            script.state = Some(state);
        }
    }
}

#[async_trait]
impl DecoderEngine for ScriptedDecoder {
    async fn start(
        &mut self,
        source_id: &str,
        config: &DecoderConfig,
        events: DecoderEventSender,
    ) -> Result<()> {
        let script = Arc::clone(&self.script);
        let mut script = lock(&script);
        if let Some(e) = script.fail_next_start.take() {
            return Err(e);
        }
        if self.state != DecoderState::Idle {
            return Err(ScanError::DecoderStart(
                "cannot start, scanner is already running".to_string(),
            ));
        }

        script.starts += 1;
        script.source = Some(source_id.to_string());
        script.config = Some(config.clone());
        if script.current == self.id {
            script.sender = Some(events);
        }
        self.set_state(&mut script, DecoderState::Scanning);
        Ok(())
    }

    fn pause(&mut self, keep_last_frame: bool) {
        if self.state != DecoderState::Scanning {
            return;
        }
        let script = Arc::clone(&self.script);
        let mut script = lock(&script);
        script.pauses += 1;
        script.kept_last_frame = Some(keep_last_frame);
        self.set_state(&mut script, DecoderState::Paused);
    }

    fn resume(&mut self) {
        if self.state != DecoderState::Paused {
            return;
        }
        let script = Arc::clone(&self.script);
        let mut script = lock(&script);
        script.resumes += 1;
        self.set_state(&mut script, DecoderState::Scanning);
    }

    async fn stop(&mut self) -> Result<()> {
        let script = Arc::clone(&self.script);
        let mut script = lock(&script);
        script.stops += 1;
        if script.fail_stop {
            return Err(ScanError::DecoderStart(
                "cannot stop, scanner is not running".to_string(),
            ));
        }
        if script.current == self.id {
            script.sender = None;
        }
        self.set_state(&mut script, DecoderState::Idle);
        Ok(())
    }

    fn state(&self) -> DecoderState {
        self.state
    }
}

/// Test handle on the engines created by a [`ScriptedDecoderProvider`]
#[derive(Clone)]
pub struct DecoderProbe {
    script: SharedScript,
}

impl DecoderProbe {
    fn send(&self, event: DecoderEvent, only_while_scanning: bool) -> bool {
        let script = lock(&self.script);
        if only_while_scanning && script.state != Some(DecoderState::Scanning) {
            return false;
        }
        match &script.sender {
            Some(sender) => sender.send(event).is_ok(),
            None => false,
        }
    }

    /// Report a decoded payload the way a running engine would
    ///
    /// Returns false when the engine is not scanning.
    pub fn emit_decode(&self, payload: &str) -> bool {
        self.send(DecoderEvent::Decoded(payload.to_string()), true)
    }

    /// Deliver a decode callback regardless of engine state
    ///
    /// Models callbacks already queued when the engine was paused.
    pub fn inject_decode(&self, payload: &str) -> bool {
        self.send(DecoderEvent::Decoded(payload.to_string()), false)
    }

    /// Report a per-frame engine error
    pub fn emit_scan_error(&self, message: &str) -> bool {
        self.send(DecoderEvent::ScanError(message.to_string()), true)
    }

    /// Drop the engine's event sender, as a crashed engine would
    pub fn disconnect(&self) {
        lock(&self.script).sender = None;
    }

    /// State of the most recently created engine
    pub fn state(&self) -> DecoderState {
        lock(&self.script).state.unwrap_or(DecoderState::Idle)
    }

    pub fn created(&self) -> usize {
        lock(&self.script).created
    }

    pub fn starts(&self) -> usize {
        lock(&self.script).starts
    }

    pub fn stops(&self) -> usize {
        lock(&self.script).stops
    }

    pub fn pauses(&self) -> usize {
        lock(&self.script).pauses
    }

    pub fn resumes(&self) -> usize {
        lock(&self.script).resumes
    }

    pub fn kept_last_frame(&self) -> Option<bool> {
        lock(&self.script).kept_last_frame
    }

    /// Sink id the last engine was started on
    pub fn last_source(&self) -> Option<String> {
        lock(&self.script).source.clone()
    }

    pub fn last_config(&self) -> Option<DecoderConfig> {
        lock(&self.script).config.clone()
    }

    /// Fail the next `start()` with this error
    pub fn fail_next_start(&self, error: ScanError) {
        lock(&self.script).fail_next_start = Some(error);
    }

    /// Make every `stop()` fail
    pub fn fail_stop(&self, fail: bool) {
        lock(&self.script).fail_stop = fail;
    }
}
