//! Mock camera platform for testing without real hardware
//!
//! [`MockCameraPlatform`] plays both the enumerator and the acquirer. It
//! counts every stream it hands out and every stream whose tracks were
//! stopped, so a test can assert that no session ever leaks a camera.
//! [`MockVideoSink`] records attach/detach calls the same way.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Semaphore;

use crate::core::error::{Result, ScanError};
use crate::device::{
    classify_acquisition_error, CameraDevice, CameraEnumerator, MediaStream, StreamAcquirer,
    StreamConstraints, VideoSink,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// =============================================================================
// Platform Configuration
// =============================================================================

/// Acquisition failure as the platform reports it: an error class name and message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformError {
    pub name: String,
    pub message: String,
}

impl PlatformError {
    pub fn new(name: &str, message: &str) -> Self {
        Self {
            name: name.to_string(),
            message: message.to_string(),
        }
    }

    /// User denied the permission prompt
    pub fn not_allowed() -> Self {
        Self::new("NotAllowedError", "Permission denied")
    }

    /// Camera held by another application
    pub fn not_readable(message: &str) -> Self {
        Self::new("NotReadableError", message)
    }

    /// No device satisfies the constraints
    pub fn overconstrained(constraint: &str) -> Self {
        Self::new("OverconstrainedError", constraint)
    }

    pub fn classify(&self) -> ScanError {
        classify_acquisition_error(&self.name, &self.message)
    }
}

/// Configuration for mock platform behavior
#[derive(Debug, Clone, Default)]
pub struct MockCameraConfig {
    /// Cameras reported by enumeration
    pub devices: Vec<CameraDevice>,
    /// Fail enumeration with this error
    pub enumeration_error: Option<ScanError>,
    /// Fail acquisition with this platform error
    pub acquisition_error: Option<PlatformError>,
    /// Keep every acquisition pending until [`MockCameraPlatform::release_acquisition`]
    pub hold_acquisition: bool,
    /// Simulated enumeration latency
    pub enumeration_delay: Duration,
    /// Simulated acquisition latency (permission prompt, camera warm-up)
    pub acquisition_delay: Duration,
}

impl MockCameraConfig {
    pub fn with_devices(devices: Vec<CameraDevice>) -> Self {
        Self {
            devices,
            ..Default::default()
        }
    }

    /// A phone-like device list: front camera first, rear camera second
    pub fn phone() -> Self {
        Self::with_devices(vec![
            CameraDevice::new("cam-front", "Front Camera"),
            CameraDevice::new("cam-back", "Back Camera"),
        ])
    }
}

/// Counters kept by the mock platform
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlatformStats {
    enumerations: usize,
    acquisitions: usize,
    live_streams: usize,
    max_live_streams: usize,
    releases: usize,
}

impl PlatformStats {
    /// Enumeration calls made
    pub fn enumerations(&self) -> usize {
        self.enumerations
    }

    /// Acquisition calls made, including pending and failed ones
    pub fn acquisitions(&self) -> usize {
        self.acquisitions
    }

    /// Streams handed out whose tracks are still running
    pub fn live_streams(&self) -> usize {
        self.live_streams
    }

    /// Highest number of simultaneously live streams
    pub fn max_live_streams(&self) -> usize {
        self.max_live_streams
    }

    /// Streams whose tracks were stopped
    pub fn releases(&self) -> usize {
        self.releases
    }
}

// =============================================================================
// Mock Stream
// =============================================================================

/// A fake stream that reports its release to the platform counters
#[derive(Debug)]
pub struct MockStream {
    id: String,
    device_id: String,
    live: bool,
    stats: Arc<Mutex<PlatformStats>>,
}

impl MediaStream for MockStream {
    fn id(&self) -> &str {
        &self.id
    }

    fn device_id(&self) -> &str {
        &self.device_id
    }

    fn is_live(&self) -> bool {
        self.live
    }

    fn stop_tracks(&mut self) {
        if !self.live {
            return;
        }
        self.live = false;
        let mut stats = lock(&self.stats);
        stats.live_streams -= 1;
        stats.releases += 1;
    }
}

// =============================================================================
// Mock Platform
// =============================================================================

/// Mock camera enumerator and stream acquirer
pub struct MockCameraPlatform {
    config: Mutex<MockCameraConfig>,
    stats: Arc<Mutex<PlatformStats>>,
    gate: Semaphore,
    next_stream: AtomicU64,
}

impl MockCameraPlatform {
    pub fn new(config: MockCameraConfig) -> Self {
        Self {
            config: Mutex::new(config),
            stats: Arc::new(Mutex::new(PlatformStats::default())),
            gate: Semaphore::new(0),
            next_stream: AtomicU64::new(1),
        }
    }

    pub fn with_devices(devices: Vec<CameraDevice>) -> Self {
        Self::new(MockCameraConfig::with_devices(devices))
    }

    /// Snapshot of the platform counters
    pub fn stats(&self) -> PlatformStats {
        lock(&self.stats).clone()
    }

    /// Let one held acquisition resolve
    pub fn release_acquisition(&self) {
        self.gate.add_permits(1);
    }

    /// Replace the acquisition error for later calls
    pub fn set_acquisition_error(&self, error: Option<PlatformError>) {
        lock(&self.config).acquisition_error = error;
    }

    /// Replace the enumerated devices for later calls
    pub fn set_devices(&self, devices: Vec<CameraDevice>) {
        lock(&self.config).devices = devices;
    }

    fn config(&self) -> MockCameraConfig {
        lock(&self.config).clone()
    }
}

#[async_trait]
impl CameraEnumerator for MockCameraPlatform {
    async fn list_cameras(&self) -> Result<Vec<CameraDevice>> {
        lock(&self.stats).enumerations += 1;
        let config = self.config();
        if !config.enumeration_delay.is_zero() {
            tokio::time::sleep(config.enumeration_delay).await;
        }

        match config.enumeration_error {
            Some(e) => Err(e),
            None => Ok(config.devices),
        }
    }
}

#[async_trait]
impl StreamAcquirer for MockCameraPlatform {
    async fn acquire_stream(
        &self,
        constraints: &StreamConstraints,
    ) -> Result<Box<dyn MediaStream>> {
        lock(&self.stats).acquisitions += 1;
        let config = self.config();
        if !config.acquisition_delay.is_zero() {
            tokio::time::sleep(config.acquisition_delay).await;
        }
        if config.hold_acquisition {
            self.gate
                .acquire()
                .await
                .map_err(|_| ScanError::StreamRead("acquisition aborted".to_string()))?
                .forget();
        }

        if let Some(e) = lock(&self.config).acquisition_error.clone() {
            return Err(e.classify());
        }
        if !config
            .devices
            .iter()
            .any(|d| d.id == constraints.exact_device_id)
        {
            return Err(PlatformError::overconstrained("deviceId").classify());
        }

        let n = self.next_stream.fetch_add(1, Ordering::SeqCst);
        {
            let mut stats = lock(&self.stats);
            stats.live_streams += 1;
            stats.max_live_streams = stats.max_live_streams.max(stats.live_streams);
        }

        Ok(Box::new(MockStream {
            id: format!("stream-{}", n),
            device_id: constraints.exact_device_id.clone(),
            live: true,
            stats: Arc::clone(&self.stats),
        }))
    }
}

// =============================================================================
// Mock Video Sink
// =============================================================================

#[derive(Debug, Default)]
struct SinkState {
    attached: Option<String>,
    playing: bool,
    attaches: usize,
    detaches: usize,
    fail_play: bool,
}

/// Fake video element
pub struct MockVideoSink {
    source_id: String,
    state: Arc<Mutex<SinkState>>,
}

impl MockVideoSink {
    pub fn new(source_id: &str) -> Self {
        Self {
            source_id: source_id.to_string(),
            state: Arc::new(Mutex::new(SinkState::default())),
        }
    }

    /// Observer that stays valid after the sink is handed to a coordinator
    pub fn probe(&self) -> SinkProbe {
        SinkProbe {
            state: Arc::clone(&self.state),
        }
    }
}

impl VideoSink for MockVideoSink {
    fn source_id(&self) -> &str {
        &self.source_id
    }

    fn attach(&mut self, stream: &dyn MediaStream) -> Result<()> {
        if !stream.is_live() {
            return Err(ScanError::StreamRead(format!(
                "stream {} has no live tracks",
                stream.id()
            )));
        }
        let mut state = lock(&self.state);
        state.attached = Some(stream.id().to_string());
        state.playing = false;
        state.attaches += 1;
        Ok(())
    }

    fn play(&mut self) -> Result<()> {
        let mut state = lock(&self.state);
        if state.fail_play {
            return Err(ScanError::StreamRead(
                "play() request was interrupted".to_string(),
            ));
        }
        if state.attached.is_none() {
            return Err(ScanError::StreamRead("no source attached".to_string()));
        }
        state.playing = true;
        Ok(())
    }

    fn detach(&mut self) {
        let mut state = lock(&self.state);
        if state.attached.take().is_some() {
            state.playing = false;
            state.detaches += 1;
        }
    }

    fn is_attached(&self) -> bool {
        lock(&self.state).attached.is_some()
    }
}

/// Read side of a [`MockVideoSink`]
#[derive(Clone)]
pub struct SinkProbe {
    state: Arc<Mutex<SinkState>>,
}

impl SinkProbe {
    pub fn is_attached(&self) -> bool {
        lock(&self.state).attached.is_some()
    }

    pub fn attached_stream(&self) -> Option<String> {
        lock(&self.state).attached.clone()
    }

    pub fn is_playing(&self) -> bool {
        lock(&self.state).playing
    }

    pub fn attaches(&self) -> usize {
        lock(&self.state).attaches
    }

    pub fn detaches(&self) -> usize {
        lock(&self.state).detaches
    }

    /// Make the next `play()` calls fail
    pub fn fail_play(&self, fail: bool) {
        lock(&self.state).fail_play = fail;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stream_accounting() {
        let platform = MockCameraPlatform::new(MockCameraConfig::phone());
        let mut a = platform
            .acquire_stream(&StreamConstraints::exact("cam-back"))
            .await
            .unwrap();
        let mut b = platform
            .acquire_stream(&StreamConstraints::exact("cam-front"))
            .await
            .unwrap();
        assert_eq!(platform.stats().live_streams(), 2);

        a.stop_tracks();
        a.stop_tracks();
        b.stop_tracks();

        let stats = platform.stats();
        assert_eq!(stats.live_streams(), 0);
        assert_eq!(stats.max_live_streams(), 2);
        assert_eq!(stats.releases(), 2);
        assert_eq!(stats.acquisitions(), 2);
    }

    #[tokio::test]
    async fn test_unknown_device_is_overconstrained() {
        let platform = MockCameraPlatform::new(MockCameraConfig::phone());
        let result = platform
            .acquire_stream(&StreamConstraints::exact("cam-missing"))
            .await;
        assert!(matches!(result, Err(ScanError::Overconstrained(_))));
        assert_eq!(platform.stats().live_streams(), 0);
    }

    #[tokio::test]
    async fn test_acquisition_errors_are_classified_by_name() {
        let platform = MockCameraPlatform::new(MockCameraConfig {
            acquisition_error: Some(PlatformError::not_allowed()),
            ..MockCameraConfig::phone()
        });
        let exact = StreamConstraints::exact("cam-back");
        assert!(matches!(
            platform.acquire_stream(&exact).await,
            Err(ScanError::PermissionDenied)
        ));

        platform.set_acquisition_error(Some(PlatformError::not_readable("Device in use")));
        assert!(matches!(
            platform.acquire_stream(&exact).await,
            Err(ScanError::StreamRead(m)) if m == "Device in use"
        ));

        platform.set_acquisition_error(Some(PlatformError::new("NotFoundError", "")));
        assert!(matches!(
            platform.acquire_stream(&exact).await,
            Err(ScanError::DeviceNotFound)
        ));
        assert_eq!(platform.stats().live_streams(), 0);
    }

    #[tokio::test]
    async fn test_enumeration_error() {
        let platform = MockCameraPlatform::new(MockCameraConfig {
            enumeration_error: Some(ScanError::PermissionDenied),
            ..MockCameraConfig::phone()
        });
        assert_eq!(
            platform.list_cameras().await,
            Err(ScanError::PermissionDenied)
        );
        assert_eq!(platform.stats().enumerations(), 1);
    }

    #[tokio::test]
    async fn test_sink_attach_detach() {
        let platform = MockCameraPlatform::new(MockCameraConfig::phone());
        let stream = platform
            .acquire_stream(&StreamConstraints::exact("cam-back"))
            .await
            .unwrap();

        let mut sink = MockVideoSink::new("reader");
        let probe = sink.probe();
        sink.attach(stream.as_ref()).unwrap();
        sink.play().unwrap();
        assert!(probe.is_playing());
        assert_eq!(probe.attached_stream().as_deref(), Some(stream.id()));

        sink.detach();
        sink.detach();
        assert!(!probe.is_attached());
        assert_eq!(probe.detaches(), 1);
    }

    #[test]
    fn test_play_without_source_fails() {
        let mut sink = MockVideoSink::new("reader");
        assert!(sink.play().is_err());
    }
}
