//! Host surface
//!
//! Hosts describe the scanner declaratively with [`ScannerProps`] and hand
//! every new set of props to [`ScannerHost::apply`], which diffs them
//! against the previous set and opens or closes sessions to match.

use log::{debug, info};

use crate::core::error::Result;
use crate::decoder::{DecoderConfig, DetectionRegion};
use crate::scanner::coordinator::ScanCoordinator;
use crate::scanner::session::ScanState;

/// Declarative scanner inputs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannerProps {
    pub is_open: bool,
    pub event_id: String,
    /// Display only
    pub event_name: String,
    pub fps: u32,
    pub detection_region: DetectionRegion,
}

impl Default for ScannerProps {
    fn default() -> Self {
        let config = DecoderConfig::default();
        Self {
            is_open: false,
            event_id: String::new(),
            event_name: String::new(),
            fps: config.fps,
            detection_region: config.detection_region,
        }
    }
}

impl ScannerProps {
    /// Props for an open scanner on an event
    pub fn open(event_id: &str, event_name: &str) -> Self {
        Self {
            is_open: true,
            event_id: event_id.to_string(),
            event_name: event_name.to_string(),
            ..Self::default()
        }
    }

    /// Same props with the scanner closed
    pub fn closed(&self) -> Self {
        Self {
            is_open: false,
            ..self.clone()
        }
    }

    pub fn decoder_config(&self) -> DecoderConfig {
        DecoderConfig {
            fps: self.fps,
            detection_region: self.detection_region,
        }
    }
}

/// What [`ScannerHost::apply`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    Unchanged,
    Opened(u64),
    Closed,
    Reopened(u64),
}

/// Reconciles host props with the coordinator
pub struct ScannerHost {
    coordinator: ScanCoordinator,
    last: ScannerProps,
}

impl ScannerHost {
    pub fn new(coordinator: ScanCoordinator) -> Self {
        Self {
            coordinator,
            last: ScannerProps::default(),
        }
    }

    pub fn coordinator(&self) -> &ScanCoordinator {
        &self.coordinator
    }

    pub fn props(&self) -> &ScannerProps {
        &self.last
    }

    /// Apply a new set of props
    ///
    /// Props are recorded even when opening fails, so re-applying the same
    /// props does not retry on its own.
    pub async fn apply(&mut self, props: ScannerProps) -> Result<Reconciliation> {
        let previous = std::mem::replace(&mut self.last, props.clone());
        let was_open = previous.is_open && self.coordinator.state() != ScanState::Closed;

        if !props.is_open {
            if previous.is_open {
                debug!("Scanner props closed for event {}", previous.event_id);
                self.coordinator.close().await;
                return Ok(Reconciliation::Closed);
            }
            return Ok(Reconciliation::Unchanged);
        }

        if previous.is_open && previous.event_id == props.event_id {
            return Ok(Reconciliation::Unchanged);
        }

        if was_open {
            info!(
                "Scanner switching from event {} to {}",
                previous.event_id, props.event_id
            );
            self.coordinator.close().await;
            let generation = self.coordinator.open(
                &props.event_id,
                &props.event_name,
                props.decoder_config(),
            )?;
            return Ok(Reconciliation::Reopened(generation));
        }

        let generation =
            self.coordinator
                .open(&props.event_id, &props.event_name, props.decoder_config())?;
        Ok(Reconciliation::Opened(generation))
    }

    /// Close the scanner and forget the props
    pub async fn unmount(mut self) {
        self.coordinator.close().await;
        self.last = ScannerProps::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::CameraDevice;
    use crate::scanner::coordinator::{CoordinatorSettings, ScanPlatform};
    use crate::testdb::{
        MockCameraConfig, MockCameraPlatform, MockVideoSink, RecordingSubmitter,
        ScriptedDecoderProvider,
    };
    use std::sync::Arc;
    use std::time::Duration;

    fn host() -> (ScannerHost, Arc<MockCameraPlatform>) {
        let platform = Arc::new(MockCameraPlatform::new(MockCameraConfig::with_devices(vec![
            CameraDevice::new("cam1", "Back Camera"),
        ])));
        let coordinator = ScanCoordinator::new(
            ScanPlatform {
                enumerator: platform.clone(),
                acquirer: platform.clone(),
                decoders: Arc::new(ScriptedDecoderProvider::new()),
                sink: Box::new(MockVideoSink::new("reader")),
            },
            Arc::new(RecordingSubmitter::new()),
            CoordinatorSettings::default(),
        );
        (ScannerHost::new(coordinator), platform)
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_and_close() {
        let (mut host, platform) = host();

        let opened = host.apply(ScannerProps::open("E1", "Gala")).await.unwrap();
        assert!(matches!(opened, Reconciliation::Opened(_)));
        settle().await;
        assert_eq!(host.coordinator().state(), ScanState::Scanning);

        let closed = host.apply(host.props().closed()).await.unwrap();
        assert_eq!(closed, Reconciliation::Closed);
        assert_eq!(host.coordinator().state(), ScanState::Closed);
        assert_eq!(platform.stats().live_streams(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_props_are_unchanged() {
        let (mut host, platform) = host();
        host.apply(ScannerProps::open("E1", "Gala")).await.unwrap();
        settle().await;

        let again = host.apply(ScannerProps::open("E1", "Gala")).await.unwrap();
        assert_eq!(again, Reconciliation::Unchanged);
        assert_eq!(platform.stats().acquisitions(), 1);

        let closed = ScannerProps::default();
        host.apply(closed.clone()).await.unwrap();
        assert_eq!(host.apply(closed).await.unwrap(), Reconciliation::Unchanged);
    }

    #[tokio::test(start_paused = true)]
    async fn test_event_change_reopens() {
        let (mut host, platform) = host();
        host.apply(ScannerProps::open("E1", "Gala")).await.unwrap();
        settle().await;

        let switched = host.apply(ScannerProps::open("E2", "Picnic")).await.unwrap();
        assert!(matches!(switched, Reconciliation::Reopened(_)));
        settle().await;

        let snap = host.coordinator().snapshot().unwrap();
        assert_eq!(snap.event_id, "E2");
        assert_eq!(snap.state, ScanState::Scanning);
        assert_eq!(platform.stats().live_streams(), 1);
        assert_eq!(platform.stats().max_live_streams(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_without_event_fails() {
        let (mut host, platform) = host();
        assert!(host.apply(ScannerProps::open("", "")).await.is_err());
        assert_eq!(platform.stats().enumerations(), 0);
    }

    #[test]
    fn test_decoder_config_from_props() {
        let props = ScannerProps {
            fps: 5,
            detection_region: DetectionRegion::new(300, 200),
            ..ScannerProps::open("E1", "")
        };
        let config = props.decoder_config();
        assert_eq!(config.fps, 5);
        assert_eq!(config.detection_region, DetectionRegion::new(300, 200));
    }
}
