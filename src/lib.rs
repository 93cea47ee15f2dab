//! Check-in Scanner Library
//!
//! Coordinates a camera-based QR check-in: enumerate cameras, prefer the
//! front one, acquire a live stream, run a frame decoder over it, submit the
//! first decoded payload to the events API, and release every hardware
//! handle on close, unmount, or success.
//!
//! # Architecture
//!
//! - [`core`] - Configuration and the error taxonomy
//! - [`device`] - Camera platform traits and camera selection
//! - [`decoder`] - Decoder engine interface and noise filtering
//! - [`checkin`] - Check-in submission over HTTP
//! - [`scanner`] - Session state machine, coordinator and host surface
//! - [`testdb`] - Mock platform, scripted decoder and lifecycle scenarios
//! - [`cli`] - Command-line interface (only used by the binary)
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use checkin_scanner::scanner::{CoordinatorSettings, ScanCoordinator, ScanEvent, ScanPlatform};
//! use checkin_scanner::testdb::{
//!     MockCameraConfig, MockCameraPlatform, MockVideoSink, RecordingSubmitter,
//!     ScriptedDecoderProvider,
//! };
//! use std::sync::Arc;
//!
//! # async fn run() -> checkin_scanner::core::error::Result<()> {
//! let platform = Arc::new(MockCameraPlatform::new(MockCameraConfig::phone()));
//! let coordinator = ScanCoordinator::new(
//!     ScanPlatform {
//!         enumerator: platform.clone(),
//!         acquirer: platform,
//!         decoders: Arc::new(ScriptedDecoderProvider::new()),
//!         sink: Box::new(MockVideoSink::new("reader")),
//!     },
//!     Arc::new(RecordingSubmitter::new()),
//!     CoordinatorSettings::default(),
//! );
//!
//! coordinator.open("E1", "Spring Gala", Default::default())?;
//! while let Some(event) = coordinator.next_event().await {
//!     if let ScanEvent::CloseRequested = event {
//!         break;
//!     }
//! }
//! coordinator.close().await;
//! # Ok(())
//! # }
//! ```

pub mod checkin;
pub mod cli;
pub mod core;
pub mod decoder;
pub mod device;
pub mod scanner;
pub mod testdb;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
