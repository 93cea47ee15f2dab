//! Camera device module
//!
//! # Submodules
//!
//! - `traits` - Abstraction traits for the camera platform
//! - `selector` - Camera selection and acquisition error classification
//!
//! # Architecture
//!
//! The coordinator never touches a platform handle directly. It talks to:
//!
//! - `CameraEnumerator` - Lists cameras
//! - `StreamAcquirer` - Opens a live stream bound to an exact device id
//! - `MediaStream` - Owned stream handle, released by stopping its tracks
//! - `VideoSink` - Render target the decoder samples from
//!
//! Real platform adapters and the mocks in `testdb` implement these traits,
//! allowing the scan lifecycle to run against either.

pub mod selector;
pub mod traits;

pub use selector::{classify_acquisition_error, select_camera};
pub use traits::{
    CameraDevice, CameraEnumerator, MediaStream, StreamAcquirer, StreamConstraints, VideoSink,
};
