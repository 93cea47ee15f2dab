//! Scan/check-in lifecycle
//!
//! # Submodules
//!
//! - `session` - session state machine, cancellation token and owned handles
//! - `events` - events reported to the host
//! - `guard` - idempotent release of everything a session holds
//! - `coordinator` - drives enumeration, acquisition, decoding and check-in
//! - `host` - declarative props reconciled against the coordinator
//!
//! # Architecture
//!
//! ```text
//! ScannerHost --apply(props)--> ScanCoordinator --+--> CameraEnumerator
//!                                      |          +--> StreamAcquirer --> VideoSink
//!                                      |          +--> DecoderEngine --(events)--+
//!                                      |          +--> CheckInSubmitter          |
//!                                      +<------------------ pump ----------------+
//! ```

pub mod coordinator;
pub mod events;
pub mod guard;
pub mod host;
pub mod session;

pub use coordinator::{CoordinatorSettings, ScanCoordinator, ScanPlatform};
pub use events::{NotificationLevel, ScanEvent};
pub use guard::LifecycleGuard;
pub use host::{Reconciliation, ScannerHost, ScannerProps};
pub use session::{ScanResult, ScanSession, ScanState, SessionSnapshot, SessionToken};
