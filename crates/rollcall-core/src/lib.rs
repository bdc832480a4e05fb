//! rollcall-core: recognition engine for face-based attendance.
//!
//! Matches detected faces against a gallery of known identities, keeps an
//! attendance ledger, deduplicates unknown faces and rejects photo/screen
//! presentations with two cheap liveness heuristics. Detection and embedding
//! are supplied by an [`EmbeddingProvider`].

pub mod annotate;
pub mod capture;
pub mod clock;
pub mod config;
pub mod engine;
pub mod gallery;
pub mod ledger;
pub mod liveness;
pub mod matcher;
pub mod provider;
pub mod replay;
pub mod throttle;
pub mod types;
pub mod unknown;

pub use capture::{CaptureError, CaptureSink, DiskCaptureSink};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, EngineConfig};
pub use engine::{Candidate, Engine, EngineError, FaceOutcome, FaceReport, FrameReport, Identity};
pub use gallery::{Gallery, GalleryEntry, GalleryError, IdentityMap, IdentityStore};
pub use ledger::{AttendanceLedger, AttendanceRecord, MarkOutcome};
pub use liveness::LivenessReport;
pub use matcher::{EuclideanMatcher, MatchOutcome, Matcher};
pub use provider::{EmbeddingProvider, FrameSource, Grab, ProviderError};
pub use replay::{RecordedProvider, Replay, ReplayError, ReplaySource};
pub use types::{BoundingBox, Descriptor, Detection, Frame};
pub use unknown::{UnknownFaceRecord, UnknownFaces};
