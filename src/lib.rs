//! Iris pipeline
//!
//! Real-time eye and pupil detection over a live camera stream, producing a
//! transparent overlay with one rectangle per detection.
//!
//! # Architecture
//!
//! Each camera frame passes through one fixed sequence on a single background
//! worker:
//!
//! 1. **Copy** into a reusable pixel buffer (`frame::FrameBuffer`).
//! 2. **Mirror** horizontally when the frame came from the front lens.
//! 3. **Normalize** to upright orientation (`orientation::normalize`).
//! 4. **Detect** with the installed classifier (`detect::DetectionEngine`).
//! 5. **Render** the overlay (`overlay::OverlayRenderer`).
//! 6. **Publish** detections, overlay and rotation to the subscriber.
//!
//! Frames that arrive while the worker is busy are dropped, never queued.
//! Until the detector is initialized every frame is skipped without error.
//!
//! # Module Structure
//!
//! - `frame`: Frame ownership and the reusable buffer
//! - `orientation`: Rotation handling
//! - `detect`: Classifier seam, lifecycle, engine and backends
//! - `model_source`: Bundled and delivered model resolution
//! - `overlay`: Overlay canvas and rectangle drawing
//! - `dispatch`: Frame dispatcher and its worker
//! - `ingest`: Frame sources
//! - `config`: File and environment configuration
//! - `trace`: Sampled detector timing

pub mod config;
pub mod detect;
pub mod dispatch;
pub mod error;
pub mod frame;
pub mod ingest;
pub mod model_source;
pub mod orientation;
pub mod overlay;
pub mod trace;

pub use config::IrisConfig;
pub use detect::{
    Acceleration, BoundingBox, Classifier, Detection, DetectionEngine, DetectorConfig,
    DetectorHandle, DetectorState, EyeClass, ModelLoader,
};
pub use dispatch::{
    DispatchStats, DispatcherHandle, FrameDispatcher, FrameOutcome, FrameSink, FrameSummary,
    SubmitOutcome, Subscriber, Subscription,
};
pub use error::{ModelLoadError, PipelineError};
pub use frame::{Frame, FrameBuffer};
pub use model_source::{BundledAssets, ModelPreferences, ModelSource};
pub use orientation::{NormalizedView, Rotation};
pub use overlay::{Annotation, Overlay, OverlayRenderer, StrokeStyle};
