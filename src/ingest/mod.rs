//! Frame ingestion sources.
//!
//! Sources produce `Frame` instances and hand them to the dispatcher's sink.
//! A source owns the mirror decision for each frame it creates; the pipeline
//! never consults camera state after hand-off.
//!
//! Sources MUST NOT:
//! - Store frames to disk
//! - Log pixel content

pub mod synthetic;

pub use synthetic::{CameraStats, SyntheticCamera, SyntheticCameraConfig};
