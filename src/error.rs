use std::path::PathBuf;

use thiserror::Error;

use crate::detect::Acceleration;

/// Per-frame and lifecycle failures surfaced by the pipeline.
///
/// `InvalidFrame`, `UnsupportedRotation` and `NotInitialized` are contained by
/// the dispatcher and never reach a subscriber. `ModelLoad` is returned to the
/// caller of `DetectorHandle::initialize`.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid frame: {0}")]
    InvalidFrame(String),
    #[error("unsupported rotation: {0} degrees (expected 0, 90, 180 or 270)")]
    UnsupportedRotation(i32),
    #[error("detector not initialized: call initialize() before running detection")]
    NotInitialized,
    #[error(transparent)]
    ModelLoad(#[from] ModelLoadError),
    #[error("inference failed: {0:#}")]
    Inference(anyhow::Error),
}

/// Model loading failures.
#[derive(Debug, Error)]
pub enum ModelLoadError {
    #[error("model not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("model unreadable: {}: {source}", .path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid model: {0}")]
    Invalid(String),
    #[error("{0} acceleration unavailable: {1}")]
    AccelerationUnavailable(Acceleration, String),
}

impl ModelLoadError {
    /// True when the model itself is the problem, so retrying on another
    /// acceleration tier cannot help.
    pub fn is_model_fault(&self) -> bool {
        matches!(
            self,
            ModelLoadError::NotFound(_)
                | ModelLoadError::Unreadable { .. }
                | ModelLoadError::Invalid(_)
        )
    }
}
