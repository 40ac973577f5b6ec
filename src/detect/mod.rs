mod backend;
pub mod backends;
mod engine;
mod lifecycle;
mod result;

pub use backend::{
    Acceleration, Classifier, DetectorConfig, DEFAULT_MAX_RESULTS, DEFAULT_SCORE_THRESHOLD,
};
#[cfg(any(test, feature = "scripted-backend"))]
pub use backends::{ScriptedClassifier, ScriptedLoader};
pub use backends::{StubClassifier, StubLoader};
pub use engine::DetectionEngine;
pub use lifecycle::{initialize_with_fallback, DetectorHandle, DetectorState, ModelLoader};
pub use result::{BoundingBox, Detection, EyeClass};
