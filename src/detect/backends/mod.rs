#[cfg(any(test, feature = "scripted-backend"))]
pub mod scripted;
pub mod stub;

#[cfg(feature = "backend-tract")]
pub mod tract;

#[cfg(any(test, feature = "scripted-backend"))]
pub use scripted::{ScriptedClassifier, ScriptedLoader};
pub use stub::{StubClassifier, StubLoader};

#[cfg(feature = "backend-tract")]
pub use tract::{TractClassifier, TractLoader};
