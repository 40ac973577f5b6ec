//! Detector lifecycle: `Uninitialized -> Initializing -> Ready`.
//!
//! `DetectorHandle` is shared between the thread that initializes the model
//! (a lifecycle event on the UI side) and the frame worker that runs
//! inference. Inference is only ever issued through `with_ready`, which fails
//! with `NotInitialized` until a model has been installed.
//!
//! There is no way back to `Uninitialized`. Reinitializing loads a new model
//! and swaps it in; the previous model keeps serving frames until the swap.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::detect::backend::{Acceleration, Classifier, DetectorConfig};
use crate::error::{ModelLoadError, PipelineError};
use crate::model_source::ModelSource;

/// Builds a classifier from a model source on a given acceleration tier.
pub trait ModelLoader: Send + Sync {
    fn load(
        &self,
        source: &ModelSource,
        config: &DetectorConfig,
        acceleration: Acceleration,
    ) -> Result<Box<dyn Classifier>, ModelLoadError>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DetectorState {
    Uninitialized,
    Initializing,
    Ready {
        acceleration: Acceleration,
        source: ModelSource,
    },
}

impl DetectorState {
    pub fn is_ready(&self) -> bool {
        matches!(self, DetectorState::Ready { .. })
    }
}

struct Slot {
    state: DetectorState,
    classifier: Option<Box<dyn Classifier>>,
    config: DetectorConfig,
}

/// Shared, cloneable handle to the detector.
#[derive(Clone)]
pub struct DetectorHandle {
    slot: Arc<Mutex<Slot>>,
}

impl Default for DetectorHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectorHandle {
    pub fn new() -> Self {
        Self {
            slot: Arc::new(Mutex::new(Slot {
                state: DetectorState::Uninitialized,
                classifier: None,
                config: DetectorConfig::default(),
            })),
        }
    }

    // A panic inside a classifier leaves the slot itself consistent.
    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> DetectorState {
        self.lock().state.clone()
    }

    pub fn is_ready(&self) -> bool {
        self.lock().state.is_ready()
    }

    /// Configuration snapshot of the installed model.
    pub fn config(&self) -> DetectorConfig {
        self.lock().config
    }

    /// Fail with `NotInitialized` unless a model is installed.
    pub fn guard_ready(&self) -> Result<(), PipelineError> {
        if self.is_ready() {
            Ok(())
        } else {
            Err(PipelineError::NotInitialized)
        }
    }

    /// Load a model, walking the acceleration ladder from `config.acceleration`.
    ///
    /// Returns the tier that succeeded. Callers must serialize calls.
    pub fn initialize(
        &self,
        loader: &dyn ModelLoader,
        source: &ModelSource,
        config: DetectorConfig,
    ) -> Result<Acceleration, ModelLoadError> {
        {
            let mut slot = self.lock();
            if slot.state == DetectorState::Uninitialized {
                slot.state = DetectorState::Initializing;
            }
        }

        match initialize_with_fallback(loader, source, &config) {
            Ok((acceleration, classifier)) => {
                let mut slot = self.lock();
                slot.classifier = Some(classifier);
                slot.config = config;
                slot.state = DetectorState::Ready {
                    acceleration,
                    source: source.clone(),
                };
                log::info!(
                    "detector ready: {} on {} (threshold={:.2}, max_results={})",
                    source.describe(),
                    acceleration,
                    config.score_threshold,
                    config.max_results
                );
                Ok(acceleration)
            }
            Err(e) => {
                let mut slot = self.lock();
                if slot.state == DetectorState::Initializing {
                    slot.state = DetectorState::Uninitialized;
                }
                log::error!("detector initialization failed for {}: {}", source.describe(), e);
                Err(e)
            }
        }
    }

    /// Initialize from a model bundled with the application.
    pub fn initialize_bundled(
        &self,
        loader: &dyn ModelLoader,
        name: &str,
        config: DetectorConfig,
    ) -> Result<Acceleration, ModelLoadError> {
        self.initialize(loader, &ModelSource::Bundled(name.to_string()), config)
    }

    /// Initialize from an externally supplied model file.
    pub fn initialize_file(
        &self,
        loader: &dyn ModelLoader,
        path: &std::path::Path,
        config: DetectorConfig,
    ) -> Result<Acceleration, ModelLoadError> {
        self.initialize(loader, &ModelSource::File(path.to_path_buf()), config)
    }

    /// Run `f` against the installed classifier, or fail with `NotInitialized`.
    pub fn with_ready<R>(
        &self,
        f: impl FnOnce(&mut dyn Classifier, &DetectorConfig) -> R,
    ) -> Result<R, PipelineError> {
        let mut slot = self.lock();
        let config = slot.config;
        match (slot.state.is_ready(), slot.classifier.as_mut()) {
            (true, Some(classifier)) => Ok(f(classifier.as_mut(), &config)),
            _ => Err(PipelineError::NotInitialized),
        }
    }
}

/// Try each acceleration tier in order until one loads.
///
/// Only `AccelerationUnavailable` moves on to the next tier; a missing or
/// broken model ends the walk immediately.
pub fn initialize_with_fallback(
    loader: &dyn ModelLoader,
    source: &ModelSource,
    config: &DetectorConfig,
) -> Result<(Acceleration, Box<dyn Classifier>), ModelLoadError> {
    let mut last_err = None;
    for &tier in config.acceleration.ladder() {
        match loader.load(source, config, tier) {
            Ok(mut classifier) => {
                if let Err(e) = classifier.warm_up() {
                    log::warn!("detector warm-up on {} failed: {:#}", tier, e);
                }
                return Ok((tier, classifier));
            }
            Err(e) if e.is_model_fault() => return Err(e),
            Err(e) => {
                log::warn!("detector init on {} failed, trying next tier: {}", tier, e);
                last_err = Some(e);
            }
        }
    }
    Err(last_err.unwrap_or_else(|| {
        ModelLoadError::AccelerationUnavailable(
            config.acceleration,
            "no acceleration tier to try".to_string(),
        )
    }))
}
