//! Deterministic detector doubles for tests. Compiled only under `cfg(test)`
//! or the `scripted-backend` feature.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use image::RgbaImage;

use crate::detect::backend::{Acceleration, Classifier, DetectorConfig};
use crate::detect::lifecycle::ModelLoader;
use crate::detect::result::Detection;
use crate::error::ModelLoadError;
use crate::model_source::{BundledAssets, ModelSource};

/// Classifier that returns a fixed detection list on every call.
///
/// Clones share the call counter and the optional gate, so a test can keep one
/// copy and hand another to the pipeline.
#[derive(Clone)]
pub struct ScriptedClassifier {
    detections: Vec<Detection>,
    calls: Arc<AtomicUsize>,
    gate: Option<Arc<Mutex<Receiver<()>>>>,
}

impl ScriptedClassifier {
    pub fn new(detections: Vec<Detection>) -> Self {
        Self {
            detections,
            calls: Arc::new(AtomicUsize::new(0)),
            gate: None,
        }
    }

    /// Block every `detect` call until a `()` is received on `release`.
    pub fn with_gate(mut self, release: Receiver<()>) -> Self {
        self.gate = Some(Arc::new(Mutex::new(release)));
        self
    }

    /// Number of `detect` calls entered so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Classifier for ScriptedClassifier {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn detect(&mut self, _image: &RgbaImage, _config: &DetectorConfig) -> Result<Vec<Detection>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            let release = gate.lock().map_err(|_| anyhow!("scripted gate poisoned"))?;
            release
                .recv()
                .map_err(|_| anyhow!("scripted gate closed"))?;
        }
        Ok(self.detections.clone())
    }
}

/// Loader that validates the model file and installs a `ScriptedClassifier`.
pub struct ScriptedLoader {
    assets: BundledAssets,
    template: ScriptedClassifier,
    tiers: Vec<Acceleration>,
    attempts: Mutex<Vec<Acceleration>>,
    load_gate: Option<Mutex<Receiver<()>>>,
}

impl ScriptedLoader {
    pub fn new<P: Into<PathBuf>>(assets_dir: P, template: ScriptedClassifier) -> Self {
        Self {
            assets: BundledAssets::new(assets_dir),
            template,
            tiers: vec![Acceleration::Cpu],
            attempts: Mutex::new(Vec::new()),
            load_gate: None,
        }
    }

    /// Acceleration tiers this loader can satisfy.
    pub fn with_tiers(mut self, tiers: &[Acceleration]) -> Self {
        self.tiers = tiers.to_vec();
        self
    }

    /// Block every `load` call, after it is recorded, until a `()` is
    /// received on `release`.
    pub fn with_load_gate(mut self, release: Receiver<()>) -> Self {
        self.load_gate = Some(Mutex::new(release));
        self
    }

    /// Tiers attempted so far, in order.
    pub fn attempts(&self) -> Vec<Acceleration> {
        self.attempts
            .lock()
            .map(|a| a.clone())
            .unwrap_or_default()
    }
}

impl ModelLoader for ScriptedLoader {
    fn load(
        &self,
        source: &ModelSource,
        _config: &DetectorConfig,
        acceleration: Acceleration,
    ) -> Result<Box<dyn Classifier>, ModelLoadError> {
        if let Ok(mut attempts) = self.attempts.lock() {
            attempts.push(acceleration);
        }
        if let Some(gate) = &self.load_gate {
            let release = gate
                .lock()
                .map_err(|_| ModelLoadError::Invalid("scripted load gate poisoned".to_string()))?;
            release
                .recv()
                .map_err(|_| ModelLoadError::Invalid("scripted load gate closed".to_string()))?;
        }
        source.read(&self.assets)?;
        if !self.tiers.contains(&acceleration) {
            return Err(ModelLoadError::AccelerationUnavailable(
                acceleration,
                "not supported by scripted loader".to_string(),
            ));
        }
        Ok(Box::new(self.template.clone()))
    }
}
