//! Where the detector's model comes from.
//!
//! A model is either bundled with the application (looked up by name in the
//! assets directory) or supplied as a file by the model-delivery collaborator
//! (a downloaded cloud variant). Resolution always falls back to the bundled
//! model when delivery is disabled, forced off, or fails.

use std::path::{Component, Path, PathBuf};

use anyhow::{anyhow, Result};
use sha2::{Digest, Sha256};

use crate::error::ModelLoadError;

/// The two initialization entry points.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ModelSource {
    /// Model shipped with the application, by asset name.
    Bundled(String),
    /// Externally supplied model file.
    File(PathBuf),
}

impl ModelSource {
    /// Locate the model on disk.
    pub fn locate(&self, assets: &BundledAssets) -> Result<PathBuf, ModelLoadError> {
        match self {
            ModelSource::Bundled(name) => assets.resolve(name),
            ModelSource::File(path) => {
                if path.is_file() {
                    Ok(path.clone())
                } else {
                    Err(ModelLoadError::NotFound(path.clone()))
                }
            }
        }
    }

    /// Read the model bytes.
    pub fn read(&self, assets: &BundledAssets) -> Result<(PathBuf, Vec<u8>), ModelLoadError> {
        let path = self.locate(assets)?;
        let bytes = std::fs::read(&path).map_err(|source| ModelLoadError::Unreadable {
            path: path.clone(),
            source,
        })?;
        if bytes.is_empty() {
            return Err(ModelLoadError::Invalid(format!(
                "model file {} is empty",
                path.display()
            )));
        }
        Ok((path, bytes))
    }

    pub fn describe(&self) -> String {
        match self {
            ModelSource::Bundled(name) => format!("bundled:{}", name),
            ModelSource::File(path) => format!("file:{}", path.display()),
        }
    }
}

/// Directory holding models bundled with the application.
#[derive(Clone, Debug)]
pub struct BundledAssets {
    dir: PathBuf,
}

impl BundledAssets {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Resolve an asset name to a file inside the assets directory.
    ///
    /// Names must be a single plain file name.
    pub fn resolve(&self, name: &str) -> Result<PathBuf, ModelLoadError> {
        let candidate = Path::new(name);
        let mut components = candidate.components();
        let plain = matches!(
            (components.next(), components.next()),
            (Some(Component::Normal(_)), None)
        );
        if name.trim().is_empty() || !plain {
            return Err(ModelLoadError::Invalid(format!(
                "bundled model name '{}' must be a plain file name",
                name
            )));
        }
        let path = self.dir.join(candidate);
        if path.is_file() {
            Ok(path)
        } else {
            Err(ModelLoadError::NotFound(path))
        }
    }
}

/// Read-only settings consumed at detector initialization.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ModelPreferences {
    pub force_local_model: bool,
    /// Selected cloud model variant, if any.
    pub cloud_model: Option<String>,
}

/// Supplies a local file for a named cloud model variant.
pub trait ModelDelivery: Send + Sync {
    fn fetch(&self, variant: &str) -> Result<PathBuf>;
}

/// Delivery disabled: every fetch fails and resolution uses the bundled model.
pub struct NoDelivery;

impl ModelDelivery for NoDelivery {
    fn fetch(&self, variant: &str) -> Result<PathBuf> {
        Err(anyhow!("model delivery disabled (variant '{}')", variant))
    }
}

/// Delivery backed by a local download cache: `<dir>/<variant>.onnx`.
#[derive(Clone, Debug)]
pub struct DirectoryDelivery {
    dir: PathBuf,
}

impl DirectoryDelivery {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }
}

impl ModelDelivery for DirectoryDelivery {
    fn fetch(&self, variant: &str) -> Result<PathBuf> {
        if variant.is_empty() || variant.contains(['/', '\\']) || variant.contains("..") {
            return Err(anyhow!("invalid model variant '{}'", variant));
        }
        let path = self.dir.join(format!("{variant}.onnx"));
        if !path.is_file() {
            return Err(anyhow!(
                "model variant '{}' not downloaded ({})",
                variant,
                path.display()
            ));
        }
        Ok(path)
    }
}

/// Pick the model source from preferences, falling back to the bundled model.
pub fn resolve_model_source(
    prefs: &ModelPreferences,
    delivery: &dyn ModelDelivery,
    bundled_name: &str,
) -> ModelSource {
    let bundled = || ModelSource::Bundled(bundled_name.to_string());
    if prefs.force_local_model {
        log::info!("model source: local model forced by preference");
        return bundled();
    }
    let Some(variant) = prefs.cloud_model.as_deref().filter(|v| !v.trim().is_empty()) else {
        return bundled();
    };
    match delivery.fetch(variant) {
        Ok(path) => {
            log::info!(
                "model source: cloud variant '{}' at {}",
                variant,
                path.display()
            );
            ModelSource::File(path)
        }
        Err(e) => {
            log::warn!(
                "model source: cloud variant '{}' unavailable, using bundled '{}': {}",
                variant,
                bundled_name,
                e
            );
            bundled()
        }
    }
}

/// Short content fingerprint for logging which model is loaded.
pub fn model_fingerprint(bytes: &[u8]) -> String {
    let digest: [u8; 32] = Sha256::digest(bytes).into();
    hex::encode(&digest[..8])
}
