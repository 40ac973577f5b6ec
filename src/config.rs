use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::detect::{
    Acceleration, DetectorConfig, DEFAULT_MAX_RESULTS, DEFAULT_SCORE_THRESHOLD,
};
use crate::model_source::ModelPreferences;
use crate::orientation::Rotation;
use crate::overlay::DEFAULT_STROKE_WIDTH;
use crate::trace::DEFAULT_TRACE_INTERVAL;

const DEFAULT_MODEL_NAME: &str = "model1.onnx";
const DEFAULT_ASSETS_DIR: &str = "assets";
const DEFAULT_CLOUD_CACHE_DIR: &str = "models";
const DEFAULT_CAMERA_WIDTH: u32 = 640;
const DEFAULT_CAMERA_HEIGHT: u32 = 480;
const DEFAULT_CAMERA_FPS: u32 = 10;
const DEFAULT_CAMERA_ROTATION: i32 = 90;

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct IrisConfigFile {
    detector: Option<DetectorConfigFile>,
    preferences: Option<PreferencesConfigFile>,
    camera: Option<CameraConfigFile>,
    overlay: Option<OverlayConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct DetectorConfigFile {
    score_threshold: Option<f32>,
    max_results: Option<usize>,
    acceleration: Option<String>,
    model_name: Option<String>,
    assets_dir: Option<PathBuf>,
    trace_interval: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PreferencesConfigFile {
    force_local_model: Option<bool>,
    cloud_model: Option<String>,
    cloud_cache_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct CameraConfigFile {
    width: Option<u32>,
    height: Option<u32>,
    fps: Option<u32>,
    rotation_degrees: Option<i32>,
    front_facing: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct OverlayConfigFile {
    stroke_width: Option<u32>,
}

/// Fully resolved pipeline configuration.
#[derive(Debug, Clone)]
pub struct IrisConfig {
    pub detector: DetectorSettings,
    pub preferences: ModelPreferences,
    pub cloud_cache_dir: PathBuf,
    pub camera: CameraSettings,
    pub stroke_width: u32,
}

#[derive(Debug, Clone)]
pub struct DetectorSettings {
    pub score_threshold: f32,
    pub max_results: usize,
    pub acceleration: Acceleration,
    pub model_name: String,
    pub assets_dir: PathBuf,
    pub trace_interval: u32,
}

#[derive(Debug, Clone)]
pub struct CameraSettings {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub rotation_degrees: i32,
    pub front_facing: bool,
}

impl IrisConfig {
    /// Defaults, then the TOML file named by `IRIS_CONFIG`, then `IRIS_*`
    /// environment overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("IRIS_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: IrisConfigFile) -> Result<Self> {
        let detector_file = file.detector.unwrap_or_default();
        let acceleration = match detector_file.acceleration.as_deref() {
            Some(raw) => raw.parse()?,
            None => Acceleration::default(),
        };
        let detector = DetectorSettings {
            score_threshold: detector_file
                .score_threshold
                .unwrap_or(DEFAULT_SCORE_THRESHOLD),
            max_results: detector_file.max_results.unwrap_or(DEFAULT_MAX_RESULTS),
            acceleration,
            model_name: detector_file
                .model_name
                .unwrap_or_else(|| DEFAULT_MODEL_NAME.to_string()),
            assets_dir: detector_file
                .assets_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_ASSETS_DIR)),
            trace_interval: detector_file
                .trace_interval
                .unwrap_or(DEFAULT_TRACE_INTERVAL),
        };

        let prefs_file = file.preferences.unwrap_or_default();
        let preferences = ModelPreferences {
            force_local_model: prefs_file.force_local_model.unwrap_or(false),
            cloud_model: prefs_file.cloud_model,
        };
        let cloud_cache_dir = prefs_file
            .cloud_cache_dir
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CLOUD_CACHE_DIR));

        let camera = file.camera.unwrap_or_default();
        let camera = CameraSettings {
            width: camera.width.unwrap_or(DEFAULT_CAMERA_WIDTH),
            height: camera.height.unwrap_or(DEFAULT_CAMERA_HEIGHT),
            fps: camera.fps.unwrap_or(DEFAULT_CAMERA_FPS),
            rotation_degrees: camera.rotation_degrees.unwrap_or(DEFAULT_CAMERA_ROTATION),
            front_facing: camera.front_facing.unwrap_or(false),
        };

        let stroke_width = file
            .overlay
            .and_then(|overlay| overlay.stroke_width)
            .unwrap_or(DEFAULT_STROKE_WIDTH);

        Ok(Self {
            detector,
            preferences,
            cloud_cache_dir,
            camera,
            stroke_width,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(dir) = std::env::var("IRIS_ASSETS_DIR") {
            if !dir.trim().is_empty() {
                self.detector.assets_dir = PathBuf::from(dir);
            }
        }
        if let Ok(name) = std::env::var("IRIS_MODEL_NAME") {
            if !name.trim().is_empty() {
                self.detector.model_name = name.trim().to_string();
            }
        }
        if let Ok(force) = std::env::var("IRIS_FORCE_LOCAL_MODEL") {
            self.preferences.force_local_model = parse_bool(&force)
                .ok_or_else(|| anyhow!("IRIS_FORCE_LOCAL_MODEL must be true or false"))?;
        }
        if let Ok(model) = std::env::var("IRIS_CLOUD_MODEL") {
            let model = model.trim();
            self.preferences.cloud_model = (!model.is_empty()).then(|| model.to_string());
        }
        if let Ok(dir) = std::env::var("IRIS_CLOUD_CACHE_DIR") {
            if !dir.trim().is_empty() {
                self.cloud_cache_dir = PathBuf::from(dir);
            }
        }
        if let Ok(threshold) = std::env::var("IRIS_SCORE_THRESHOLD") {
            self.detector.score_threshold = threshold
                .trim()
                .parse()
                .map_err(|_| anyhow!("IRIS_SCORE_THRESHOLD must be a number"))?;
        }
        if let Ok(max) = std::env::var("IRIS_MAX_RESULTS") {
            self.detector.max_results = max
                .trim()
                .parse()
                .map_err(|_| anyhow!("IRIS_MAX_RESULTS must be a non-negative integer"))?;
        }
        if let Ok(acceleration) = std::env::var("IRIS_ACCELERATION") {
            self.detector.acceleration = acceleration.parse()?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        let threshold = self.detector.score_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(anyhow!(
                "score_threshold must be within [0, 1], got {}",
                threshold
            ));
        }
        if self.detector.max_results == 0 {
            return Err(anyhow!("max_results must be at least 1"));
        }
        if self.detector.model_name.trim().is_empty() {
            return Err(anyhow!("model_name must not be empty"));
        }
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(anyhow!(
                "camera dimensions must be non-zero, got {}x{}",
                self.camera.width,
                self.camera.height
            ));
        }
        if self.camera.fps == 0 {
            return Err(anyhow!("camera fps must be greater than zero"));
        }
        Rotation::try_from(self.camera.rotation_degrees)?;
        if self.stroke_width == 0 {
            return Err(anyhow!("overlay stroke_width must be greater than zero"));
        }
        Ok(())
    }

    pub fn detector_config(&self) -> DetectorConfig {
        DetectorConfig {
            score_threshold: self.detector.score_threshold,
            max_results: self.detector.max_results,
            acceleration: self.detector.acceleration,
        }
    }
}

fn read_config_file(path: &Path) -> Result<IrisConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = toml::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
