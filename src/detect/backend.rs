use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Result};
use image::RgbaImage;

use crate::detect::result::Detection;

/// Hardware acceleration preference for the classifier.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Acceleration {
    /// Dedicated neural accelerator.
    #[default]
    Nnapi,
    Gpu,
    Cpu,
    /// No preference; runs on the CPU without trying accelerators.
    None,
}

impl Acceleration {
    /// Tiers to attempt, in order, for this preference.
    pub fn ladder(self) -> &'static [Acceleration] {
        match self {
            Acceleration::Nnapi => &[Acceleration::Nnapi, Acceleration::Gpu, Acceleration::Cpu],
            Acceleration::Gpu => &[Acceleration::Gpu, Acceleration::Cpu],
            Acceleration::Cpu | Acceleration::None => &[Acceleration::Cpu],
        }
    }
}

impl fmt::Display for Acceleration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Acceleration::Nnapi => "nnapi",
            Acceleration::Gpu => "gpu",
            Acceleration::Cpu => "cpu",
            Acceleration::None => "none",
        };
        f.write_str(name)
    }
}

impl FromStr for Acceleration {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "nnapi" | "npu" => Ok(Acceleration::Nnapi),
            "gpu" => Ok(Acceleration::Gpu),
            "cpu" => Ok(Acceleration::Cpu),
            "none" | "" => Ok(Acceleration::None),
            other => Err(anyhow!(
                "unknown acceleration '{}' (expected nnapi, gpu, cpu or none)",
                other
            )),
        }
    }
}

/// Immutable detector configuration, read once at initialization.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DetectorConfig {
    pub score_threshold: f32,
    pub max_results: usize,
    pub acceleration: Acceleration,
}

/// Detections scoring at or below this are not drawn.
pub const DEFAULT_SCORE_THRESHOLD: f32 = 0.5;
pub const DEFAULT_MAX_RESULTS: usize = 4;

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            score_threshold: DEFAULT_SCORE_THRESHOLD,
            max_results: DEFAULT_MAX_RESULTS,
            acceleration: Acceleration::Nnapi,
        }
    }
}

/// The opaque object-detection model.
///
/// Implementations receive the upright frame and return raw
/// (box, class, score) records in their own order. Boxes are expressed in the
/// pixel space of the image they were given.
pub trait Classifier: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on an upright frame.
    ///
    /// Implementations must treat the image as read-only and must not retain it
    /// beyond the call.
    fn detect(&mut self, image: &RgbaImage, config: &DetectorConfig) -> Result<Vec<Detection>>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
