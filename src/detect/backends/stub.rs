use std::path::PathBuf;

use anyhow::Result;
use image::RgbaImage;

use crate::detect::backend::{Acceleration, Classifier, DetectorConfig};
use crate::detect::lifecycle::ModelLoader;
use crate::detect::result::{BoundingBox, Detection};
use crate::error::ModelLoadError;
use crate::model_source::{model_fingerprint, BundledAssets, ModelSource};

/// Mean eye-region luminance below this counts as a closed eye.
const CLOSED_EYE_LUMA: f32 = 64.0;

/// Fixed face layout, as fractions of the upright frame: (left, top, right, bottom).
pub(crate) const LEFT_EYE: [f32; 4] = [0.25, 0.35, 0.42, 0.45];
pub(crate) const RIGHT_EYE: [f32; 4] = [0.58, 0.35, 0.75, 0.45];

/// Stub classifier for development without a real model.
///
/// Assumes a centered face: reports both eye regions, classifying each as open
/// or closed from its mean luminance, plus a pupil inside every open eye.
#[derive(Default)]
pub struct StubClassifier;

impl StubClassifier {
    pub fn new() -> Self {
        Self
    }

    fn eye(&self, image: &RgbaImage, layout: [f32; 4]) -> Vec<Detection> {
        let bbox = scale(layout, image.width(), image.height());
        let open = mean_luma(image, &bbox) >= CLOSED_EYE_LUMA;
        let mut out = vec![Detection::new(bbox, if open { 0 } else { 1 }, 0.9)];
        if open {
            let cx = (bbox.left + bbox.right) / 2.0;
            let cy = (bbox.top + bbox.bottom) / 2.0;
            let r = bbox.height() / 3.0;
            out.push(Detection::new(
                BoundingBox::new(cx - r, cy - r, cx + r, cy + r),
                2,
                0.75,
            ));
        }
        out
    }
}

impl Classifier for StubClassifier {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&mut self, image: &RgbaImage, config: &DetectorConfig) -> Result<Vec<Detection>> {
        let mut detections = self.eye(image, LEFT_EYE);
        detections.extend(self.eye(image, RIGHT_EYE));
        detections.retain(|d| d.score >= config.score_threshold);
        detections.truncate(config.max_results);
        Ok(detections)
    }
}

fn scale(layout: [f32; 4], width: u32, height: u32) -> BoundingBox {
    let (w, h) = (width as f32, height as f32);
    BoundingBox::new(layout[0] * w, layout[1] * h, layout[2] * w, layout[3] * h)
}

fn mean_luma(image: &RgbaImage, bbox: &BoundingBox) -> f32 {
    let x0 = bbox.left.max(0.0) as u32;
    let y0 = bbox.top.max(0.0) as u32;
    let x1 = (bbox.right as u32).min(image.width());
    let y1 = (bbox.bottom as u32).min(image.height());
    let mut sum = 0.0f32;
    let mut count = 0u32;
    for y in y0..y1 {
        for x in x0..x1 {
            let [r, g, b, _] = image.get_pixel(x, y).0;
            sum += 0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32;
            count += 1;
        }
    }
    if count == 0 {
        0.0
    } else {
        sum / count as f32
    }
}

/// Loads any non-empty model file and installs a `StubClassifier` on the CPU.
pub struct StubLoader {
    assets: BundledAssets,
}

impl StubLoader {
    pub fn new<P: Into<PathBuf>>(assets_dir: P) -> Self {
        Self {
            assets: BundledAssets::new(assets_dir),
        }
    }
}

impl ModelLoader for StubLoader {
    fn load(
        &self,
        source: &ModelSource,
        _config: &DetectorConfig,
        acceleration: Acceleration,
    ) -> Result<Box<dyn Classifier>, ModelLoadError> {
        let (path, bytes) = source.read(&self.assets)?;
        if acceleration != Acceleration::Cpu {
            return Err(ModelLoadError::AccelerationUnavailable(
                acceleration,
                "stub backend runs on the CPU only".to_string(),
            ));
        }
        log::info!(
            "stub backend: loaded {} ({} bytes, sha256:{})",
            path.display(),
            bytes.len(),
            model_fingerprint(&bytes)
        );
        Ok(Box::new(StubClassifier::new()))
    }
}
