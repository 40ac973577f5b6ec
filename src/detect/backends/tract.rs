#![cfg(feature = "backend-tract")]

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use image::{imageops, RgbaImage};
use tract_onnx::prelude::*;

use crate::detect::backend::{Acceleration, Classifier, DetectorConfig};
use crate::detect::lifecycle::ModelLoader;
use crate::detect::result::{BoundingBox, Detection};
use crate::error::ModelLoadError;
use crate::model_source::{model_fingerprint, BundledAssets, ModelSource};

/// Values per detection row: x1, y1, x2, y2, score, class.
const ROW_LEN: usize = 6;

/// Tract-based ONNX eye detector.
///
/// Expects an NCHW float input of `input_width` x `input_height` in 0..1 and a
/// single `[1, N, 6]` output of normalized `(x1, y1, x2, y2, score, class)`
/// rows. Boxes are scaled back to the pixel space of the frame given to
/// `detect`. Runs on the CPU.
pub struct TractClassifier {
    model: TypedRunnableModel<TypedModel>,
    input_width: u32,
    input_height: u32,
}

impl TractClassifier {
    /// Load and optimize an ONNX model from memory.
    pub fn from_bytes(bytes: &[u8], input_width: u32, input_height: u32) -> Result<Self> {
        let model = tract_onnx::onnx()
            .model_for_read(&mut std::io::Cursor::new(bytes))
            .context("failed to parse ONNX model")?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, 3, input_height as usize, input_width as usize),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            input_width,
            input_height,
        })
    }

    fn build_input(&self, image: &RgbaImage) -> Tensor {
        let resized = imageops::resize(
            image,
            self.input_width,
            self.input_height,
            imageops::FilterType::Triangle,
        );
        let width = self.input_width as usize;
        let height = self.input_height as usize;
        tract_ndarray::Array4::from_shape_fn((1, 3, height, width), |(_, channel, y, x)| {
            resized.get_pixel(x as u32, y as u32).0[channel] as f32 / 255.0
        })
        .into_tensor()
    }

    fn decode(
        &self,
        outputs: TVec<TValue>,
        frame_width: u32,
        frame_height: u32,
        config: &DetectorConfig,
    ) -> Result<Vec<Detection>> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let flat: Vec<f32> = view.iter().copied().collect();
        if flat.len() % ROW_LEN != 0 {
            return Err(anyhow!(
                "model output has {} values, not a multiple of {}",
                flat.len(),
                ROW_LEN
            ));
        }

        let (w, h) = (frame_width as f32, frame_height as f32);
        let detections = flat
            .chunks_exact(ROW_LEN)
            .filter(|row| row[4].is_finite() && row[4] >= config.score_threshold)
            .map(|row| {
                Detection::new(
                    BoundingBox::new(row[0] * w, row[1] * h, row[2] * w, row[3] * h),
                    row[5].round() as i32,
                    row[4].clamp(0.0, 1.0),
                )
            })
            .take(config.max_results)
            .collect();
        Ok(detections)
    }
}

impl Classifier for TractClassifier {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn detect(&mut self, image: &RgbaImage, config: &DetectorConfig) -> Result<Vec<Detection>> {
        let input = self.build_input(image);
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        self.decode(outputs, image.width(), image.height(), config)
    }

    fn warm_up(&mut self) -> Result<()> {
        let blank = RgbaImage::new(self.input_width, self.input_height);
        self.detect(&blank, &DetectorConfig::default()).map(|_| ())
    }
}

/// Loads ONNX models for `TractClassifier`. Tract has no accelerator
/// delegates, so only the CPU tier succeeds.
pub struct TractLoader {
    assets: BundledAssets,
    input_width: u32,
    input_height: u32,
}

impl TractLoader {
    pub fn new<P: Into<PathBuf>>(assets_dir: P, input_width: u32, input_height: u32) -> Self {
        Self {
            assets: BundledAssets::new(assets_dir),
            input_width,
            input_height,
        }
    }
}

impl ModelLoader for TractLoader {
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
                "tract runs on the CPU only".to_string(),
            ));
        }
        let classifier = TractClassifier::from_bytes(&bytes, self.input_width, self.input_height)
            .map_err(|e| ModelLoadError::Invalid(format!("{}: {:#}", path.display(), e)))?;
        log::info!(
            "tract backend: loaded {} (sha256:{}, input {}x{})",
            path.display(),
            model_fingerprint(&bytes),
            self.input_width,
            self.input_height
        );
        Ok(Box::new(classifier))
    }
}
