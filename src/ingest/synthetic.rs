//! Synthetic camera for running the pipeline without hardware.
//!
//! Renders an upright face scene (grey background, two eyes matching the
//! stub classifier's layout) and then lays it out the way a sensor would
//! deliver it: rotated against the reported rotation and mirrored when the
//! front lens is selected. Every `blink_every` frames the eyes close for
//! `blink_frames` frames.
//!
//! The lens selection is read once per frame, so switching lenses mid-stream
//! only affects frames created after the switch.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use image::{imageops, Rgba, RgbaImage};

use crate::detect::backends::stub::{LEFT_EYE, RIGHT_EYE};
use crate::frame::{mirror_horizontally, Frame};
use crate::orientation::Rotation;

const BACKGROUND: Rgba<u8> = Rgba([128, 128, 128, 255]);
const OPEN_EYE: Rgba<u8> = Rgba([240, 240, 240, 255]);
const CLOSED_EYE: Rgba<u8> = Rgba([20, 20, 20, 255]);
/// Small marker near the top-left of the upright scene, so mirroring and
/// rotation mistakes are visible.
const MARKER: Rgba<u8> = Rgba([255, 0, 0, 255]);

#[derive(Clone, Debug)]
pub struct SyntheticCameraConfig {
    /// Sensor width, before rotation.
    pub width: u32,
    /// Sensor height, before rotation.
    pub height: u32,
    pub rotation_degrees: i32,
    pub blink_every: u64,
    pub blink_frames: u64,
}

impl Default for SyntheticCameraConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            rotation_degrees: 90,
            blink_every: 30,
            blink_frames: 3,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CameraStats {
    pub frames_captured: u64,
    pub blink_frames: u64,
}

pub struct SyntheticCamera {
    config: SyntheticCameraConfig,
    rotation: Rotation,
    front_facing: Arc<AtomicBool>,
    stats: CameraStats,
}

impl SyntheticCamera {
    pub fn new(config: SyntheticCameraConfig, front_facing: bool) -> Result<Self> {
        let rotation = Rotation::try_from(config.rotation_degrees)?;
        if config.width == 0 || config.height == 0 {
            anyhow::bail!(
                "synthetic camera needs non-zero dimensions, got {}x{}",
                config.width,
                config.height
            );
        }
        log::info!(
            "synthetic camera: {}x{} rotation={} front_facing={}",
            config.width,
            config.height,
            rotation.degrees(),
            front_facing
        );
        Ok(Self {
            config,
            rotation,
            front_facing: Arc::new(AtomicBool::new(front_facing)),
            stats: CameraStats::default(),
        })
    }

    /// Shared lens selector; `true` selects the front lens.
    pub fn lens_selector(&self) -> Arc<AtomicBool> {
        self.front_facing.clone()
    }

    pub fn stats(&self) -> CameraStats {
        self.stats.clone()
    }

    /// True when the frame at `index` (zero based) shows closed eyes.
    pub fn is_blink(&self, index: u64) -> bool {
        self.config.blink_every > 0
            && index % self.config.blink_every < self.config.blink_frames
            && index >= self.config.blink_every
    }

    pub fn next_frame(&mut self) -> Frame {
        let index = self.stats.frames_captured;
        self.stats.frames_captured += 1;
        let closed = self.is_blink(index);
        if closed {
            self.stats.blink_frames += 1;
        }
        let mirrored = self.front_facing.load(Ordering::SeqCst);

        let upright = self.render_scene(closed);
        let mut sensor = match self.rotation {
            Rotation::Deg0 => upright,
            Rotation::Deg90 => imageops::rotate270(&upright),
            Rotation::Deg180 => imageops::rotate180(&upright),
            Rotation::Deg270 => imageops::rotate90(&upright),
        };
        if mirrored {
            mirror_horizontally(&mut sensor);
        }
        let (width, height) = sensor.dimensions();
        Frame::new(
            sensor.into_raw(),
            width,
            height,
            self.rotation.degrees(),
            mirrored,
        )
    }

    fn render_scene(&self, closed: bool) -> RgbaImage {
        let (width, height) = self
            .rotation
            .oriented_dims(self.config.width, self.config.height);
        let mut scene = RgbaImage::from_pixel(width, height, BACKGROUND);
        let eye = if closed { CLOSED_EYE } else { OPEN_EYE };
        for layout in [LEFT_EYE, RIGHT_EYE] {
            fill(&mut scene, layout, eye);
        }
        fill(&mut scene, [0.02, 0.02, 0.08, 0.08], MARKER);
        scene
    }
}

fn fill(img: &mut RgbaImage, layout: [f32; 4], color: Rgba<u8>) {
    let (w, h) = (img.width() as f32, img.height() as f32);
    let x0 = (layout[0] * w) as u32;
    let y0 = (layout[1] * h) as u32;
    let x1 = ((layout[2] * w) as u32).min(img.width());
    let y1 = ((layout[3] * h) as u32).min(img.height());
    for y in y0..y1 {
        for x in x0..x1 {
            img.put_pixel(x, y, color);
        }
    }
}
