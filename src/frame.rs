//! Camera frame ownership and the reusable pixel buffer.
//!
//! - `Frame`: one camera-delivered image (RGBA8888) plus its rotation hint and
//!   the mirror flag captured at hand-off. Move-only; owned by the dispatcher
//!   for exactly one pipeline pass.
//! - `FrameBuffer`: the single pixel allocation reused across frames. Copies
//!   frame bytes in and applies the optional horizontal mirror.

use image::{imageops, RgbaImage};

use crate::error::PipelineError;

/// Camera frames are delivered as RGBA8888.
pub const BYTES_PER_PIXEL: usize = 4;

// ----------------------------------------------------------------------------
// Frame
// ----------------------------------------------------------------------------

/// One camera frame. There is no `Clone`: a frame is handed to the dispatcher
/// once and dropped when its pass ends.
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    rotation_degrees: i32,
    mirrored: bool,
}

impl Frame {
    /// Wrap camera output. Validation happens in `FrameBuffer::copy_from` so the
    /// camera lane never blocks on a malformed frame.
    pub fn new(
        data: Vec<u8>,
        width: u32,
        height: u32,
        rotation_degrees: i32,
        mirrored: bool,
    ) -> Self {
        Self {
            data,
            width,
            height,
            rotation_degrees,
            mirrored,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Sensor rotation reported by the camera, in degrees.
    pub fn rotation_degrees(&self) -> i32 {
        self.rotation_degrees
    }

    /// Whether this frame came from a front-facing camera and must be mirrored.
    pub fn is_mirrored(&self) -> bool {
        self.mirrored
    }

    pub(crate) fn pixels(&self) -> &[u8] {
        &self.data
    }

    fn expected_len(&self) -> Result<usize, PipelineError> {
        (self.width as usize)
            .checked_mul(self.height as usize)
            .and_then(|v| v.checked_mul(BYTES_PER_PIXEL))
            .ok_or_else(|| PipelineError::InvalidFrame("frame dimensions overflow".to_string()))
    }
}

impl std::fmt::Debug for Frame {
    // Pixel bytes are never formatted.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("rotation_degrees", &self.rotation_degrees)
            .field("mirrored", &self.mirrored)
            .finish()
    }
}

// ----------------------------------------------------------------------------
// FrameBuffer
// ----------------------------------------------------------------------------

/// Reusable RGBA buffer sized to the camera's frame dimensions.
///
/// The first frame allocates; later frames of the same size reuse the
/// allocation. A size change reallocates.
#[derive(Default)]
pub struct FrameBuffer {
    image: Option<RgbaImage>,
    allocations: u64,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy a frame's pixels into the owned buffer.
    pub fn copy_from(&mut self, frame: &Frame) -> Result<&mut RgbaImage, PipelineError> {
        if frame.width == 0 || frame.height == 0 {
            return Err(PipelineError::InvalidFrame(format!(
                "zero-sized frame {}x{}",
                frame.width, frame.height
            )));
        }
        let expected = frame.expected_len()?;
        if frame.pixels().len() != expected {
            return Err(PipelineError::InvalidFrame(format!(
                "expected {} RGBA bytes for {}x{}, received {}",
                expected,
                frame.width,
                frame.height,
                frame.pixels().len()
            )));
        }

        let reuse = matches!(
            &self.image,
            Some(img) if img.dimensions() == (frame.width, frame.height)
        );
        if !reuse {
            log::debug!(
                "frame buffer: allocating {}x{} RGBA",
                frame.width,
                frame.height
            );
            self.image = Some(RgbaImage::new(frame.width, frame.height));
            self.allocations += 1;
        }

        let image = self
            .image
            .get_or_insert_with(|| RgbaImage::new(frame.width, frame.height));
        image.copy_from_slice(frame.pixels());
        Ok(image)
    }

    /// Number of times the backing allocation was (re)created.
    pub fn allocations(&self) -> u64 {
        self.allocations
    }

    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.image.as_ref().map(|img| img.dimensions())
    }
}

/// Flip a buffer about its vertical center axis.
///
/// Applying it twice restores the original pixels.
pub fn mirror_horizontally(image: &mut RgbaImage) {
    imageops::flip_horizontal_in_place(image);
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
