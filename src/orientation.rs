//! Rotation normalization.
//!
//! The camera reports how far the sensor image is rotated from upright. The
//! classifier expects upright input, so the buffer is turned clockwise by the
//! reported amount (`-degrees / 90` counter-clockwise quarter turns).

use std::borrow::Cow;

use image::{imageops, RgbaImage};
use serde::Serialize;

use crate::error::PipelineError;

/// Camera-reported rotation. Only quarter turns are valid.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    pub fn degrees(self) -> i32 {
        match self {
            Rotation::Deg0 => 0,
            Rotation::Deg90 => 90,
            Rotation::Deg180 => 180,
            Rotation::Deg270 => 270,
        }
    }

    /// True when the rotation exchanges width and height.
    pub fn swaps_axes(self) -> bool {
        self.degrees() % 180 != 0
    }

    /// Dimensions of a `width` x `height` buffer after this rotation.
    pub fn oriented_dims(self, width: u32, height: u32) -> (u32, u32) {
        if self.swaps_axes() {
            (height, width)
        } else {
            (width, height)
        }
    }
}

impl TryFrom<i32> for Rotation {
    type Error = PipelineError;

    fn try_from(degrees: i32) -> Result<Self, Self::Error> {
        match degrees {
            0 => Ok(Rotation::Deg0),
            90 => Ok(Rotation::Deg90),
            180 => Ok(Rotation::Deg180),
            270 => Ok(Rotation::Deg270),
            other => Err(PipelineError::UnsupportedRotation(other)),
        }
    }
}

/// Upright view of a frame buffer, ready for the classifier.
///
/// Unrotated frames borrow the buffer; rotated frames own a remapped copy.
#[derive(Debug)]
pub struct NormalizedView<'a> {
    image: Cow<'a, RgbaImage>,
    rotation: Rotation,
}

impl<'a> NormalizedView<'a> {
    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// Rotation that was undone to produce this view.
    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Rotate `buffer` upright according to the camera-reported `rotation_degrees`.
pub fn normalize(
    buffer: &RgbaImage,
    rotation_degrees: i32,
) -> Result<NormalizedView<'_>, PipelineError> {
    let rotation = Rotation::try_from(rotation_degrees)?;
    let image = match rotation {
        Rotation::Deg0 => Cow::Borrowed(buffer),
        Rotation::Deg90 => Cow::Owned(imageops::rotate90(buffer)),
        Rotation::Deg180 => Cow::Owned(imageops::rotate180(buffer)),
        Rotation::Deg270 => Cow::Owned(imageops::rotate270(buffer)),
    };
    Ok(NormalizedView { image, rotation })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    const MARK: Rgba<u8> = Rgba([255, 0, 0, 255]);

    // 4x2 buffer with a single marked pixel at the top-left corner.
    fn marked_buffer() -> RgbaImage {
        let mut img = RgbaImage::new(4, 2);
        img.put_pixel(0, 0, MARK);
        img
    }

    #[test]
    fn rejects_non_quarter_turns() {
        for degrees in [45, -90, 360, 1] {
            let err = normalize(&marked_buffer(), degrees).unwrap_err();
            assert!(matches!(err, PipelineError::UnsupportedRotation(d) if d == degrees));
        }
    }

    #[test]
    fn zero_rotation_borrows_buffer() {
        let buffer = marked_buffer();
        let view = normalize(&buffer, 0).unwrap();
        assert!(matches!(view.image, Cow::Borrowed(_)));
        assert_eq!(view.image(), &buffer);
    }

    #[test]
    fn quarter_turns_swap_dimensions() {
        let buffer = marked_buffer();
        for (degrees, dims) in [(0, (4, 2)), (90, (2, 4)), (180, (4, 2)), (270, (2, 4))] {
            let view = normalize(&buffer, degrees).unwrap();
            assert_eq!((view.width(), view.height()), dims, "rotation {degrees}");
            assert_eq!(view.rotation().degrees(), degrees);
        }
    }

    #[test]
    fn rotation_turns_clockwise() {
        let buffer = marked_buffer();
        // Top-left moves to top-right after a clockwise quarter turn.
        assert_eq!(normalize(&buffer, 90).unwrap().image().get_pixel(1, 0), &MARK);
        assert_eq!(normalize(&buffer, 180).unwrap().image().get_pixel(3, 1), &MARK);
        assert_eq!(normalize(&buffer, 270).unwrap().image().get_pixel(0, 3), &MARK);
    }

    #[test]
    fn rotation_preserves_pixel_content() {
        let mut buffer = RgbaImage::new(3, 5);
        for (i, px) in buffer.pixels_mut().enumerate() {
            *px = Rgba([i as u8, 0, 0, 255]);
        }
        let mut turned = normalize(&buffer, 90).unwrap().image().clone();
        turned = imageops::rotate270(&turned);
        assert_eq!(turned, buffer);
    }

    #[test]
    fn oriented_dims_follow_axis_swap() {
        assert_eq!(Rotation::Deg0.oriented_dims(640, 480), (640, 480));
        assert_eq!(Rotation::Deg180.oriented_dims(640, 480), (640, 480));
        assert_eq!(Rotation::Deg90.oriented_dims(640, 480), (480, 640));
        assert_eq!(Rotation::Deg270.oriented_dims(640, 480), (480, 640));
    }
}
