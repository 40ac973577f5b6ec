//! Annotation overlay drawn on top of the camera preview.
//!
//! The canvas matches the displayed (rotated) frame: width and height are
//! swapped for 90 and 270 degree rotations. It starts fully transparent and
//! receives one unfilled rectangle per detection whose score is strictly
//! above the threshold. Detection boxes are already in upright-frame pixels,
//! so they are drawn as-is.
//!
//! An overlay is handed to the subscriber by value and cannot be mutated
//! through its public API afterwards:
//!
//! ```compile_fail
//! use iris_pipeline::{Overlay, OverlayRenderer, Rotation};
//!
//! let overlay: Overlay = OverlayRenderer::default().render(&[], 4, 4, Rotation::Deg0);
//! overlay.image().put_pixel(0, 0, image::Rgba([0, 0, 0, 255]));
//! ```

use image::{Rgba, RgbaImage};

use crate::detect::{BoundingBox, Detection, EyeClass, DEFAULT_SCORE_THRESHOLD};
use crate::orientation::Rotation;

pub const DEFAULT_STROKE_WIDTH: u32 = 5;

const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);

/// Stroke used for one class of detection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StrokeStyle {
    pub color: Rgba<u8>,
    pub width: u32,
}

impl StrokeStyle {
    /// Green for open eyes, red for closed eyes, blue for pupils.
    pub fn for_class(class: EyeClass, width: u32) -> Self {
        let color = match class {
            EyeClass::OpenEye => Rgba([0, 255, 0, 255]),
            EyeClass::ClosedEye => Rgba([255, 0, 0, 255]),
            EyeClass::Pupil => Rgba([0, 0, 255, 255]),
        };
        Self { color, width }
    }
}

/// One rectangle drawn on an overlay.
#[derive(Clone, Debug, PartialEq)]
pub struct Annotation {
    pub bbox: BoundingBox,
    pub class: EyeClass,
    pub style: StrokeStyle,
}

/// Finished overlay image plus the annotations drawn on it.
#[derive(Debug)]
pub struct Overlay {
    image: RgbaImage,
    rotation: Rotation,
    annotations: Vec<Annotation>,
}

impl Overlay {
    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn into_image(self) -> RgbaImage {
        self.image
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    pub fn annotations(&self) -> &[Annotation] {
        &self.annotations
    }

    /// True when nothing has been drawn.
    pub fn is_blank(&self) -> bool {
        self.image.pixels().all(|px| px[3] == 0)
    }
}

/// Draws detections onto a fresh transparent canvas.
#[derive(Clone, Debug)]
pub struct OverlayRenderer {
    threshold: f32,
    stroke_width: u32,
}

impl Default for OverlayRenderer {
    fn default() -> Self {
        Self::new(DEFAULT_SCORE_THRESHOLD)
    }
}

impl OverlayRenderer {
    pub fn new(threshold: f32) -> Self {
        Self {
            threshold,
            stroke_width: DEFAULT_STROKE_WIDTH,
        }
    }

    pub fn with_stroke_width(mut self, width: u32) -> Self {
        self.stroke_width = width.max(1);
        self
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Render `detections` for a `frame_width` x `frame_height` frame
    /// captured at `rotation`.
    pub fn render(
        &self,
        detections: &[Detection],
        frame_width: u32,
        frame_height: u32,
        rotation: Rotation,
    ) -> Overlay {
        let (width, height) = rotation.oriented_dims(frame_width, frame_height);
        let mut image = RgbaImage::from_pixel(width, height, TRANSPARENT);
        let mut annotations = Vec::new();

        for detection in detections.iter().filter(|d| d.passes(self.threshold)) {
            let class = detection.class();
            let style = StrokeStyle::for_class(class, self.stroke_width);
            draw_rect(&mut image, &detection.bbox, style);
            annotations.push(Annotation {
                bbox: detection.bbox,
                class,
                style,
            });
        }

        Overlay {
            image,
            rotation,
            annotations,
        }
    }
}

/// Draw an unfilled rectangle, with the stroke growing inward from the box
/// edge. Parts outside the canvas are clipped.
pub fn draw_rect(img: &mut RgbaImage, bbox: &BoundingBox, style: StrokeStyle) {
    let (w, h) = (img.width() as i64, img.height() as i64);
    if w == 0 || h == 0 {
        return;
    }
    let edges = [bbox.left, bbox.top, bbox.right, bbox.bottom];
    if edges.iter().any(|v| v.is_nan()) {
        return;
    }
    // An edge further than one stroke off the canvas draws nothing, so clamp
    // there before converting. Keeps the stroke arithmetic in range.
    let margin = style.width as f32 + 1.0;
    let clamp_x = |v: f32| v.clamp(-margin, w as f32 + margin) as i64;
    let clamp_y = |v: f32| v.clamp(-margin, h as f32 + margin) as i64;
    let x0 = clamp_x(bbox.left.min(bbox.right));
    let x1 = clamp_x(bbox.left.max(bbox.right));
    let y0 = clamp_y(bbox.top.min(bbox.bottom));
    let y1 = clamp_y(bbox.top.max(bbox.bottom));

    for t in 0..style.width as i64 {
        let (xx0, yy0, xx1, yy1) = (x0 + t, y0 + t, x1 - t, y1 - t);
        if xx0 > xx1 || yy0 > yy1 {
            break;
        }
        let (cx0, cx1) = (xx0.max(0), xx1.min(w - 1));
        let (cy0, cy1) = (yy0.max(0), yy1.min(h - 1));
        if cx0 <= cx1 {
            for x in cx0..=cx1 {
                for y in [yy0, yy1] {
                    if (0..h).contains(&y) {
                        img.put_pixel(x as u32, y as u32, style.color);
                    }
                }
            }
        }
        if cy0 <= cy1 {
            for y in cy0..=cy1 {
                for x in [xx0, xx1] {
                    if (0..w).contains(&x) {
                        img.put_pixel(x as u32, y as u32, style.color);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(bbox: (f32, f32, f32, f32), class_index: i32, score: f32) -> Detection {
        Detection::new(
            BoundingBox::new(bbox.0, bbox.1, bbox.2, bbox.3),
            class_index,
            score,
        )
    }

    #[test]
    fn extreme_and_non_finite_edges_are_clipped() {
        let style = StrokeStyle {
            color: Rgba([0, 0, 255, 255]),
            width: 2,
        };

        let mut img = RgbaImage::from_pixel(16, 16, TRANSPARENT);
        let huge = BoundingBox::new(-f32::MAX, -f32::MAX, f32::MAX, f32::MAX);
        draw_rect(&mut img, &huge, style);
        assert!(img.pixels().all(|p| *p == TRANSPARENT));

        let unbounded = BoundingBox::new(f32::NEG_INFINITY, 4.0, f32::INFINITY, 8.0);
        draw_rect(&mut img, &unbounded, style);
        assert_eq!(img.get_pixel(0, 4), &style.color);
        assert_eq!(img.get_pixel(15, 5), &style.color);
        assert_eq!(img.get_pixel(7, 8), &style.color);
        assert_eq!(img.get_pixel(7, 6), &TRANSPARENT);

        let mut img = RgbaImage::from_pixel(16, 16, TRANSPARENT);
        draw_rect(&mut img, &BoundingBox::new(f32::NAN, 1.0, 5.0, 5.0), style);
        let past_edge = BoundingBox::new(1e30, 1e30, f32::INFINITY, f32::INFINITY);
        draw_rect(&mut img, &past_edge, style);
        assert!(img.pixels().all(|p| *p == TRANSPARENT));

        let wide = StrokeStyle {
            color: style.color,
            width: u32::MAX,
        };
        draw_rect(&mut img, &BoundingBox::new(2.0, 2.0, 5.0, 5.0), wide);
        assert_eq!(img.get_pixel(3, 3), &style.color);
        assert_eq!(img.get_pixel(6, 6), &TRANSPARENT);
    }

    #[test]
    fn renderer_survives_saturated_detections() {
        let overlay = OverlayRenderer::new(0.5).render(
            &[
                det((f32::MIN, f32::MIN, f32::MAX, f32::MAX), 0, 0.9),
                det((-1e30, -1e30, -1e30, -1e30), 1, 0.9),
            ],
            8,
            8,
            Rotation::Deg0,
        );
        assert_eq!(overlay.annotations().len(), 2);
        assert!(overlay.is_blank());
    }

    #[test]
    fn canvas_follows_rotation() {
        let renderer = OverlayRenderer::default();
        for (rotation, dims) in [
            (Rotation::Deg0, (640, 480)),
            (Rotation::Deg90, (480, 640)),
            (Rotation::Deg180, (640, 480)),
            (Rotation::Deg270, (480, 640)),
        ] {
            let overlay = renderer.render(&[], 640, 480, rotation);
            assert_eq!((overlay.width(), overlay.height()), dims);
            assert!(overlay.is_blank());
        }
    }

    #[test]
    fn scores_at_or_below_threshold_are_not_drawn() {
        let renderer = OverlayRenderer::new(0.5);
        let overlay = renderer.render(
            &[
                det((1.0, 1.0, 10.0, 10.0), 0, 0.5),
                det((12.0, 12.0, 20.0, 20.0), 1, 0.49),
            ],
            32,
            32,
            Rotation::Deg0,
        );
        assert!(overlay.annotations().is_empty());
        assert!(overlay.is_blank());
    }

    #[test]
    fn class_styles_are_fixed() {
        let renderer = OverlayRenderer::new(0.5).with_stroke_width(1);
        for (index, expected) in [
            (0, Rgba([0, 255, 0, 255])),
            (1, Rgba([255, 0, 0, 255])),
            (2, Rgba([0, 0, 255, 255])),
            (7, Rgba([0, 0, 255, 255])),
            (-1, Rgba([0, 0, 255, 255])),
        ] {
            let overlay =
                renderer.render(&[det((2.0, 2.0, 6.0, 6.0), index, 0.9)], 10, 10, Rotation::Deg0);
            assert_eq!(overlay.image().get_pixel(2, 2), &expected, "class {index}");
            assert_eq!(overlay.annotations()[0].style.color, expected);
        }
    }

    #[test]
    fn rectangle_is_unfilled() {
        let renderer = OverlayRenderer::new(0.5).with_stroke_width(2);
        let overlay =
            renderer.render(&[det((10.0, 10.0, 30.0, 30.0), 0, 0.9)], 40, 40, Rotation::Deg0);
        let img = overlay.image();
        let green = Rgba([0, 255, 0, 255]);
        for (x, y) in [(10, 10), (30, 10), (10, 30), (30, 30), (11, 20), (29, 20)] {
            assert_eq!(img.get_pixel(x, y), &green, "edge ({x},{y})");
        }
        assert_eq!(img.get_pixel(20, 20), &TRANSPARENT);
        assert_eq!(img.get_pixel(12, 20), &TRANSPARENT);
        assert_eq!(img.get_pixel(9, 9), &TRANSPARENT);
    }

    #[test]
    fn clips_boxes_outside_canvas() {
        let renderer = OverlayRenderer::new(0.5).with_stroke_width(1);
        let overlay = renderer.render(
            &[
                det((-5.0, -5.0, 3.0, 3.0), 1, 0.9),
                det((100.0, 100.0, 200.0, 200.0), 1, 0.9),
            ],
            8,
            8,
            Rotation::Deg0,
        );
        let red = Rgba([255, 0, 0, 255]);
        assert_eq!(overlay.image().get_pixel(3, 0), &red);
        assert_eq!(overlay.image().get_pixel(0, 3), &red);
        assert_eq!(overlay.image().get_pixel(1, 1), &TRANSPARENT);
        assert_eq!(overlay.annotations().len(), 2);
    }
}
