use serde::Serialize;

/// Axis-aligned box in pixel coordinates of the upright (normalized) frame.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct BoundingBox {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl BoundingBox {
    pub fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }
}

/// What a detection's class index means for this model.
///
/// The mapping is total: anything that is not 0 or 1 lands in `Pupil`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum EyeClass {
    OpenEye,
    ClosedEye,
    Pupil,
}

impl EyeClass {
    pub fn from_index(index: i32) -> Self {
        match index {
            0 => EyeClass::OpenEye,
            1 => EyeClass::ClosedEye,
            _ => EyeClass::Pupil,
        }
    }
}

/// One model-reported object. Immutable once produced by the engine.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub class_index: i32,
    /// Confidence in 0..=1.
    pub score: f32,
}

impl Detection {
    pub fn new(bbox: BoundingBox, class_index: i32, score: f32) -> Self {
        Self {
            bbox,
            class_index,
            score,
        }
    }

    pub fn class(&self) -> EyeClass {
        EyeClass::from_index(self.class_index)
    }

    /// Strictly-greater comparison: a score equal to the threshold is rejected.
    pub fn passes(&self, threshold: f32) -> bool {
        self.score > threshold
    }
}
