use crate::detect::lifecycle::DetectorHandle;
use crate::detect::result::Detection;
use crate::error::PipelineError;
use crate::orientation::NormalizedView;
use crate::trace::SampledTrace;

/// Runs the installed classifier on upright frames.
///
/// No score filtering happens here: the result is whatever the classifier
/// returned, in its order, capped at the configured maximum result count.
pub struct DetectionEngine {
    handle: DetectorHandle,
    trace: SampledTrace,
}

impl DetectionEngine {
    pub fn new(handle: DetectorHandle) -> Self {
        Self {
            handle,
            trace: SampledTrace::disabled(),
        }
    }

    pub fn with_trace(mut self, trace: SampledTrace) -> Self {
        self.trace = trace;
        self
    }

    pub fn handle(&self) -> &DetectorHandle {
        &self.handle
    }

    pub fn detect(&mut self, view: &NormalizedView<'_>) -> Result<Vec<Detection>, PipelineError> {
        let trace = &mut self.trace;
        let result = self.handle.with_ready(|classifier, config| {
            let span = trace.begin();
            let detections = classifier.detect(view.image(), config).map(|mut dets| {
                dets.truncate(config.max_results);
                dets
            });
            trace.finish(span, detections.as_ref().map_or(0, Vec::len));
            detections
        })?;
        result.map_err(PipelineError::Inference)
    }
}
