//! Sampled performance tracing for detector calls.
//!
//! Only every Nth call is timed so the hot path stays cheap. Where the timing
//! goes is up to the `TraceSink`.

use std::time::{Duration, Instant};

/// Default sampling interval: one traced call in 120.
pub const DEFAULT_TRACE_INTERVAL: u32 = 120;

/// Receives sampled span durations.
pub trait TraceSink: Send {
    fn record(&self, name: &'static str, elapsed: Duration, detections: usize);
}

/// Discards all spans.
pub struct NoopTraceSink;

impl TraceSink for NoopTraceSink {
    fn record(&self, _name: &'static str, _elapsed: Duration, _detections: usize) {}
}

/// Logs spans at debug level.
pub struct LogTraceSink;

impl TraceSink for LogTraceSink {
    fn record(&self, name: &'static str, elapsed: Duration, detections: usize) {
        log::debug!(
            "trace {}: {:.2} ms, {} detections",
            name,
            elapsed.as_secs_f64() * 1000.0,
            detections
        );
    }
}

/// An open span returned by `SampledTrace::begin` for sampled calls.
#[must_use]
pub struct Span {
    started: Instant,
}

/// Counts calls and opens a span on the first and every `interval`-th call.
pub struct SampledTrace {
    name: &'static str,
    interval: u32,
    counter: u32,
    sink: Box<dyn TraceSink>,
}

impl SampledTrace {
    pub fn new(name: &'static str, interval: u32, sink: Box<dyn TraceSink>) -> Self {
        Self {
            name,
            interval: interval.max(1),
            counter: 0,
            sink,
        }
    }

    pub fn disabled() -> Self {
        Self::new("disabled", u32::MAX, Box::new(NoopTraceSink))
    }

    pub fn begin(&mut self) -> Option<Span> {
        let sampled = self.counter == 0;
        self.counter = (self.counter + 1) % self.interval;
        sampled.then(|| Span {
            started: Instant::now(),
        })
    }

    pub fn finish(&self, span: Option<Span>, detections: usize) {
        if let Some(span) = span {
            self.sink
                .record(self.name, span.started.elapsed(), detections);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct Collect(Arc<Mutex<Vec<usize>>>);

    impl TraceSink for Collect {
        fn record(&self, _name: &'static str, _elapsed: Duration, detections: usize) {
            self.0.lock().unwrap().push(detections);
        }
    }

    #[test]
    fn samples_first_and_every_nth_call() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut trace = SampledTrace::new("detect", 3, Box::new(Collect(seen.clone())));
        for i in 0..7 {
            let span = trace.begin();
            trace.finish(span, i);
        }
        assert_eq!(*seen.lock().unwrap(), vec![0, 3, 6]);
    }

    #[test]
    fn zero_interval_traces_every_call() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut trace = SampledTrace::new("detect", 0, Box::new(Collect(seen.clone())));
        for i in 0..3 {
            let span = trace.begin();
            trace.finish(span, i);
        }
        assert_eq!(seen.lock().unwrap().len(), 3);
    }
}
