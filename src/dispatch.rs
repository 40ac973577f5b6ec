//! Frame dispatcher: the per-frame pipeline and the worker that runs it.
//!
//! Each frame goes through
//! copy -> mirror -> normalize -> readiness guard -> detect -> render -> publish.
//!
//! `FrameDispatcher` runs that sequence synchronously. `FrameDispatcher::spawn`
//! moves it onto a single background worker and returns a `DispatcherHandle`.
//! Submission is a rendezvous: a frame is accepted only if the worker is idle
//! and waiting, otherwise it is dropped on the spot. Nothing is queued, so at
//! most one frame is ever in flight.
//!
//! Per-frame failures never reach the subscriber. `NotInitialized` is the
//! expected state while the model loads and is skipped quietly; the other
//! failures are logged and the frame is skipped.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{anyhow, Result};
use serde::Serialize;

use crate::detect::{Detection, DetectionEngine};
use crate::error::PipelineError;
use crate::frame::{mirror_horizontally, Frame, FrameBuffer};
use crate::orientation::{normalize, Rotation};
use crate::overlay::{Overlay, OverlayRenderer};

/// How often an idle worker re-checks the shutdown flag.
const WORKER_POLL: Duration = Duration::from_millis(50);

// ----------------------------------------------------------------------------
// Subscriber
// ----------------------------------------------------------------------------

/// Receives the result of every successfully processed frame.
///
/// Called from the background worker, never from the caller's thread.
pub trait Subscriber: Send {
    fn on_frame_processed(
        &mut self,
        detections: Vec<Detection>,
        overlay: Overlay,
        rotation: Rotation,
    );
}

impl<F> Subscriber for F
where
    F: FnMut(Vec<Detection>, Overlay, Rotation) + Send,
{
    fn on_frame_processed(
        &mut self,
        detections: Vec<Detection>,
        overlay: Overlay,
        rotation: Rotation,
    ) {
        self(detections, overlay, rotation)
    }
}

type SharedSubscriber = Arc<Mutex<Box<dyn Subscriber>>>;

/// Handle to the dispatcher's single subscriber slot.
///
/// `replace` swaps the active subscriber; there is never more than one. The
/// slot lock is not held while a subscriber runs, so a subscriber may replace
/// or clear itself from inside its callback.
#[derive(Clone, Default)]
pub struct Subscription {
    slot: Arc<Mutex<Option<SharedSubscriber>>>,
}

impl Subscription {
    fn lock(&self) -> MutexGuard<'_, Option<SharedSubscriber>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Install `subscriber`. Returns true if it replaced an active one.
    pub fn replace<S: Subscriber + 'static>(&self, subscriber: S) -> bool {
        let boxed: Box<dyn Subscriber> = Box::new(subscriber);
        self.lock().replace(Arc::new(Mutex::new(boxed))).is_some()
    }

    /// Remove the active subscriber. Returns true if there was one.
    pub fn clear(&self) -> bool {
        self.lock().take().is_some()
    }

    pub fn is_active(&self) -> bool {
        self.lock().is_some()
    }

    fn publish(&self, detections: Vec<Detection>, overlay: Overlay, rotation: Rotation) -> bool {
        let Some(subscriber) = self.lock().clone() else {
            return false;
        };
        subscriber
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .on_frame_processed(detections, overlay, rotation);
        true
    }
}

// ----------------------------------------------------------------------------
// FrameDispatcher
// ----------------------------------------------------------------------------

/// Result of one pipeline pass, before publishing.
pub struct ProcessedFrame {
    pub detections: Vec<Detection>,
    pub overlay: Overlay,
    pub rotation: Rotation,
}

/// What happened to a frame handed to `FrameDispatcher::on_frame`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    Published,
    /// Processed, but no subscriber was registered.
    Unobserved,
    /// Detector not ready yet.
    NotReady,
    /// Frame rejected or inference failed.
    Failed,
}

/// Diagnostics copy of the most recent published result (no overlay).
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FrameSummary {
    pub sequence: u64,
    pub rotation_degrees: i32,
    pub detections: Vec<Detection>,
}

pub struct FrameDispatcher {
    buffer: FrameBuffer,
    engine: DetectionEngine,
    renderer: OverlayRenderer,
    subscription: Subscription,
    last: Arc<Mutex<Option<FrameSummary>>>,
    sequence: u64,
    waiting_for_detector: bool,
}

impl FrameDispatcher {
    pub fn new(engine: DetectionEngine, renderer: OverlayRenderer) -> Self {
        Self {
            buffer: FrameBuffer::new(),
            engine,
            renderer,
            subscription: Subscription::default(),
            last: Arc::new(Mutex::new(None)),
            sequence: 0,
            waiting_for_detector: false,
        }
    }

    pub fn subscription(&self) -> Subscription {
        self.subscription.clone()
    }

    pub fn last_published(&self) -> Option<FrameSummary> {
        self.last
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Run one frame through the pipeline without publishing it.
    ///
    /// The mirror decision comes from the frame itself, fixed when the camera
    /// handed it over.
    pub fn process(&mut self, frame: Frame) -> Result<ProcessedFrame, PipelineError> {
        let buffer = self.buffer.copy_from(&frame)?;
        if frame.is_mirrored() {
            mirror_horizontally(buffer);
        }
        let view = normalize(buffer, frame.rotation_degrees())?;
        self.engine.handle().guard_ready()?;
        let detections = self.engine.detect(&view)?;
        let rotation = view.rotation();
        let overlay = self
            .renderer
            .render(&detections, frame.width(), frame.height(), rotation);
        Ok(ProcessedFrame {
            detections,
            overlay,
            rotation,
        })
    }

    /// Process a frame and publish the result to the subscriber.
    pub fn on_frame(&mut self, frame: Frame) -> FrameOutcome {
        match self.process(frame) {
            Ok(processed) => {
                if self.waiting_for_detector {
                    log::info!("detector ready, publishing overlays");
                    self.waiting_for_detector = false;
                }
                self.sequence += 1;
                self.record(&processed);
                let ProcessedFrame {
                    detections,
                    overlay,
                    rotation,
                } = processed;
                if self.subscription.publish(detections, overlay, rotation) {
                    FrameOutcome::Published
                } else {
                    FrameOutcome::Unobserved
                }
            }
            Err(PipelineError::NotInitialized) => {
                if !self.waiting_for_detector {
                    log::debug!("detector not initialized yet, skipping frames");
                    self.waiting_for_detector = true;
                }
                FrameOutcome::NotReady
            }
            Err(e) => {
                log::warn!("frame skipped: {}", e);
                FrameOutcome::Failed
            }
        }
    }

    fn record(&self, processed: &ProcessedFrame) {
        let summary = FrameSummary {
            sequence: self.sequence,
            rotation_degrees: processed.rotation.degrees(),
            detections: processed.detections.clone(),
        };
        *self.last.lock().unwrap_or_else(PoisonError::into_inner) = Some(summary);
    }

    /// Move the dispatcher onto its background worker.
    pub fn spawn(self) -> Result<DispatcherHandle> {
        let (sender, receiver) = mpsc::sync_channel(0);
        let shared = Arc::new(Shared::default());
        let subscription = self.subscription.clone();
        let last = self.last.clone();
        let worker_shared = shared.clone();
        let join = std::thread::Builder::new()
            .name("iris-dispatch".to_string())
            .spawn(move || run_worker(self, receiver, worker_shared))?;
        log::info!("frame dispatcher started");
        Ok(DispatcherHandle {
            sink: FrameSink { sender, shared },
            subscription,
            last,
            join: Some(join),
        })
    }
}

fn run_worker(mut dispatcher: FrameDispatcher, receiver: Receiver<Frame>, shared: Arc<Shared>) {
    loop {
        if shared.closed.load(Ordering::SeqCst) {
            break;
        }
        match receiver.recv_timeout(WORKER_POLL) {
            Ok(frame) => {
                let counter = match dispatcher.on_frame(frame) {
                    FrameOutcome::Published => &shared.published,
                    FrameOutcome::Unobserved => &shared.unobserved,
                    FrameOutcome::NotReady | FrameOutcome::Failed => &shared.skipped,
                };
                counter.fetch_add(1, Ordering::SeqCst);
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    log::info!("frame dispatcher stopped");
}

// ----------------------------------------------------------------------------
// DispatcherHandle / FrameSink
// ----------------------------------------------------------------------------

#[derive(Default)]
struct Shared {
    closed: AtomicBool,
    accepted: AtomicU64,
    dropped: AtomicU64,
    published: AtomicU64,
    unobserved: AtomicU64,
    skipped: AtomicU64,
}

/// Counter snapshot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DispatchStats {
    /// Frames handed to the worker.
    pub accepted: u64,
    /// Frames discarded because the worker was busy.
    pub dropped: u64,
    pub published: u64,
    /// Processed with no subscriber registered.
    pub unobserved: u64,
    /// Frames that failed or arrived before the detector was ready.
    pub skipped: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubmitOutcome {
    Accepted,
    /// Worker busy; the frame was discarded.
    Dropped,
    /// Dispatcher shut down.
    Closed,
}

/// Cloneable entry point for the camera lane.
#[derive(Clone)]
pub struct FrameSink {
    sender: SyncSender<Frame>,
    shared: Arc<Shared>,
}

impl FrameSink {
    /// Hand a frame to the worker if it is idle; drop it otherwise.
    pub fn submit(&self, frame: Frame) -> SubmitOutcome {
        if self.shared.closed.load(Ordering::SeqCst) {
            return SubmitOutcome::Closed;
        }
        match self.sender.try_send(frame) {
            Ok(()) => {
                self.shared.accepted.fetch_add(1, Ordering::SeqCst);
                SubmitOutcome::Accepted
            }
            Err(TrySendError::Full(_)) => {
                self.shared.dropped.fetch_add(1, Ordering::SeqCst);
                SubmitOutcome::Dropped
            }
            Err(TrySendError::Disconnected(_)) => SubmitOutcome::Closed,
        }
    }

    pub fn stats(&self) -> DispatchStats {
        let s = &self.shared;
        DispatchStats {
            accepted: s.accepted.load(Ordering::SeqCst),
            dropped: s.dropped.load(Ordering::SeqCst),
            published: s.published.load(Ordering::SeqCst),
            unobserved: s.unobserved.load(Ordering::SeqCst),
            skipped: s.skipped.load(Ordering::SeqCst),
        }
    }
}

/// Owner of the running worker.
pub struct DispatcherHandle {
    sink: FrameSink,
    subscription: Subscription,
    last: Arc<Mutex<Option<FrameSummary>>>,
    join: Option<JoinHandle<()>>,
}

impl DispatcherHandle {
    pub fn submit(&self, frame: Frame) -> SubmitOutcome {
        self.sink.submit(frame)
    }

    pub fn sink(&self) -> FrameSink {
        self.sink.clone()
    }

    pub fn subscription(&self) -> Subscription {
        self.subscription.clone()
    }

    pub fn stats(&self) -> DispatchStats {
        self.sink.stats()
    }

    pub fn last_published(&self) -> Option<FrameSummary> {
        self.last
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Stop accepting frames and wait for the in-flight frame to finish.
    pub fn stop(mut self) -> Result<DispatchStats> {
        self.shutdown()?;
        Ok(self.stats())
    }

    fn shutdown(&mut self) -> Result<()> {
        self.sink.shared.closed.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("frame dispatcher thread panicked"))?;
        }
        Ok(())
    }
}

impl Drop for DispatcherHandle {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            log::error!("{}", e);
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
