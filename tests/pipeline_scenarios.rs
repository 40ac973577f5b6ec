use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use image::Rgba;
use tempfile::TempDir;

use iris_pipeline::detect::{ScriptedClassifier, ScriptedLoader, StubLoader};
use iris_pipeline::frame::BYTES_PER_PIXEL;
use iris_pipeline::ingest::{SyntheticCamera, SyntheticCameraConfig};
use iris_pipeline::{
    BoundingBox, Detection, DetectionEngine, DetectorConfig, DetectorHandle, DetectorState,
    EyeClass, Frame, FrameDispatcher, FrameOutcome, ModelLoadError, Overlay, OverlayRenderer,
    Rotation, SubmitOutcome,
};

fn assets_with_model() -> TempDir {
    let dir = tempfile::tempdir().expect("temp assets dir");
    std::fs::write(dir.path().join("model1.onnx"), b"onnx-weights").expect("write model");
    dir
}

fn blank_frame(width: u32, height: u32, rotation: i32) -> Frame {
    Frame::new(
        vec![0u8; (width * height) as usize * BYTES_PER_PIXEL],
        width,
        height,
        rotation,
        false,
    )
}

fn scripted_dispatcher(
    assets: &TempDir,
    classifier: ScriptedClassifier,
) -> (DetectorHandle, FrameDispatcher) {
    let loader = ScriptedLoader::new(assets.path(), classifier);
    let handle = DetectorHandle::new();
    handle
        .initialize_bundled(&loader, "model1.onnx", DetectorConfig::default())
        .expect("initialize");
    let dispatcher = FrameDispatcher::new(
        DetectionEngine::new(handle.clone()),
        OverlayRenderer::new(0.5),
    );
    (handle, dispatcher)
}

#[test]
fn rotated_frame_draws_only_confident_detections() {
    let assets = assets_with_model();
    let confident = Detection::new(BoundingBox::new(10.0, 10.0, 50.0, 50.0), 0, 0.9);
    let faint = Detection::new(BoundingBox::new(5.0, 5.0, 15.0, 15.0), 3, 0.4);
    let (_handle, mut dispatcher) = scripted_dispatcher(
        &assets,
        ScriptedClassifier::new(vec![confident.clone(), faint.clone()]),
    );

    let (tx, rx) = mpsc::channel();
    dispatcher
        .subscription()
        .replace(move |detections: Vec<Detection>, overlay: Overlay, rotation: Rotation| {
            tx.send((detections, overlay, rotation)).unwrap();
        });

    assert_eq!(
        dispatcher.on_frame(blank_frame(640, 480, 90)),
        FrameOutcome::Published
    );
    let (detections, overlay, rotation) = rx.try_recv().expect("published frame");

    assert_eq!(rotation, Rotation::Deg90);
    assert_eq!((overlay.width(), overlay.height()), (480, 640));
    assert_eq!(detections, vec![confident, faint]);

    assert_eq!(overlay.annotations().len(), 1);
    assert_eq!(overlay.annotations()[0].class, EyeClass::OpenEye);
    let green = Rgba([0, 255, 0, 255]);
    assert_eq!(overlay.image().get_pixel(10, 10), &green);
    assert_eq!(overlay.image().get_pixel(50, 30), &green);
    assert_eq!(overlay.image().get_pixel(30, 30)[3], 0);
    assert_eq!(overlay.image().get_pixel(5, 5)[3], 0);
}

#[test]
fn missing_model_file_then_bundled_model() {
    let assets = assets_with_model();
    let loader = StubLoader::new(assets.path());
    let handle = DetectorHandle::new();

    let missing = assets.path().join("downloaded").join("variant.onnx");
    let err = handle
        .initialize_file(&loader, &missing, DetectorConfig::default())
        .unwrap_err();
    assert!(matches!(err, ModelLoadError::NotFound(ref p) if p == &missing));
    assert_eq!(handle.state(), DetectorState::Uninitialized);
    assert!(handle.guard_ready().is_err());

    let tier = handle
        .initialize_bundled(&loader, "model1.onnx", DetectorConfig::default())
        .expect("bundled model loads");
    assert!(handle.is_ready());
    assert!(matches!(
        handle.state(),
        DetectorState::Ready { acceleration, .. } if acceleration == tier
    ));
}

#[test]
fn frames_arriving_while_busy_are_dropped() {
    let assets = assets_with_model();
    let (release, gate) = mpsc::channel();
    let classifier = ScriptedClassifier::new(vec![Detection::new(
        BoundingBox::new(1.0, 1.0, 8.0, 8.0),
        1,
        0.8,
    )])
    .with_gate(gate);
    let (_handle, dispatcher) = scripted_dispatcher(&assets, classifier.clone());

    let callbacks = Arc::new(AtomicUsize::new(0));
    let seen = callbacks.clone();
    dispatcher
        .subscription()
        .replace(move |_: Vec<Detection>, _: Overlay, _: Rotation| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
    let handle = dispatcher.spawn().expect("spawn dispatcher");

    // The worker polls for frames; retry until it picks one up.
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        match handle.submit(blank_frame(16, 16, 0)) {
            SubmitOutcome::Accepted => break,
            SubmitOutcome::Dropped => {}
            SubmitOutcome::Closed => panic!("dispatcher closed"),
        }
        assert!(Instant::now() < deadline, "worker never accepted a frame");
        std::thread::sleep(Duration::from_millis(1));
    }
    while classifier.calls() == 0 {
        assert!(Instant::now() < deadline, "worker never started detection");
        std::thread::sleep(Duration::from_millis(1));
    }
    let dropped_before = handle.stats().dropped;

    assert_eq!(handle.submit(blank_frame(16, 16, 0)), SubmitOutcome::Dropped);
    assert_eq!(handle.submit(blank_frame(16, 16, 0)), SubmitOutcome::Dropped);

    release.send(()).unwrap();
    while handle.stats().published == 0 {
        assert!(Instant::now() < deadline, "frame never published");
        std::thread::sleep(Duration::from_millis(1));
    }
    let stats = handle.stop().expect("stop dispatcher");

    assert_eq!(stats.accepted, 1);
    assert_eq!(stats.dropped, dropped_before + 2);
    assert_eq!(stats.published, 1);
    assert_eq!(stats.skipped, 0);
    assert_eq!(classifier.calls(), 1);
    assert_eq!(callbacks.load(Ordering::SeqCst), 1);
}

#[test]
fn frames_before_initialization_are_skipped() {
    let assets = assets_with_model();
    let handle = DetectorHandle::new();
    let mut dispatcher = FrameDispatcher::new(
        DetectionEngine::new(handle.clone()),
        OverlayRenderer::default(),
    );
    let callbacks = Arc::new(AtomicUsize::new(0));
    let seen = callbacks.clone();
    dispatcher
        .subscription()
        .replace(move |_: Vec<Detection>, _: Overlay, _: Rotation| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

    assert_eq!(dispatcher.on_frame(blank_frame(8, 8, 0)), FrameOutcome::NotReady);
    assert_eq!(callbacks.load(Ordering::SeqCst), 0);

    handle
        .initialize_bundled(
            &StubLoader::new(assets.path()),
            "model1.onnx",
            DetectorConfig::default(),
        )
        .unwrap();
    assert_eq!(dispatcher.on_frame(blank_frame(8, 8, 0)), FrameOutcome::Published);
    assert_eq!(callbacks.load(Ordering::SeqCst), 1);
}

#[test]
fn synthetic_front_camera_reports_open_and_closed_eyes() {
    let assets = assets_with_model();
    let handle = DetectorHandle::new();
    handle
        .initialize_bundled(
            &StubLoader::new(assets.path()),
            "model1.onnx",
            DetectorConfig::default(),
        )
        .unwrap();
    let mut dispatcher = FrameDispatcher::new(
        DetectionEngine::new(handle),
        OverlayRenderer::default().with_stroke_width(1),
    );

    let mut camera = SyntheticCamera::new(
        SyntheticCameraConfig {
            width: 64,
            height: 48,
            rotation_degrees: 270,
            blink_every: 2,
            blink_frames: 1,
        },
        true,
    )
    .unwrap();

    let open = dispatcher.process(camera.next_frame()).unwrap();
    assert_eq!((open.overlay.width(), open.overlay.height()), (48, 64));
    let classes: Vec<EyeClass> = open.overlay.annotations().iter().map(|a| a.class).collect();
    assert_eq!(
        classes,
        vec![EyeClass::OpenEye, EyeClass::Pupil, EyeClass::OpenEye, EyeClass::Pupil]
    );
    // Left eye stays on the left after mirroring and rotation.
    assert!(open.detections[0].bbox.left < open.detections[2].bbox.left);

    let _ = dispatcher.process(camera.next_frame()).unwrap();
    let closed = dispatcher.process(camera.next_frame()).unwrap();
    assert!(camera.is_blink(2));
    let classes: Vec<EyeClass> = closed.overlay.annotations().iter().map(|a| a.class).collect();
    assert_eq!(classes, vec![EyeClass::ClosedEye, EyeClass::ClosedEye]);
}
