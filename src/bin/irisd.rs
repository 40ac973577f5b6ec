//! irisd - eye/pupil overlay daemon
//!
//! This daemon:
//! 1. Loads configuration (file + environment)
//! 2. Resolves the model source (delivered variant or bundled asset)
//! 3. Initializes the detector on a background thread, walking the
//!    acceleration ladder and falling back to the bundled model
//! 4. Feeds synthetic camera frames to the frame dispatcher at the target rate
//! 5. Logs results and dispatcher health; optionally writes the last overlay

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use image::{ImageFormat, RgbaImage};
use serde::Serialize;

use iris_pipeline::ingest::{SyntheticCamera, SyntheticCameraConfig};
use iris_pipeline::model_source::{resolve_model_source, DirectoryDelivery};
use iris_pipeline::orientation::Rotation;
use iris_pipeline::trace::{LogTraceSink, SampledTrace};
use iris_pipeline::{
    Detection, DetectionEngine, DetectorConfig, DetectorHandle, FrameDispatcher, IrisConfig,
    ModelLoader, ModelSource, Overlay, OverlayRenderer,
};

const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Stop after this many camera frames (runs until Ctrl-C when omitted).
    #[arg(long)]
    frames: Option<u64>,
    /// Camera frame rate; overrides the configured value.
    #[arg(long)]
    fps: Option<u32>,
    /// Start with the front-facing (mirrored) lens selected.
    #[arg(long)]
    front_facing: bool,
    /// Write the last published overlay to this PNG file on exit.
    #[arg(long, value_name = "PNG")]
    dump_overlay: Option<PathBuf>,
    /// Print one JSON line per published frame to stdout.
    #[arg(long)]
    emit_json: bool,
}

#[derive(Serialize)]
struct FrameRecord<'a> {
    rotation_degrees: i32,
    overlay_width: u32,
    overlay_height: u32,
    detections: &'a [Detection],
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let cfg = IrisConfig::load()?;
    let fps = args.fps.unwrap_or(cfg.camera.fps);
    if fps == 0 {
        return Err(anyhow!("fps must be >= 1"));
    }
    let rotation = Rotation::try_from(cfg.camera.rotation_degrees)?;
    let (upright_width, upright_height) =
        rotation.oriented_dims(cfg.camera.width, cfg.camera.height);

    let detector_config = cfg.detector_config();
    let handle = DetectorHandle::new();
    let trace = SampledTrace::new(
        "detect",
        cfg.detector.trace_interval,
        Box::new(LogTraceSink),
    );
    let engine = DetectionEngine::new(handle.clone()).with_trace(trace);
    let renderer = OverlayRenderer::new(detector_config.score_threshold)
        .with_stroke_width(cfg.stroke_width);
    let dispatcher = FrameDispatcher::new(engine, renderer);

    let last_overlay: Arc<Mutex<Option<RgbaImage>>> = Arc::new(Mutex::new(None));
    let keep_overlay = args.dump_overlay.is_some();
    let emit_json = args.emit_json;
    let overlay_slot = last_overlay.clone();
    dispatcher
        .subscription()
        .replace(move |detections: Vec<Detection>, overlay: Overlay, rotation: Rotation| {
            if emit_json {
                let record = FrameRecord {
                    rotation_degrees: rotation.degrees(),
                    overlay_width: overlay.width(),
                    overlay_height: overlay.height(),
                    detections: &detections,
                };
                match serde_json::to_string(&record) {
                    Ok(line) => println!("{}", line),
                    Err(e) => log::warn!("failed to encode frame record: {}", e),
                }
            }
            if keep_overlay {
                if let Ok(mut slot) = overlay_slot.lock() {
                    *slot = Some(overlay.into_image());
                }
            }
        });

    let dispatcher = dispatcher.spawn()?;

    let loader = make_loader(&cfg, upright_width, upright_height);
    let delivery = DirectoryDelivery::new(&cfg.cloud_cache_dir);
    let source = resolve_model_source(&cfg.preferences, &delivery, &cfg.detector.model_name);
    let init = spawn_initializer(
        handle.clone(),
        loader,
        source,
        cfg.detector.model_name.clone(),
        detector_config,
    )?;

    let running = Arc::new(AtomicBool::new(true));
    let flag = running.clone();
    ctrlc::set_handler(move || {
        flag.store(false, Ordering::SeqCst);
    })
    .context("error setting Ctrl-C handler")?;

    let mut camera = SyntheticCamera::new(
        SyntheticCameraConfig {
            width: cfg.camera.width,
            height: cfg.camera.height,
            rotation_degrees: cfg.camera.rotation_degrees,
            ..SyntheticCameraConfig::default()
        },
        args.front_facing || cfg.camera.front_facing,
    )?;

    log::info!(
        "irisd running: {}x{} @ {} fps, rotation={}, threshold={:.2}",
        cfg.camera.width,
        cfg.camera.height,
        fps,
        rotation.degrees(),
        detector_config.score_threshold
    );

    let frame_interval = Duration::from_secs(1) / fps;
    let mut last_health_log = Instant::now();
    let mut next_tick = Instant::now();
    let mut frames_sent = 0u64;

    while running.load(Ordering::SeqCst) {
        if args.frames.is_some_and(|limit| frames_sent >= limit) {
            break;
        }
        dispatcher.submit(camera.next_frame());
        frames_sent += 1;

        if last_health_log.elapsed() >= HEALTH_LOG_INTERVAL {
            let stats = dispatcher.stats();
            log::info!(
                "dispatcher: detector={:?} accepted={} dropped={} published={} skipped={}",
                handle.state(),
                stats.accepted,
                stats.dropped,
                stats.published,
                stats.skipped
            );
            last_health_log = Instant::now();
        }

        next_tick += frame_interval;
        let now = Instant::now();
        if next_tick > now {
            std::thread::sleep(next_tick - now);
        } else {
            next_tick = now;
        }
    }

    log::info!("shutting down after {} frames", frames_sent);
    if init.join().is_err() {
        log::error!("detector initialization thread panicked");
    }
    if let Some(summary) = dispatcher.last_published() {
        log::info!(
            "last published frame #{}: {} detections",
            summary.sequence,
            summary.detections.len()
        );
    }
    let stats = dispatcher.stop()?;
    log::info!(
        "final stats: accepted={} dropped={} published={} skipped={} camera_frames={} blinks={}",
        stats.accepted,
        stats.dropped,
        stats.published,
        stats.skipped,
        camera.stats().frames_captured,
        camera.stats().blink_frames
    );

    if let Some(path) = args.dump_overlay {
        let overlay = last_overlay
            .lock()
            .map_err(|_| anyhow!("overlay slot poisoned"))?
            .take();
        match overlay {
            Some(image) => {
                image
                    .save_with_format(&path, ImageFormat::Png)
                    .with_context(|| format!("write overlay to {}", path.display()))?;
                log::info!("overlay written to {}", path.display());
            }
            None => log::warn!("no overlay published; {} not written", path.display()),
        }
    }

    Ok(())
}

#[cfg(feature = "backend-tract")]
fn make_loader(cfg: &IrisConfig, width: u32, height: u32) -> Box<dyn ModelLoader> {
    Box::new(iris_pipeline::detect::backends::TractLoader::new(
        &cfg.detector.assets_dir,
        width,
        height,
    ))
}

#[cfg(not(feature = "backend-tract"))]
fn make_loader(cfg: &IrisConfig, _width: u32, _height: u32) -> Box<dyn ModelLoader> {
    Box::new(iris_pipeline::detect::StubLoader::new(
        &cfg.detector.assets_dir,
    ))
}

/// Initialize off the camera lane. A delivered model that fails to load is
/// replaced by the bundled one.
fn spawn_initializer(
    handle: DetectorHandle,
    loader: Box<dyn ModelLoader>,
    source: ModelSource,
    bundled_name: String,
    config: DetectorConfig,
) -> Result<JoinHandle<()>> {
    let join = std::thread::Builder::new()
        .name("iris-init".to_string())
        .spawn(move || {
            let result = handle.initialize(loader.as_ref(), &source, config);
            match (result, &source) {
                (Ok(_), _) => {}
                (Err(e), ModelSource::File(_)) => {
                    log::warn!("delivered model failed ({}), falling back to bundled", e);
                    let fallback =
                        handle.initialize_bundled(loader.as_ref(), &bundled_name, config);
                    if let Err(e) = fallback {
                        log::error!("bundled model failed too: {}", e);
                    }
                }
                (Err(_), ModelSource::Bundled(_)) => {
                    log::error!("detector unavailable; frames will be skipped");
                }
            }
        })?;
    Ok(join)
}
