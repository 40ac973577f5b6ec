use std::sync::Mutex;

use tempfile::NamedTempFile;

use iris_pipeline::config::IrisConfig;
use iris_pipeline::Acceleration;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "IRIS_CONFIG",
        "IRIS_ASSETS_DIR",
        "IRIS_MODEL_NAME",
        "IRIS_FORCE_LOCAL_MODEL",
        "IRIS_CLOUD_MODEL",
        "IRIS_CLOUD_CACHE_DIR",
        "IRIS_SCORE_THRESHOLD",
        "IRIS_MAX_RESULTS",
        "IRIS_ACCELERATION",
    ] {
        std::env::remove_var(key);
    }
}

fn write_config(toml: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut file, toml.as_bytes()).expect("write config");
    file
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    clear_env();

    let file = write_config(
        r#"
        [detector]
        score_threshold = 0.6
        max_results = 6
        acceleration = "gpu"
        model_name = "eyes_v2.onnx"
        assets_dir = "/opt/iris/assets"

        [preferences]
        force_local_model = true
        cloud_model = "eyes_large"

        [camera]
        width = 1280
        height = 720
        fps = 15
        rotation_degrees = 270
        front_facing = true

        [overlay]
        stroke_width = 3
        "#,
    );

    std::env::set_var("IRIS_CONFIG", file.path());
    std::env::set_var("IRIS_SCORE_THRESHOLD", "0.7");
    std::env::set_var("IRIS_ACCELERATION", "cpu");
    std::env::set_var("IRIS_FORCE_LOCAL_MODEL", "false");

    let cfg = IrisConfig::load().expect("load config");

    assert_eq!(cfg.detector.score_threshold, 0.7);
    assert_eq!(cfg.detector.max_results, 6);
    assert_eq!(cfg.detector.acceleration, Acceleration::Cpu);
    assert_eq!(cfg.detector.model_name, "eyes_v2.onnx");
    assert_eq!(cfg.detector.assets_dir.to_str(), Some("/opt/iris/assets"));
    assert!(!cfg.preferences.force_local_model);
    assert_eq!(cfg.preferences.cloud_model.as_deref(), Some("eyes_large"));
    assert_eq!((cfg.camera.width, cfg.camera.height), (1280, 720));
    assert_eq!(cfg.camera.fps, 15);
    assert_eq!(cfg.camera.rotation_degrees, 270);
    assert!(cfg.camera.front_facing);
    assert_eq!(cfg.stroke_width, 3);

    let detector = cfg.detector_config();
    assert_eq!(detector.score_threshold, 0.7);
    assert_eq!(detector.max_results, 6);

    clear_env();
}

#[test]
fn defaults_apply_without_a_config_file() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    clear_env();

    let cfg = IrisConfig::load().expect("load defaults");
    assert_eq!(cfg.detector.score_threshold, 0.5);
    assert_eq!(cfg.detector.max_results, 4);
    assert_eq!(cfg.detector.acceleration, Acceleration::Nnapi);
    assert_eq!(cfg.detector.model_name, "model1.onnx");
    assert_eq!((cfg.camera.width, cfg.camera.height), (640, 480));
    assert_eq!(cfg.camera.rotation_degrees, 90);
    assert_eq!(cfg.stroke_width, 5);
}

#[test]
fn rejects_invalid_values() {
    let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    clear_env();

    let file = write_config("[camera]\nrotation_degrees = 45\n");
    std::env::set_var("IRIS_CONFIG", file.path());
    assert!(IrisConfig::load().is_err());
    clear_env();

    let file = write_config("[detector]\nunknown_key = 1\n");
    std::env::set_var("IRIS_CONFIG", file.path());
    assert!(IrisConfig::load().is_err());
    clear_env();

    std::env::set_var("IRIS_SCORE_THRESHOLD", "1.5");
    assert!(IrisConfig::load().is_err());
    clear_env();

    std::env::set_var("IRIS_ACCELERATION", "tpu");
    assert!(IrisConfig::load().is_err());
    clear_env();
}
