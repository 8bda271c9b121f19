use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

const CONFIG_FILE: &str = "facecard.toml";

/// Tool configuration: defaults, then an optional TOML file, then
/// `FACECARD_*` environment variables.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Path to the enrollment store.
    pub store_path: PathBuf,
    /// Root of the labeled dataset, one folder per identity.
    pub dataset_dir: PathBuf,
    /// Parent of every output directory.
    pub output_dir: PathBuf,
    /// Decimal places kept per embedding component in QR payloads.
    pub payload_precision: u32,
    /// Integer factor frames are shrunk by before live detection.
    pub live_downscale: u32,
    /// Frames discarded before a still capture (camera AE stabilization).
    pub warmup_frames: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            camera_device: "/dev/video0".to_string(),
            model_dir: PathBuf::from("models"),
            store_path: PathBuf::from("face_recognition.db"),
            dataset_dir: PathBuf::from("dataset"),
            output_dir: PathBuf::from("."),
            payload_precision: facecard_core::payload::DEFAULT_PRECISION,
            live_downscale: 1,
            warmup_frames: 4,
        }
    }
}

impl Config {
    /// Load from `FACECARD_CONFIG` (or `./facecard.toml` if present) and
    /// the environment.
    pub fn load() -> Result<Self> {
        let file = match std::env::var("FACECARD_CONFIG") {
            Ok(path) => Some(PathBuf::from(path)),
            Err(_) => Some(PathBuf::from(CONFIG_FILE)).filter(|p| p.exists()),
        };

        let mut config = match file {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config = toml::from_str(&text)
            .with_context(|| format!("parsing config {}", path.display()))?;
        tracing::debug!(path = %path.display(), "config file loaded");
        Ok(config)
    }

    /// Overlay `FACECARD_*` variables. Unparseable numbers keep the
    /// current value.
    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("FACECARD_CAMERA_DEVICE") {
            self.camera_device = v;
        }
        if let Some(v) = lookup("FACECARD_MODEL_DIR") {
            self.model_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("FACECARD_STORE_PATH") {
            self.store_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("FACECARD_DATASET_DIR") {
            self.dataset_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("FACECARD_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(v);
        }
        self.payload_precision = parsed(&lookup, "FACECARD_PAYLOAD_PRECISION", self.payload_precision);
        self.live_downscale = parsed(&lookup, "FACECARD_LIVE_DOWNSCALE", self.live_downscale).max(1);
        self.warmup_frames = parsed(&lookup, "FACECARD_WARMUP_FRAMES", self.warmup_frames);
    }

    /// Path to the SCRFD detection model.
    pub fn detector_model_path(&self) -> PathBuf {
        self.model_dir.join("det_10g.onnx")
    }

    /// Path to the ArcFace recognition model.
    pub fn recognizer_model_path(&self) -> PathBuf {
        self.model_dir.join("w600k_r50.onnx")
    }

    pub fn processed_dir(&self) -> PathBuf {
        self.output_dir.join("model_processed_images")
    }

    pub fn compared_dir(&self) -> PathBuf {
        self.output_dir.join("compared_images")
    }

    pub fn qr_codes_dir(&self) -> PathBuf {
        self.output_dir.join("biometric_qr_codes")
    }

    pub fn validation_results_dir(&self) -> PathBuf {
        self.output_dir.join("qr_code_validation_results")
    }

    pub fn temp_validation_dir(&self) -> PathBuf {
        self.output_dir.join("temp_validation")
    }
}

fn parsed<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, current: T) -> T {
    lookup(key).and_then(|v| v.parse().ok()).unwrap_or(current)
}
