use crate::config::Config;
use facecard_core::{ErrorKind, OnnxProvider, ProviderError};
use facecard_hw::{Camera, CameraError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("camera error: {0}")]
    Camera(#[from] CameraError),
    #[error("model loading failed: {0}")]
    Provider(#[from] ProviderError),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Camera(_) => ErrorKind::DeviceUnavailable,
            EngineError::Provider(e) => e.kind(),
        }
    }
}

/// Open the configured camera and discard warmup frames for AGC/AE
/// stabilization. Fails fast if the device cannot stream.
pub fn open_camera(config: &Config) -> Result<Camera, EngineError> {
    let camera = Camera::open(&config.camera_device)?;
    tracing::info!(
        device = %config.camera_device,
        width = camera.width,
        height = camera.height,
        "camera opened"
    );

    if config.warmup_frames > 0 {
        tracing::info!(count = config.warmup_frames, "discarding warmup frames");
        let mut stream = camera.stream()?;
        for _ in 0..config.warmup_frames {
            if let Err(e) = stream.next_frame() {
                tracing::warn!(error = %e, "warmup frame capture failed");
            }
        }
    }

    Ok(camera)
}

/// Load the SCRFD detector and ArcFace recognizer.
pub fn load_provider(config: &Config) -> Result<OnnxProvider, EngineError> {
    let detector = config.detector_model_path();
    let recognizer = config.recognizer_model_path();
    let provider = OnnxProvider::load(&detector, &recognizer)?;
    tracing::info!(
        detector = %detector.display(),
        recognizer = %recognizer.display(),
        "face models loaded"
    );
    Ok(provider)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camera_failures_are_device_unavailable() {
        for err in [
            CameraError::DeviceBusy,
            CameraError::DeviceNotFound("/dev/video9".into()),
            CameraError::StreamingNotSupported,
        ] {
            assert_eq!(EngineError::from(err).kind(), ErrorKind::DeviceUnavailable);
        }
    }
}
