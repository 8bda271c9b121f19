//! Error taxonomy shared by every facecard tool.
//!
//! Each module owns its own `thiserror` enum; all of them report one of these
//! kinds so the CLI can decide between "log and continue" and "log and exit".

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Camera cannot be opened or streamed.
    DeviceUnavailable,
    /// Zero faces found where a face is required.
    NoDetection,
    /// QR symbol absent, undecodable, or payload over capacity.
    CodecFailure,
    /// Decoded QR content is not a valid biometric payload.
    MalformedPayload,
    /// Bad user input at the CLI boundary.
    InputValidation,
    /// Detector or recognizer failure.
    Provider,
    /// Enrollment store could not be written or read.
    Storage,
    /// Filesystem or image decode failure.
    Io,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::DeviceUnavailable => "device unavailable",
            ErrorKind::NoDetection => "no detection",
            ErrorKind::CodecFailure => "codec failure",
            ErrorKind::MalformedPayload => "malformed payload",
            ErrorKind::InputValidation => "input validation",
            ErrorKind::Provider => "provider",
            ErrorKind::Storage => "storage",
            ErrorKind::Io => "io",
        };
        f.write_str(s)
    }
}
