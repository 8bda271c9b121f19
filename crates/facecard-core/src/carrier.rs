//! QR carrier: biometric payload JSON as literal QR content.
//!
//! At the default payload precision a single 512-dim face is about 1.8 KB,
//! inside the 2953-byte limit of a level-L symbol.
//!
//! No compression and no encryption; the embedding values are plaintext in
//! the symbol. Payloads beyond QR capacity fail at encode time.

use crate::error::ErrorKind;
use crate::payload::{BiometricPayload, PayloadError};
use image::{GrayImage, Luma};
use qrcode::types::QrError;
use qrcode::{Color, EcLevel, QrCode};
use thiserror::Error;

/// Pixels per QR module in the rendered image.
pub const MODULE_PIXELS: u32 = 10;
/// Quiet-zone width, in modules.
pub const QUIET_ZONE: u32 = 4;

#[derive(Error, Debug)]
pub enum CarrierError {
    #[error("payload of {bytes} bytes exceeds QR capacity")]
    CapacityExceeded { bytes: usize },
    #[error("QR encoding failed: {0}")]
    Encode(String),
    #[error("no QR code found in the image")]
    NoSymbol,
    #[error("payload: {0}")]
    Payload(#[from] PayloadError),
}

impl CarrierError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CarrierError::Payload(e) => e.kind(),
            _ => ErrorKind::CodecFailure,
        }
    }
}

/// Encode raw text as a black-on-white QR image (error correction level L).
pub fn encode_text(text: &str) -> Result<GrayImage, CarrierError> {
    let code = QrCode::with_error_correction_level(text.as_bytes(), EcLevel::L).map_err(|e| match e {
        QrError::DataTooLong => CarrierError::CapacityExceeded { bytes: text.len() },
        other => CarrierError::Encode(other.to_string()),
    })?;

    let modules = code.width() as u32;
    let colors = code.to_colors();
    let side = (modules + 2 * QUIET_ZONE) * MODULE_PIXELS;

    let img = GrayImage::from_fn(side, side, |x, y| {
        let mx = (x / MODULE_PIXELS).checked_sub(QUIET_ZONE);
        let my = (y / MODULE_PIXELS).checked_sub(QUIET_ZONE);
        let dark = match (mx, my) {
            (Some(mx), Some(my)) if mx < modules && my < modules => {
                colors[(my * modules + mx) as usize] == Color::Dark
            }
            _ => false,
        };
        Luma([if dark { 0 } else { 255 }])
    });

    tracing::debug!(bytes = text.len(), modules, side, "QR symbol rendered");
    Ok(img)
}

/// Encode a payload's compact JSON.
pub fn encode(payload: &BiometricPayload) -> Result<GrayImage, CarrierError> {
    encode_text(&payload.to_json()?)
}

/// Text of the first decodable QR symbol in the image.
pub fn decode_text(image: &GrayImage) -> Result<String, CarrierError> {
    let mut prepared = rqrr::PreparedImage::prepare_from_greyscale(
        image.width() as usize,
        image.height() as usize,
        |x, y| image.get_pixel(x as u32, y as u32)[0],
    );

    let grids = prepared.detect_grids();
    tracing::debug!(candidates = grids.len(), "QR grids detected");

    for grid in grids {
        match grid.decode() {
            Ok((_, content)) => return Ok(content),
            Err(e) => tracing::debug!(error = ?e, "QR grid failed to decode"),
        }
    }
    Err(CarrierError::NoSymbol)
}

/// Decode and parse a biometric payload from a QR image.
pub fn decode(image: &GrayImage) -> Result<BiometricPayload, CarrierError> {
    let text = decode_text(image)?;
    Ok(BiometricPayload::from_json(&text)?)
}
