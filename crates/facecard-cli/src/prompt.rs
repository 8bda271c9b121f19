//! Interactive fallbacks for arguments not given on the command line.

use dialoguer::{Input, Select};
use facecard_core::ErrorKind;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum InputError {
    #[error("invalid threshold {0:?}: expected a non-negative number")]
    InvalidThreshold(String),
    #[error("no {0} entered")]
    Empty(&'static str),
    #[error("invalid name {0:?}: must be a single folder name")]
    InvalidName(String),
    #[error("file not found: {0}")]
    FileNotFound(PathBuf),
    #[error("prompt failed: {0}")]
    Prompt(#[from] dialoguer::Error),
}

impl InputError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::InputValidation
    }
}

/// Where a probe image comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSource {
    Capture,
    File,
}

/// Parse a match tolerance. There is no default; blank input is an error.
pub fn parse_threshold(text: &str) -> Result<f32, InputError> {
    let trimmed = text.trim();
    trimmed
        .parse::<f32>()
        .ok()
        .and_then(checked_threshold)
        .ok_or_else(|| InputError::InvalidThreshold(trimmed.to_string()))
}

fn checked_threshold(t: f32) -> Option<f32> {
    (t.is_finite() && t >= 0.0).then_some(t)
}

/// `given`, or ask for it.
pub fn threshold(given: Option<f32>) -> Result<f32, InputError> {
    if let Some(t) = given {
        return checked_threshold(t).ok_or_else(|| InputError::InvalidThreshold(t.to_string()));
    }
    let text: String = Input::new()
        .with_prompt(format!(
            "Enter the threshold for face recognition (e.g., {:.1})",
            facecard_core::recognizer::ARCFACE_TOLERANCE
        ))
        .allow_empty(true)
        .interact_text()?;
    parse_threshold(&text)
}

/// Non-empty trimmed text, prompting when `given` is absent.
pub fn text(given: Option<String>, prompt: &str, what: &'static str) -> Result<String, InputError> {
    let raw = match given {
        Some(v) => v,
        None => Input::new()
            .with_prompt(prompt)
            .allow_empty(true)
            .interact_text()?,
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(InputError::Empty(what));
    }
    Ok(trimmed.to_string())
}

pub fn path(given: Option<PathBuf>, prompt: &str, what: &'static str) -> Result<PathBuf, InputError> {
    match given {
        Some(p) => Ok(p),
        None => text(None, prompt, what).map(PathBuf::from),
    }
}

/// Pick between a fresh camera capture and an existing file.
pub fn image_source() -> Result<ImageSource, InputError> {
    let choice = Select::new()
        .with_prompt("Image source")
        .items(&["Capture a new image", "Use an existing image"])
        .default(0)
        .interact()?;
    Ok(if choice == 0 {
        ImageSource::Capture
    } else {
        ImageSource::File
    })
}
