//! Frame loops driven by terminal commands.
//!
//! A helper thread reads stdin lines and forwards them over a channel; the
//! frame loop polls it once per frame, so quit is noticed on the next frame.

use anyhow::{Context, Result};
use facecard_hw::Camera;
use image::RgbImage;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, TryRecvError};

/// Command typed by the user while frames stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Capture,
    Quit,
}

/// Empty line captures; `q`/`quit` quits; anything else is ignored.
pub fn parse_command(line: &str) -> Option<Command> {
    match line.trim().to_ascii_lowercase().as_str() {
        "" | "c" => Some(Command::Capture),
        "q" | "quit" => Some(Command::Quit),
        _ => None,
    }
}

/// Per-frame view of the command channel.
pub struct Controls {
    rx: Receiver<Command>,
}

impl Controls {
    /// Start the stdin reader thread. End of input counts as quit.
    pub fn spawn() -> Self {
        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                if let Some(cmd) = parse_command(&line) {
                    if tx.send(cmd).is_err() {
                        return;
                    }
                }
            }
            let _ = tx.send(Command::Quit);
        });
        Self { rx }
    }

    pub fn from_receiver(rx: Receiver<Command>) -> Self {
        Self { rx }
    }

    /// Pending command, if any. A closed channel reads as quit.
    pub fn poll(&self) -> Option<Command> {
        match self.rx.try_recv() {
            Ok(cmd) => Some(cmd),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Command::Quit),
        }
    }
}

/// Stream frames until the user captures one (`Some`) or quits (`None`).
pub fn capture_one(camera: &Camera, controls: &Controls) -> Result<Option<RgbImage>> {
    tracing::info!("press ENTER to capture a photo, 'q' then ENTER to quit");
    let mut stream = camera.stream()?;
    loop {
        let frame = stream.next_frame()?;
        match controls.poll() {
            Some(Command::Capture) => return Ok(Some(frame.into_rgb_image()?)),
            Some(Command::Quit) => return Ok(None),
            None => {}
        }
    }
}

/// Capture one photo and save it as `<dir>/captured_<ts>.jpg`.
pub fn capture_to(camera: &Camera, controls: &Controls, dir: &Path) -> Result<Option<PathBuf>> {
    let Some(image) = capture_one(camera, controls)? else {
        return Ok(None);
    };
    std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    let ts = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let path = dir.join(format!("captured_{ts}.jpg"));
    image
        .save(&path)
        .with_context(|| format!("saving {}", path.display()))?;
    tracing::info!(path = %path.display(), "photo saved");
    Ok(Some(path))
}
