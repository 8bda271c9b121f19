//! `facecard capture`: photograph one person into the dataset.

use crate::capture::{Command, Controls};
use crate::config::Config;
use crate::engine;
use crate::prompt::{self, InputError};
use anyhow::Result;

pub fn run(config: &Config, name: Option<String>) -> Result<()> {
    let name = match prompt::text(name, "Enter the name of the person", "name") {
        Ok(name) => name,
        Err(InputError::Empty(_)) => {
            tracing::info!("no name entered; exiting");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };
    if name.contains(['/', '\\']) || name == "." || name == ".." {
        return Err(InputError::InvalidName(name).into());
    }

    let folder = config.dataset_dir.join(&name);
    super::ensure_dir(&folder)?;

    let camera = engine::open_camera(config)?;
    let controls = Controls::spawn();
    let mut stream = camera.stream()?;
    let mut count = 0usize;

    tracing::info!(%name, "press ENTER to capture, 'q' then ENTER to quit");
    loop {
        let frame = stream.next_frame()?;
        match controls.poll() {
            Some(Command::Capture) => {
                let path = folder.join(format!("{name}_{}.jpg", super::timestamp("%Y%m%d_%H%M%S")));
                super::save_image(&frame.into_rgb_image()?, &path)?;
                count += 1;
                tracing::info!(count, path = %path.display(), "photo saved");
            }
            Some(Command::Quit) => break,
            None => {}
        }
    }

    tracing::info!(%name, count, "photo capture completed");
    Ok(())
}
