use std::path::Path;

use crate::audio::SampleBuffer;
use crate::error::LoadError;

// Load a WAV from disk on the GUI thread, before any patch reaches the mixer
pub fn load(path: &Path, target_rate: u32) -> Result<SampleBuffer, LoadError> {
    let buffer = SampleBuffer::load_wav(path, target_rate)?;
    log::debug!("loaded {} ({} frames)", path.display(), buffer.len());
    Ok(buffer)
}
