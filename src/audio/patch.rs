use std::path::Path;

use super::process::{Process, ProcessDef};
use super::sound::{Sound, SoundDef};
use crate::error::LoadError;

/// One or more sounds played together through one or more processes.
/// Owned by a track; voices hold a shared reference while they sound.
#[derive(Debug)]
pub struct Patch {
    sounds: Vec<Sound>,
    processes: Vec<Process>,
}

impl Patch {
    pub fn new(sounds: Vec<Sound>, processes: Vec<Process>) -> Result<Self, LoadError> {
        if sounds.is_empty() || processes.is_empty() {
            return Err(LoadError::EmptyPatch);
        }
        Ok(Self { sounds, processes })
    }

    // the one-sound, one-process case can't fail validation
    pub fn single(sound: Sound, process: Process) -> Self {
        Self {
            sounds: vec![sound],
            processes: vec![process],
        }
    }

    pub fn from_defs(
        sounds: &[SoundDef],
        processes: &[ProcessDef],
        base_dir: &Path,
        sample_rate: u32,
    ) -> Result<Self, LoadError> {
        let sounds = sounds
            .iter()
            .map(|def| Sound::from_def(def, base_dir, sample_rate))
            .collect::<Result<Vec<_>, _>>()?;
        let processes = processes.iter().map(Process::from_def).collect();
        Self::new(sounds, processes)
    }

    pub fn sounds(&self) -> &[Sound] {
        &self.sounds
    }

    pub fn processes(&self) -> &[Process] {
        &self.processes
    }

    pub fn sound_defs(&self) -> Vec<SoundDef> {
        self.sounds.iter().map(Sound::to_def).collect()
    }

    pub fn process_defs(&self) -> Vec<ProcessDef> {
        self.processes.iter().map(Process::to_def).collect()
    }
}
