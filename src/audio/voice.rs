use std::sync::Arc;

use super::frame::StereoFrame;
use super::patch::Patch;
use super::process::ProcessInstance;
use super::sound::SoundInstance;

pub const CHANNELS: usize = 2;

// handed out in trigger order, never reused
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct VoiceId(pub u64);

// One sounding instance of a patch. Dropping the voice drops its instances.
#[derive(Debug)]
pub struct Voice {
    patch: Arc<Patch>,
    sounds: Vec<SoundInstance>,
    processes: Vec<ProcessInstance>,
    frame: u32,
    volume: f32,
}

impl Voice {
    pub fn new(patch: Arc<Patch>, volume: f32, frames_per_beat: f32, sample_rate: u32) -> Self {
        let sounds = patch
            .sounds()
            .iter()
            .map(|s| s.create_instance(frames_per_beat, sample_rate))
            .collect();
        let processes = patch
            .processes()
            .iter()
            .map(|p| p.create_instance(frames_per_beat))
            .collect();
        Self {
            patch,
            sounds,
            processes,
            frame: 0,
            volume,
        }
    }

    // Pull the next frame through every sound and process. None once the
    // voice is exhausted or inaudible.
    pub fn next_frame(&mut self) -> Option<StereoFrame> {
        let mut mix = [0.0f32; CHANNELS];
        let mut sounding = false;
        for (sound, instance) in self.patch.sounds().iter().zip(self.sounds.iter_mut()) {
            let mut out = [0.0f32; CHANNELS];
            if sound.samples_for_frame(&mut out, self.frame, instance) == CHANNELS {
                sounding = true;
                mix[0] += out[0];
                mix[1] += out[1];
            }
        }
        if !sounding {
            return None;
        }

        for (process, instance) in self.patch.processes().iter().zip(self.processes.iter_mut()) {
            if !process.process_samples(&mut mix, self.frame, instance) {
                return None;
            }
        }

        self.frame += 1;
        Some(StereoFrame { left: mix[0], right: mix[1] }.scaled(self.volume))
    }
}
