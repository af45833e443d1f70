use std::path::Path;

use serde::{Deserialize, Serialize};

use super::sample_buffer::SampleBuffer;
use crate::error::LoadError;
use crate::loader::sample_loader;

// frames faded out at the end of a synth tone so it doesn't click
const SYNTH_FADE_FRAMES: u32 = 64;

/// On-disk description of a sound, tagged by its `class` field.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "class")]
pub enum SoundDef {
    #[serde(rename = "WavSound")]
    Wav { filename: String },
    #[serde(rename = "SineSynthSound")]
    SineSynth { frequency: u32, duration: f32 },
}

/// A generator of samples. Owns its static data; per-voice state lives in
/// the `SoundInstance` made by `create_instance`.
#[derive(Debug)]
pub enum Sound {
    Wav(WavSound),
    SineSynth(SineSynthSound),
}

#[derive(Debug)]
pub struct WavSound {
    filename: String,
    buffer: SampleBuffer,
}

#[derive(Clone, Copy, Debug)]
pub struct SineSynthSound {
    frequency: u32,
    duration: f32, // beats
}

#[derive(Clone, Debug)]
pub enum SoundInstance {
    Wav { cursor: usize },
    SineSynth { phase_inc: f32, length: u32 },
}

impl WavSound {
    pub fn new(filename: impl Into<String>, buffer: SampleBuffer) -> Self {
        Self { filename: filename.into(), buffer }
    }
}

impl SineSynthSound {
    pub fn new(frequency: u32, duration: f32) -> Self {
        Self { frequency, duration: duration.max(0.0) }
    }
}

impl Sound {
    // wav filenames are resolved against the directory of the file that named them
    pub fn from_def(def: &SoundDef, base_dir: &Path, sample_rate: u32) -> Result<Self, LoadError> {
        match def {
            SoundDef::Wav { filename } => {
                let buffer = sample_loader::load(&base_dir.join(filename), sample_rate)?;
                Ok(Sound::Wav(WavSound::new(filename.clone(), buffer)))
            }
            SoundDef::SineSynth { frequency, duration } => {
                Ok(Sound::SineSynth(SineSynthSound::new(*frequency, *duration)))
            }
        }
    }

    pub fn to_def(&self) -> SoundDef {
        match self {
            Sound::Wav(w) => SoundDef::Wav { filename: w.filename.clone() },
            Sound::SineSynth(s) => SoundDef::SineSynth {
                frequency: s.frequency,
                duration: s.duration,
            },
        }
    }

    pub fn create_instance(&self, frames_per_beat: f32, sample_rate: u32) -> SoundInstance {
        match self {
            Sound::Wav(_) => SoundInstance::Wav { cursor: 0 },
            Sound::SineSynth(s) => SoundInstance::SineSynth {
                phase_inc: std::f32::consts::TAU * s.frequency as f32 / sample_rate as f32,
                length: (s.duration * frames_per_beat) as u32,
            },
        }
    }

    /// Writes one sample to each of `out`'s channels. Returns the number of
    /// channels written; anything short of `out.len()` means the sound is done.
    pub fn samples_for_frame(&self, out: &mut [f32], frame: u32, instance: &mut SoundInstance) -> usize {
        match (self, instance) {
            (Sound::Wav(w), SoundInstance::Wav { cursor }) => {
                let Some(&value) = w.buffer.data.get(*cursor) else {
                    return 0;
                };
                *cursor += 1;
                out.fill(value);
                out.len()
            }
            (Sound::SineSynth(_), SoundInstance::SineSynth { phase_inc, length }) => {
                if frame >= *length {
                    return 0;
                }
                let fade = ((*length - frame) as f32 / SYNTH_FADE_FRAMES as f32).min(1.0);
                out.fill((*phase_inc * frame as f32).sin() * fade);
                out.len()
            }
            // an instance made by a different sound has nothing to play
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pull(sound: &Sound, instance: &mut SoundInstance, frame: u32) -> (usize, [f32; 2]) {
        let mut out = [0.0; 2];
        let n = sound.samples_for_frame(&mut out, frame, instance);
        (n, out)
    }

    #[test]
    fn wav_plays_each_sample_then_exhausts() {
        let sound = Sound::Wav(WavSound::new("x.wav", SampleBuffer::new(vec![0.5, -0.25])));
        let mut inst = sound.create_instance(22050.0, 44100);

        assert_eq!(pull(&sound, &mut inst, 0), (2, [0.5, 0.5]));
        assert_eq!(pull(&sound, &mut inst, 1), (2, [-0.25, -0.25]));
        assert_eq!(pull(&sound, &mut inst, 2).0, 0);
    }

    #[test]
    fn instances_are_independent() {
        let sound = Sound::Wav(WavSound::new("x.wav", SampleBuffer::new(vec![0.1, 0.2, 0.3])));
        let mut a = sound.create_instance(22050.0, 44100);
        let mut b = sound.create_instance(22050.0, 44100);

        pull(&sound, &mut a, 0);
        pull(&sound, &mut a, 1);
        assert_eq!(pull(&sound, &mut b, 0).1, [0.1, 0.1]);
        assert_eq!(pull(&sound, &mut a, 2).1, [0.3, 0.3]);
    }

    #[test]
    fn sine_length_follows_tempo() {
        let sound = Sound::SineSynth(SineSynthSound::new(440, 0.5));
        let mut inst = sound.create_instance(1000.0, 44100);

        assert_eq!(pull(&sound, &mut inst, 499).0, 2);
        assert_eq!(pull(&sound, &mut inst, 500).0, 0);
    }

    #[test]
    fn sine_fades_out_at_the_end() {
        let sound = Sound::SineSynth(SineSynthSound::new(11025, 1.0));
        let mut inst = sound.create_instance(1000.0, 44100);

        // quarter period in, sin() is at its peak
        let (_, early) = pull(&sound, &mut inst, 1);
        let (_, late) = pull(&sound, &mut inst, 997);
        assert!((early[0] - 1.0).abs() < 1e-3);
        assert!(late[0].abs() < 0.1);
    }

    #[test]
    fn mismatched_instance_is_exhausted() {
        let wav = Sound::Wav(WavSound::new("x.wav", SampleBuffer::new(vec![0.5])));
        let sine = Sound::SineSynth(SineSynthSound::new(440, 1.0));
        let mut inst = sine.create_instance(22050.0, 44100);
        assert_eq!(pull(&wav, &mut inst, 0).0, 0);
    }

    #[test]
    fn class_tag_roundtrip() {
        let json = r#"[{"class":"WavSound","filename":"kick.wav"},{"class":"SineSynthSound","frequency":440,"duration":0.5}]"#;
        let defs: Vec<SoundDef> = serde_json::from_str(json).unwrap();
        assert_eq!(defs[0], SoundDef::Wav { filename: "kick.wav".into() });
        assert_eq!(defs[1], SoundDef::SineSynth { frequency: 440, duration: 0.5 });

        let unknown = serde_json::from_str::<SoundDef>(r#"{"class":"SawSynth"}"#);
        assert!(unknown.is_err());
    }
}
