use serde::{Deserialize, Serialize};

// below this a voice is considered inaudible and gets killed
pub const AUDIBLE_EPSILON: f32 = 0.001;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "class")]
pub enum ProcessDef {
    #[serde(rename = "DecayProcess")]
    Decay { decay: f32 },
    #[serde(rename = "ADSRProcess")]
    Adsr { attack: f32, sustain: f32, decay: f32 },
}

/// A per-voice post filter. Parameters are immutable; envelope state lives
/// in the `ProcessInstance`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Process {
    Decay(DecayProcess),
    Adsr(AdsrProcess),
}

// decay: fraction of the volume lost per beat
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DecayProcess {
    decay: f32,
}

// attack, sustain and decay are each a fraction of one beat
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AdsrProcess {
    attack: f32,
    sustain: f32,
    decay: f32,
}

#[derive(Clone, Debug)]
pub enum ProcessInstance {
    Decay { volume: f32, factor: f32 },
    Adsr { attack: u32, sustain: u32, decay: u32 },
}

impl DecayProcess {
    pub fn new(decay: f32) -> Self {
        Self { decay: decay.clamp(0.0, 1.0) }
    }
}

impl AdsrProcess {
    pub fn new(attack: f32, sustain: f32, decay: f32) -> Self {
        Self {
            attack: attack.clamp(0.0, 1.0),
            sustain: sustain.clamp(0.0, 1.0),
            decay: decay.clamp(0.0, 1.0),
        }
    }
}

impl Process {
    pub fn from_def(def: &ProcessDef) -> Self {
        match *def {
            ProcessDef::Decay { decay } => Process::Decay(DecayProcess::new(decay)),
            ProcessDef::Adsr { attack, sustain, decay } => {
                Process::Adsr(AdsrProcess::new(attack, sustain, decay))
            }
        }
    }

    pub fn to_def(&self) -> ProcessDef {
        match self {
            Process::Decay(d) => ProcessDef::Decay { decay: d.decay },
            Process::Adsr(a) => ProcessDef::Adsr {
                attack: a.attack,
                sustain: a.sustain,
                decay: a.decay,
            },
        }
    }

    pub fn create_instance(&self, frames_per_beat: f32) -> ProcessInstance {
        match self {
            Process::Decay(d) => ProcessInstance::Decay {
                volume: 1.0,
                factor: (1.0 - d.decay).powf(1.0 / frames_per_beat.max(1.0)),
            },
            Process::Adsr(a) => ProcessInstance::Adsr {
                attack: (a.attack * frames_per_beat) as u32,
                sustain: (a.sustain * frames_per_beat) as u32,
                decay: (a.decay * frames_per_beat) as u32,
            },
        }
    }

    /// Scales `samples` in place. Returns false once the voice can no longer
    /// be heard and should be dropped.
    pub fn process_samples(&self, samples: &mut [f32], frame: u32, instance: &mut ProcessInstance) -> bool {
        let (gain, fading) = match instance {
            ProcessInstance::Decay { volume, factor } => {
                let gain = *volume;
                *volume *= *factor;
                (gain, true)
            }
            ProcessInstance::Adsr { attack, sustain, decay } => {
                adsr_gain(frame, *attack, *sustain, *decay)
            }
        };
        // a quiet start of an attack is not the end of the voice
        if fading && gain < AUDIBLE_EPSILON {
            return false;
        }
        samples.iter_mut().for_each(|s| *s *= gain);
        true
    }
}

// gain at `frame`, and whether the envelope has reached its decay
fn adsr_gain(frame: u32, attack: u32, sustain: u32, decay: u32) -> (f32, bool) {
    if frame < attack {
        return ((frame + 1) as f32 / attack as f32, false);
    }
    let frame = frame - attack;
    if frame < sustain {
        return (1.0, false);
    }
    let frame = frame - sustain;
    if frame < decay {
        return (1.0 - frame as f32 / decay as f32, true);
    }
    (0.0, true)
}
