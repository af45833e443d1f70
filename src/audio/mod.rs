use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use crate::error::MixerError;

mod frame;
mod mixer;
mod patch;
mod process;
mod sample_buffer;
mod sound;
mod voice;

pub use mixer::{Controller, Mixer, MixerCore, SAMPLE_RATE};
pub use patch::Patch;
pub use process::{AdsrProcess, DecayProcess, Process, ProcessDef};
pub use sample_buffer::SampleBuffer;
pub use sound::{SineSynthSound, Sound, SoundDef};
pub use voice::CHANNELS;

#[cfg(test)]
pub(crate) use sample_buffer::tests as wav_fixtures;

pub const DEFAULT_BUFFER_FRAMES: u32 = 2048;

impl<C: Controller + 'static> Mixer<C> {
    /// Open a stereo 44.1kHz signed 16-bit output with the given hardware
    /// buffer size. The device has to offer that format as-is; nothing is
    /// converted at the device layer.
    pub fn init(buffer_frames: u32) -> Result<Self, MixerError> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or(MixerError::NoDevice)?;

        let supported = device.supported_output_configs()?.any(|c| {
            c.channels() as usize == CHANNELS
                && c.sample_format() == cpal::SampleFormat::I16
                && c.min_sample_rate().0 <= SAMPLE_RATE
                && c.max_sample_rate().0 >= SAMPLE_RATE
        });
        if !supported {
            return Err(MixerError::UnsupportedConfig { sample_rate: SAMPLE_RATE });
        }

        let config = cpal::StreamConfig {
            channels: CHANNELS as u16,
            sample_rate: cpal::SampleRate(SAMPLE_RATE),
            buffer_size: cpal::BufferSize::Fixed(buffer_frames),
        };

        let (state, active_voices) = Self::new_state();
        let callback_state = std::sync::Arc::clone(&state);

        let err_fn = |err| log::error!("audio output stream error: {err}");

        let stream = device.build_output_stream(
            &config,
            move |data: &mut [i16], _info: &cpal::OutputCallbackInfo| {
                mixer::lock_state(&callback_state).render(data);
            },
            err_fn,
            None,
        )?;
        stream.play()?;

        log::info!(
            "audio output open: {} ch, {} Hz, {} frame buffer",
            CHANNELS,
            SAMPLE_RATE,
            buffer_frames
        );
        Ok(Self::with_stream(state, active_voices, stream))
    }
}
