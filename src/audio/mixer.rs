use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::frame::StereoFrame;
use super::patch::Patch;
use super::voice::{CHANNELS, Voice, VoiceId};

pub const SAMPLE_RATE: u32 = 44_100;
pub const MAX_VOICES: usize = 64; // hard cap, newest note is dropped past this
pub const MAX_CALLBACK_FRAMES: usize = 256;
pub const IDLE_INTERVAL: u32 = 10_000; // used when no controller is installed
pub const HEADROOM: f32 = 0.7;

/// Consulted by the mixer whenever its tick countdown runs out. Called on the
/// audio thread with the audio lock held, so implementations must not block
/// or take the lock again.
pub trait Controller: Send {
    /// Trigger whatever is due now and return the frames until the next call.
    fn next_frame(&mut self, mixer: &mut MixerCore) -> u32;

    fn on_connect(&mut self, _mixer: &mut MixerCore) {}

    fn on_disconnect(&mut self, _mixer: &mut MixerCore) {}
}

/// Everything the audio lock protects apart from the controller itself.
pub struct MixerCore {
    voices: Vec<Voice>,
    mix_buffer: Vec<StereoFrame>,
    ticks_remaining: u32,
    master_volume: f32,
    frames_per_beat: f32,
    next_voice_id: u64,
    active_voices: Arc<AtomicU32>,
}

impl MixerCore {
    fn new(active_voices: Arc<AtomicU32>) -> Self {
        Self {
            voices: Vec::with_capacity(MAX_VOICES),
            mix_buffer: vec![StereoFrame::zero(); MAX_CALLBACK_FRAMES],
            ticks_remaining: 0,
            master_volume: 1.0,
            frames_per_beat: SAMPLE_RATE as f32 / 2.0, // 120 bpm until told otherwise
            next_voice_id: 0,
            active_voices,
        }
    }

    pub fn play_patch(&mut self, patch: &Arc<Patch>, volume: f32) -> Option<VoiceId> {
        if self.voices.len() >= MAX_VOICES {
            log::error!("voice limit of {MAX_VOICES} reached, dropping note");
            return None;
        }
        let id = VoiceId(self.next_voice_id);
        self.next_voice_id += 1;
        self.voices.push(Voice::new(
            Arc::clone(patch),
            volume,
            self.frames_per_beat,
            SAMPLE_RATE,
        ));
        self.publish_voice_count();
        Some(id)
    }

    // only ever shortens the wait, so a tempo change is never overshot
    pub fn apply_interval(&mut self, ticks: u32) {
        self.ticks_remaining = self.ticks_remaining.min(ticks);
    }

    pub fn kill_all_voices(&mut self) {
        self.voices.clear();
        self.publish_voice_count();
    }

    #[cfg(test)]
    pub fn ticks_remaining(&self) -> u32 {
        self.ticks_remaining
    }

    pub fn master_volume(&self) -> f32 {
        self.master_volume
    }

    pub fn set_master_volume(&mut self, volume: f32) {
        self.master_volume = volume.clamp(0.0, 1.0);
    }

    pub fn set_frames_per_beat(&mut self, frames: f32) {
        self.frames_per_beat = frames.max(1.0);
    }

    fn publish_voice_count(&self) {
        self.active_voices.store(self.voices.len() as u32, Ordering::Relaxed);
    }

    // Sum every live voice into the first `frames` of the mix buffer, then
    // clip. Exhausted voices are swap-removed as soon as they report it.
    fn mix_voices(&mut self, frames: usize) {
        let buffer = &mut self.mix_buffer[..frames];
        buffer.fill(StereoFrame::zero());
        let gain = self.master_volume * HEADROOM;

        let mut i = 0;
        while i < self.voices.len() {
            let voice = &mut self.voices[i];
            let mut alive = true;
            for out in buffer.iter_mut() {
                match voice.next_frame() {
                    Some(frame) => *out += frame.scaled(gain),
                    None => {
                        alive = false;
                        break;
                    }
                }
            }
            if alive {
                i += 1;
            } else {
                // order of voices doesn't matter, the swapped-in one is mixed next
                self.voices.swap_remove(i);
            }
        }

        for frame in buffer.iter_mut() {
            *frame = frame.clipped(HEADROOM);
        }
        self.publish_voice_count();
    }

    fn write_output(&self, out: &mut [i16], frames: usize) {
        for (dst, frame) in out.chunks_exact_mut(CHANNELS).zip(&self.mix_buffer[..frames]) {
            dst.copy_from_slice(&frame.to_i16());
        }
    }
}

/// The state behind the audio lock: voices, tick countdown and controller.
pub struct AudioState<C> {
    core: MixerCore,
    controller: Option<C>,
}

impl<C: Controller> AudioState<C> {
    fn new(active_voices: Arc<AtomicU32>) -> Self {
        Self {
            core: MixerCore::new(active_voices),
            controller: None,
        }
    }

    pub fn core(&self) -> &MixerCore {
        &self.core
    }

    pub fn core_mut(&mut self) -> &mut MixerCore {
        &mut self.core
    }

    pub fn controller(&self) -> Option<&C> {
        self.controller.as_ref()
    }

    // borrow the controller and the rest of the mixer at the same time
    pub fn split_mut(&mut self) -> (Option<&mut C>, &mut MixerCore) {
        (self.controller.as_mut(), &mut self.core)
    }

    /// Swap the controller, notifying the old one of the disconnect and the
    /// new one of the connect. Returns the previous controller.
    pub fn set_controller(&mut self, controller: Option<C>) -> Option<C> {
        let mut previous = std::mem::replace(&mut self.controller, controller);
        if let Some(old) = previous.as_mut() {
            old.on_disconnect(&mut self.core);
        }
        if let Some(new) = self.controller.as_mut() {
            new.on_connect(&mut self.core);
        }
        previous
    }

    /// Fill `out` with interleaved stereo. Mixes in chunks that never cross a
    /// controller tick, so scheduling lands exactly on tick boundaries.
    pub fn render(&mut self, out: &mut [i16]) {
        let total_frames = out.len() / CHANNELS;
        let mut done = 0;
        while done < total_frames {
            let chunk = (self.core.ticks_remaining as usize)
                .min(MAX_CALLBACK_FRAMES)
                .min(total_frames - done);
            if chunk > 0 {
                self.core.mix_voices(chunk);
                self.core
                    .write_output(&mut out[done * CHANNELS..(done + chunk) * CHANNELS], chunk);
                done += chunk;
                self.core.ticks_remaining -= chunk as u32;
            }
            if self.core.ticks_remaining == 0 {
                let next = match self.controller.as_mut() {
                    Some(controller) => controller.next_frame(&mut self.core),
                    None => IDLE_INTERVAL,
                };
                self.core.ticks_remaining = next.max(1);
            }
        }
        // odd trailing sample, if the host ever asks for one
        out[total_frames * CHANNELS..].fill(0);
    }
}

/// Owns the output device and the audio lock shared with its callback.
pub struct Mixer<C> {
    state: Arc<Mutex<AudioState<C>>>,
    active_voices: Arc<AtomicU32>,
    _stream: Option<cpal::Stream>, // None when rendering offline
}

impl<C: Controller + 'static> Mixer<C> {
    // a mixer with no device attached; render() is driven by the caller
    pub fn offline() -> Self {
        let (state, active_voices) = Self::new_state();
        Self {
            state,
            active_voices,
            _stream: None,
        }
    }

    pub(super) fn with_stream(
        state: Arc<Mutex<AudioState<C>>>,
        active_voices: Arc<AtomicU32>,
        stream: cpal::Stream,
    ) -> Self {
        Self {
            state,
            active_voices,
            _stream: Some(stream),
        }
    }

    pub(super) fn new_state() -> (Arc<Mutex<AudioState<C>>>, Arc<AtomicU32>) {
        let active_voices = Arc::new(AtomicU32::new(0));
        let state = Arc::new(Mutex::new(AudioState::new(Arc::clone(&active_voices))));
        (state, active_voices)
    }

    /// Take the audio lock. Hold it only for short, non-blocking edits.
    pub fn lock(&self) -> MutexGuard<'_, AudioState<C>> {
        lock_state(&self.state)
    }

    pub fn set_controller(&self, controller: Option<C>) -> Option<C> {
        self.lock().set_controller(controller)
    }

    pub fn play_patch(&self, patch: &Arc<Patch>, volume: f32) -> Option<VoiceId> {
        self.lock().core_mut().play_patch(patch, volume)
    }

    pub fn render(&self, out: &mut [i16]) {
        self.lock().render(out);
    }

    // lock-free, for display
    pub fn num_active_voices(&self) -> u32 {
        self.active_voices.load(Ordering::Relaxed)
    }
}

// The lock only guards plain data, so a panic elsewhere can't leave it in a
// state the audio thread can't use.
pub(super) fn lock_state<C>(state: &Mutex<AudioState<C>>) -> MutexGuard<'_, AudioState<C>> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}
