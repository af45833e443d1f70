// The sequencer: musical transport state plus the mixer controller that
// walks the note grid. Lives inside the audio lock together with the
// instrument it owns.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::audio::{
    Controller, DecayProcess, MixerCore, Patch, Process, SAMPLE_RATE, SineSynthSound, Sound,
};
use crate::pipeline::instrument::{Instrument, TrackId, VELOCITY_QUANTUM};
use crate::pipeline::song::Song;

pub const MIN_BPM: u32 = 40;
pub const MAX_BPM: u32 = 220;
pub const MAX_BEAT_SUBDIVISIONS: u32 = 32; // note grid slots per beat
pub const MAX_MEASURES: u32 = 64;
pub const MAX_BEATS_PER_MEASURE: u32 = 16;

pub const DEFAULT_BPM: u32 = 120;
pub const DEFAULT_SUBDIVISION: u32 = 4;
pub const DEFAULT_MEASURES: u32 = 2;
pub const DEFAULT_BEATS_PER_MEASURE: u32 = 4;

/// Frames between two grid steps at the given tempo and subdivision.
pub fn interval(bpm: u32, subdivision: u32) -> u32 {
    if bpm == 0 || subdivision == 0 {
        return 0;
    }
    (SAMPLE_RATE as f64 / bpm as f64 * 60.0 / subdivision as f64) as u32
}

// how long to wait between checks while nothing is playing
pub fn idle_interval(subdivision: u32) -> u32 {
    SAMPLE_RATE / subdivision.max(1)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportState {
    Stopped,
    Playing,
    Paused,
}

/// Transport readings for the GUI thread, published without the lock.
#[derive(Debug, Default)]
pub struct SequencerStatus {
    position: AtomicUsize,
    playing: AtomicBool,
}

impl SequencerStatus {
    pub fn position(&self) -> usize {
        self.position.load(Ordering::Relaxed)
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Relaxed)
    }
}

// Both run on the audio thread: no blocking, no heavy allocation.
pub type NotePlayedCallback = Box<dyn FnMut(usize, usize) + Send>; // (track index, note index)
pub type BeatCallback = Box<dyn FnMut(bool) + Send>; // true on the first beat of a measure

struct Metronome {
    accent: Arc<Patch>,
    beat: Arc<Patch>,
}

impl Metronome {
    fn new() -> Self {
        Self {
            accent: Self::blip(1760),
            beat: Self::blip(880),
        }
    }

    fn blip(frequency: u32) -> Arc<Patch> {
        Arc::new(Patch::single(
            Sound::SineSynth(SineSynthSound::new(frequency, 0.1)),
            Process::Decay(DecayProcess::new(0.99)),
        ))
    }
}

pub struct Sequencer {
    bpm: u32,
    subdivision: u32,
    num_measures: u32,
    beats_per_measure: u32,
    current_position: usize,
    next_position: usize,
    interval: u32,
    state: TransportState,
    looping: bool,
    metronome_on: bool,
    metronome: Metronome,
    instrument: Option<Instrument>,
    note_played: Option<NotePlayedCallback>,
    beat: Option<BeatCallback>,
    status: Arc<SequencerStatus>,
}

impl Default for Sequencer {
    fn default() -> Self {
        Self::new()
    }
}

impl Sequencer {
    pub fn new() -> Self {
        Self {
            bpm: DEFAULT_BPM,
            subdivision: DEFAULT_SUBDIVISION,
            num_measures: DEFAULT_MEASURES,
            beats_per_measure: DEFAULT_BEATS_PER_MEASURE,
            current_position: 0,
            next_position: 0,
            interval: interval(DEFAULT_BPM, DEFAULT_SUBDIVISION),
            state: TransportState::Stopped,
            looping: true,
            metronome_on: false,
            metronome: Metronome::new(),
            instrument: None,
            note_played: None,
            beat: None,
            status: Arc::new(SequencerStatus::default()),
        }
    }

    pub fn status(&self) -> Arc<SequencerStatus> {
        Arc::clone(&self.status)
    }

    // ── Transport ─────────────────────────────────────────────────

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == TransportState::Playing
    }

    // starts on the very next audio tick instead of waiting out the idle interval
    pub fn play(&mut self, mixer: &mut MixerCore) {
        if self.state != TransportState::Playing {
            self.state = TransportState::Playing;
            self.status.playing.store(true, Ordering::Relaxed);
            mixer.apply_interval(0);
            log::info!("play from position {}", self.next_position);
        }
    }

    pub fn pause(&mut self) {
        if self.state == TransportState::Playing {
            self.state = TransportState::Paused;
            self.status.playing.store(false, Ordering::Relaxed);
        }
    }

    // pause and silence everything right away, before destructive edits
    pub fn pause_kill(&mut self, mixer: &mut MixerCore) {
        self.pause();
        mixer.kill_all_voices();
    }

    pub fn stop(&mut self) {
        self.state = TransportState::Stopped;
        self.current_position = 0;
        self.next_position = 0;
        self.status.playing.store(false, Ordering::Relaxed);
        self.status.position.store(0, Ordering::Relaxed);
    }

    pub fn is_looping(&self) -> bool {
        self.looping
    }

    pub fn set_looping(&mut self, looping: bool) {
        self.looping = looping;
    }

    pub fn is_metronome_on(&self) -> bool {
        self.metronome_on
    }

    pub fn set_metronome(&mut self, on: bool) {
        self.metronome_on = on;
    }

    // ── Tempo and grid ────────────────────────────────────────────

    pub fn bpm(&self) -> u32 {
        self.bpm
    }

    pub fn subdivision(&self) -> u32 {
        self.subdivision
    }

    pub fn num_measures(&self) -> u32 {
        self.num_measures
    }

    pub fn beats_per_measure(&self) -> u32 {
        self.beats_per_measure
    }

    pub fn frames_per_beat(&self) -> f32 {
        SAMPLE_RATE as f32 * 60.0 / self.bpm as f32
    }

    // grid slots advanced per tick at the current subdivision
    pub fn step(&self) -> usize {
        (MAX_BEAT_SUBDIVISIONS / self.subdivision) as usize
    }

    pub fn note_count(&self) -> usize {
        (self.num_measures * self.beats_per_measure * MAX_BEAT_SUBDIVISIONS) as usize
    }

    /// Clamped to [MIN_BPM, MAX_BPM]. Returns the tempo actually set.
    pub fn set_beats_per_minute(&mut self, bpm: u32, mixer: &mut MixerCore) -> u32 {
        self.bpm = bpm.clamp(MIN_BPM, MAX_BPM);
        mixer.set_frames_per_beat(self.frames_per_beat());
        self.update_interval(mixer);
        self.bpm
    }

    /// Rounded down to a power of two in [1, MAX_BEAT_SUBDIVISIONS].
    pub fn set_subdivision(&mut self, subdivision: u32, mixer: &mut MixerCore) -> u32 {
        let clamped = subdivision.clamp(1, MAX_BEAT_SUBDIVISIONS);
        self.subdivision = 1 << (u32::BITS - 1 - clamped.leading_zeros());
        // keep the playhead on the new grid
        let step = self.step();
        self.next_position = self.next_position.div_ceil(step) * step;
        self.update_interval(mixer);
        self.subdivision
    }

    fn update_interval(&mut self, mixer: &mut MixerCore) {
        self.interval = interval(self.bpm, self.subdivision);
        mixer.apply_interval(self.interval);
        log::debug!(
            "interval now {} frames ({} bpm, 1/{})",
            self.interval,
            self.bpm,
            self.subdivision
        );
    }

    pub fn set_num_measures(&mut self, measures: u32) -> u32 {
        self.num_measures = measures.clamp(1, MAX_MEASURES);
        self.resize_notes();
        self.num_measures
    }

    pub fn set_beats_per_measure(&mut self, beats: u32) -> u32 {
        self.beats_per_measure = beats.clamp(1, MAX_BEATS_PER_MEASURE);
        self.resize_notes();
        self.beats_per_measure
    }

    fn resize_notes(&mut self) {
        let count = self.note_count();
        if let Some(instrument) = self.instrument.as_mut() {
            instrument.resize_notes(count);
        }
    }

    // ── Instrument ────────────────────────────────────────────────

    pub fn instrument(&self) -> Option<&Instrument> {
        self.instrument.as_ref()
    }

    pub fn instrument_mut(&mut self) -> Option<&mut Instrument> {
        self.instrument.as_mut()
    }

    /// Swap in a new instrument, sized to the current grid. Playback stops
    /// and sounding voices are cut. Returns the old instrument.
    pub fn set_instrument(&mut self, instrument: Option<Instrument>, mixer: &mut MixerCore) -> Option<Instrument> {
        self.stop();
        mixer.kill_all_voices();
        let previous = std::mem::replace(&mut self.instrument, instrument);
        self.resize_notes();
        previous
    }

    pub fn delete_track(&mut self, id: TrackId, mixer: &mut MixerCore) -> bool {
        self.pause_kill(mixer);
        let Some(instrument) = self.instrument.as_mut() else {
            return false;
        };
        if let Some(track) = instrument.track(id) {
            log::info!("deleting track {} '{}'", id.0, track.name);
        }
        instrument.remove_track(id).is_some()
    }

    pub fn set_note_played_callback(&mut self, callback: Option<NotePlayedCallback>) {
        self.note_played = callback;
    }

    pub fn set_beat_callback(&mut self, callback: Option<BeatCallback>) {
        self.beat = callback;
    }

    // ── Songs ─────────────────────────────────────────────────────

    /// Take over a song's transport setup, instrument and notes. Returns the
    /// number of notes that didn't fit.
    pub fn load_song(&mut self, song: &Song, instrument: Instrument, mixer: &mut MixerCore) -> usize {
        self.set_beats_per_minute(song.tempo, mixer);
        self.num_measures = song.measures.clamp(1, MAX_MEASURES);
        self.beats_per_measure = song.beats_per_measure.clamp(1, MAX_BEATS_PER_MEASURE);
        self.set_instrument(Some(instrument), mixer);
        match self.instrument.as_mut() {
            Some(instrument) => song.write_notes(instrument),
            None => 0,
        }
    }

    pub fn to_song(&self, instrument: impl Into<String>) -> Song {
        Song {
            instrument: instrument.into(),
            tempo: self.bpm,
            measures: self.num_measures,
            beats_per_measure: self.beats_per_measure,
            notes: self.instrument.as_ref().map(Song::collect_notes).unwrap_or_default(),
        }
    }

    // ── Audio thread ──────────────────────────────────────────────

    fn on_beat(&mut self, full: bool, mixer: &mut MixerCore) {
        if let Some(callback) = self.beat.as_mut() {
            callback(full);
        }
        if self.metronome_on {
            let (patch, volume) = if full {
                (&self.metronome.accent, 0.5)
            } else {
                (&self.metronome.beat, 0.35)
            };
            mixer.play_patch(patch, volume);
        }
    }

    fn trigger_notes(&mut self, position: usize, mixer: &mut MixerCore) {
        let Some(instrument) = self.instrument.as_ref() else {
            return;
        };
        for (index, track) in instrument.tracks().enumerate() {
            let velocity = track.notes().get(position).copied().unwrap_or(0);
            if velocity == 0 || !instrument.is_audible(track) {
                continue;
            }
            if let Some(callback) = self.note_played.as_mut() {
                callback(index, position);
            }
            mixer.play_patch(track.patch(), velocity as f32 / VELOCITY_QUANTUM * track.volume());
        }
    }
}

impl Controller for Sequencer {
    fn next_frame(&mut self, mixer: &mut MixerCore) -> u32 {
        let idle = idle_interval(self.subdivision);
        let has_tracks = self.instrument.as_ref().is_some_and(|i| !i.is_empty());
        if self.state != TransportState::Playing || self.interval == 0 || !has_tracks {
            return idle;
        }

        self.current_position = self.next_position;
        if self.current_position >= self.note_count() {
            if !self.looping {
                self.stop();
                return idle;
            }
            self.current_position = 0;
        }
        self.next_position = self.current_position + self.step();
        let position = self.current_position;
        self.status.position.store(position, Ordering::Relaxed);

        let beat_len = MAX_BEAT_SUBDIVISIONS as usize;
        if position % beat_len == 0 {
            let full = position % (beat_len * self.beats_per_measure as usize) == 0;
            self.on_beat(full, mixer);
        }
        self.trigger_notes(position, mixer);
        self.interval
    }

    fn on_connect(&mut self, mixer: &mut MixerCore) {
        mixer.set_frames_per_beat(self.frames_per_beat());
        mixer.apply_interval(self.interval);
        log::debug!("sequencer connected to mixer");
    }

    fn on_disconnect(&mut self, mixer: &mut MixerCore) {
        self.pause_kill(mixer);
        log::debug!("sequencer disconnected from mixer");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{CHANNELS, Mixer};
    use crate::pipeline::instrument::tests::sine_patch;
    use std::sync::Mutex;

    fn one_track_instrument(positions: &[usize]) -> Instrument {
        let mut inst = Instrument::new("test");
        inst.resize_notes(4096);
        let id = inst.add_track("t", None, sine_patch(440)).unwrap();
        for &p in positions {
            inst.track_mut(id).unwrap().set_note(p, 1.0);
        }
        inst
    }

    // a mixer with a sequencer installed, one measure of one beat (32 slots)
    fn rig(positions: &[usize]) -> Mixer<Sequencer> {
        let mixer = Mixer::offline();
        mixer.set_controller(Some(Sequencer::new()));
        {
            let mut state = mixer.lock();
            let (seq, core) = state.split_mut();
            let seq = seq.unwrap();
            seq.set_num_measures(1);
            seq.set_beats_per_measure(1);
            seq.set_instrument(Some(one_track_instrument(positions)), core);
        }
        mixer
    }

    fn tick(mixer: &Mixer<Sequencer>) -> u32 {
        let mut state = mixer.lock();
        let (seq, core) = state.split_mut();
        seq.unwrap().next_frame(core)
    }

    fn with_seq<R>(mixer: &Mixer<Sequencer>, f: impl FnOnce(&mut Sequencer, &mut MixerCore) -> R) -> R {
        let mut state = mixer.lock();
        let (seq, core) = state.split_mut();
        f(seq.unwrap(), core)
    }

    fn positions(mixer: &Mixer<Sequencer>) -> (usize, usize) {
        let state = mixer.lock();
        let seq = state.controller().unwrap();
        (seq.current_position, seq.next_position)
    }

    #[test]
    fn interval_matches_formula_and_decreases() {
        for subdivision in [2, 4, 8, 16, 32] {
            let mut last = u32::MAX;
            for bpm in MIN_BPM..=MAX_BPM {
                let expected = (44100.0f64 / bpm as f64 * 60.0 / subdivision as f64).floor() as u32;
                let got = interval(bpm, subdivision);
                assert_eq!(got, expected);
                assert!(got < last, "not decreasing at {bpm} bpm 1/{subdivision}");
                last = got;
            }
        }
        assert!(interval(120, 8) < interval(120, 4));
        assert_eq!(interval(120, 4), 5512);
    }

    #[test]
    fn first_tick_plays_position_zero_and_advances_one_step() {
        let mixer = rig(&[0]);
        with_seq(&mixer, |seq, core| seq.play(core));

        let wait = tick(&mixer);
        assert_eq!(positions(&mixer), (0, 8));
        assert_eq!(wait, interval(DEFAULT_BPM, DEFAULT_SUBDIVISION));
        assert_eq!(mixer.num_active_voices(), 1);
    }

    #[test]
    fn loop_wraps_without_double_firing() {
        let mixer = rig(&[0, 16]);
        let fired = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&fired);
        with_seq(&mixer, |seq, core| {
            seq.set_subdivision(2, core);
            seq.set_looping(true);
            seq.set_note_played_callback(Some(Box::new(move |_, note| sink.lock().unwrap().push(note))));
            seq.play(core);
        });

        tick(&mixer);
        assert_eq!(positions(&mixer), (0, 16));
        tick(&mixer);
        assert_eq!(positions(&mixer), (16, 32));
        tick(&mixer);
        assert_eq!(positions(&mixer), (0, 16));
        assert_eq!(*fired.lock().unwrap(), vec![0, 16, 0]);
    }

    #[test]
    fn reaching_the_end_without_loop_stops() {
        let mixer = rig(&[]);
        with_seq(&mixer, |seq, core| {
            seq.set_subdivision(1, core);
            seq.set_looping(false);
            seq.play(core);
        });

        tick(&mixer); // position 0, next 32
        let wait = tick(&mixer);

        let state = mixer.lock();
        let seq = state.controller().unwrap();
        assert_eq!(seq.state(), TransportState::Stopped);
        assert_eq!(seq.current_position, 0);
        assert!(!seq.status().is_playing());
        assert_eq!(wait, idle_interval(1));
    }

    #[test]
    fn idle_when_stopped_or_empty() {
        let mixer = rig(&[0]);
        assert_eq!(tick(&mixer), idle_interval(DEFAULT_SUBDIVISION));
        assert_eq!(positions(&mixer), (0, 0));

        with_seq(&mixer, |seq, core| {
            let id = seq.instrument().unwrap().track_at(0).unwrap().id();
            seq.delete_track(id, core);
            seq.play(core);
        });
        assert_eq!(tick(&mixer), idle_interval(DEFAULT_SUBDIVISION));
        assert_eq!(mixer.num_active_voices(), 0);
    }

    #[test]
    fn velocity_and_mute_decide_what_plays() {
        let mixer = rig(&[0]);
        with_seq(&mixer, |seq, core| {
            let inst = seq.instrument_mut().unwrap();
            let muted = inst.add_track("muted", None, sine_patch(220)).unwrap();
            inst.track_mut(muted).unwrap().set_note(0, 1.0);
            inst.set_muted(muted, true).unwrap();
            let quiet = inst.add_track("quiet", None, sine_patch(330)).unwrap();
            inst.track_mut(quiet).unwrap().set_note(8, 0.5);
            seq.play(core);
        });

        tick(&mixer);
        assert_eq!(mixer.num_active_voices(), 1);
        tick(&mixer);
        assert_eq!(mixer.num_active_voices(), 2);
    }

    #[test]
    fn solo_silences_other_tracks() {
        let mixer = rig(&[0]);
        with_seq(&mixer, |seq, core| {
            let inst = seq.instrument_mut().unwrap();
            let lead = inst.add_track("lead", None, sine_patch(660)).unwrap();
            inst.track_mut(lead).unwrap().set_note(0, 1.0);
            inst.set_solo(Some(lead)).unwrap();
            seq.play(core);
        });
        tick(&mixer);
        assert_eq!(mixer.num_active_voices(), 1);
    }

    #[test]
    fn beat_callback_marks_measure_starts() {
        let mixer = rig(&[]);
        let beats = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&beats);
        with_seq(&mixer, |seq, core| {
            seq.set_beats_per_measure(2);
            seq.set_subdivision(2, core);
            seq.set_metronome(true);
            seq.set_beat_callback(Some(Box::new(move |full| sink.lock().unwrap().push(full))));
            seq.play(core);
        });

        for _ in 0..5 {
            tick(&mixer);
        }
        // positions 0, 16, 32, 48, 0 -> beats at 0, 32, 0
        assert_eq!(*beats.lock().unwrap(), vec![true, false, true]);
        assert_eq!(mixer.num_active_voices(), 3);
    }

    #[test]
    fn tempo_change_shortens_the_pending_tick() {
        let mixer = rig(&[]);
        with_seq(&mixer, |seq, core| seq.play(core));
        let mut out = vec![0i16; 100 * CHANNELS];
        mixer.render(&mut out);
        assert_eq!(mixer.lock().core().ticks_remaining(), interval(120, 4) - 100);

        let fast = with_seq(&mixer, |seq, core| seq.set_beats_per_minute(220, core));
        assert_eq!(fast, 220);
        assert_eq!(mixer.lock().core().ticks_remaining(), interval(220, 4));
    }

    #[test]
    fn tempo_and_subdivision_are_clamped() {
        let mixer = rig(&[]);
        with_seq(&mixer, |seq, core| {
            assert_eq!(seq.set_beats_per_minute(10, core), MIN_BPM);
            assert_eq!(seq.set_beats_per_minute(999, core), MAX_BPM);
            assert_eq!(seq.set_subdivision(12, core), 8);
            assert_eq!(seq.set_subdivision(0, core), 1);
            assert_eq!(seq.set_subdivision(1000, core), MAX_BEAT_SUBDIVISIONS);
        });
    }

    #[test]
    fn coarser_subdivision_while_playing_stays_on_the_grid() {
        let mixer = rig(&[]);
        let fired = Arc::new(Mutex::new(Vec::new()));
        let beats = Arc::new(AtomicUsize::new(0));
        let (note_sink, beat_sink) = (Arc::clone(&fired), Arc::clone(&beats));
        with_seq(&mixer, |seq, core| {
            seq.set_num_measures(2);
            let inst = seq.instrument_mut().unwrap();
            let id = inst.track_at(0).unwrap().id();
            for p in (0..64).step_by(8) {
                inst.track_mut(id).unwrap().set_note(p, 1.0);
            }
            seq.set_subdivision(8, core);
            seq.set_note_played_callback(Some(Box::new(move |_, note| note_sink.lock().unwrap().push(note))));
            seq.set_beat_callback(Some(Box::new(move |_| {
                beat_sink.fetch_add(1, Ordering::Relaxed);
            })));
            seq.play(core);
        });

        tick(&mixer);
        assert_eq!(positions(&mixer), (0, 4));
        with_seq(&mixer, |seq, core| seq.set_subdivision(4, core));
        assert_eq!(positions(&mixer), (0, 8));

        for _ in 0..7 {
            tick(&mixer);
        }
        assert_eq!(*fired.lock().unwrap(), vec![0, 8, 16, 24, 32, 40, 48, 56]);
        assert_eq!(beats.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn grid_changes_resize_every_track() {
        let mixer = rig(&[3]);
        with_seq(&mixer, |seq, _| {
            seq.set_num_measures(2);
            seq.set_beats_per_measure(3);
            let inst = seq.instrument().unwrap();
            assert_eq!(inst.note_count(), 2 * 3 * 32);
            assert!(inst.tracks().all(|t| t.notes().len() == 192));
            assert_eq!(inst.track_at(0).unwrap().notes()[3], 255);
        });
    }

    #[test]
    fn pause_keeps_position_and_stop_resets() {
        let mixer = rig(&[0, 8]);
        with_seq(&mixer, |seq, core| seq.play(core));
        tick(&mixer);
        tick(&mixer);

        with_seq(&mixer, |seq, core| {
            seq.pause();
            assert_eq!(seq.state(), TransportState::Paused);
            assert_eq!(seq.next_frame(core), idle_interval(DEFAULT_SUBDIVISION));
            assert_eq!((seq.current_position, seq.next_position), (8, 16));

            seq.play(core);
            seq.pause_kill(core);
            seq.stop();
            assert_eq!((seq.current_position, seq.next_position), (0, 0));
        });
        assert_eq!(mixer.num_active_voices(), 0);
    }

    #[test]
    fn plays_through_the_mixer() {
        let mixer = rig(&[0, 8, 16, 24]);
        let status = mixer.lock().controller().unwrap().status();
        with_seq(&mixer, |seq, core| seq.play(core));

        let mut out = vec![0i16; 2048 * CHANNELS];
        mixer.render(&mut out);

        assert!(status.is_playing());
        assert!(out.iter().any(|&s| s != 0));
        assert!(mixer.num_active_voices() >= 1);
    }

    #[test]
    fn song_roundtrip_through_sequencer() {
        let mixer = rig(&[0, 16]);
        let song = mixer.lock().controller().unwrap().to_song("kit");
        assert_eq!(song.measures, 1);
        assert_eq!(song.notes.len(), 2);

        let skipped = with_seq(&mixer, |seq, core| {
            let fresh = {
                let mut inst = Instrument::new("fresh");
                inst.add_track("t", None, sine_patch(440)).unwrap();
                inst
            };
            seq.load_song(&song, fresh, core)
        });
        assert_eq!(skipped, 0);
        let state = mixer.lock();
        let inst = state.controller().unwrap().instrument().unwrap();
        assert_eq!(inst.note_count(), 32);
        assert_eq!(inst.track_at(0).unwrap().notes()[16], 255);
    }
}
