// GUI-thread layer: turns input events into edits made under the audio lock,
// and gathers what the view needs into a DisplayState once per frame.
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crossbeam_channel::Receiver;

use crate::audio::{AdsrProcess, Mixer, MixerCore, Patch, Process, SineSynthSound, Sound};
use crate::pipeline::instrument::Instrument;
use crate::pipeline::persistence;
use crate::sequencer::{Sequencer, SequencerStatus, TransportState};
use crate::shared::{DisplayState, InputEvent, TrackRow};

const FLASH_SECONDS: f64 = 0.12;
const TEMPO_STEP: u32 = 5;
const VOLUME_STEP: f32 = 0.1;
const NOTE_QUEUE: usize = 256;

pub struct Middle {
    mixer: Mixer<Sequencer>,
    status: Arc<SequencerStatus>,
    notes_played: Receiver<(usize, usize)>,
    beats: Receiver<bool>,
    flash: Vec<f64>, // seconds left per track index
    beat_flash: f64,
    accent: bool,
    cursor_track: usize,
    cursor_step: usize,
    song_path: PathBuf,
    instrument_path: PathBuf,
    message: String,
    display: DisplayState,
}

impl Middle {
    /// Takes over a mixer with a sequencer installed (one is installed if
    /// missing) and hooks the note and beat callbacks up to the flash queues.
    pub fn new(mixer: Mixer<Sequencer>, song_path: PathBuf, instrument_path: PathBuf) -> Self {
        let (tx, rx) = crossbeam_channel::bounded(NOTE_QUEUE);
        let (beat_tx, beat_rx) = crossbeam_channel::bounded(16);
        let status = {
            let mut state = mixer.lock();
            if state.controller().is_none() {
                state.set_controller(Some(Sequencer::new()));
            }
            let (seq, _) = state.split_mut();
            match seq {
                Some(seq) => {
                    // never block the audio thread; a full queue only loses a flash
                    seq.set_note_played_callback(Some(Box::new(move |track, note| {
                        let _ = tx.try_send((track, note));
                    })));
                    seq.set_beat_callback(Some(Box::new(move |full| {
                        let _ = beat_tx.try_send(full);
                    })));
                    seq.status()
                }
                None => Arc::new(SequencerStatus::default()),
            }
        };

        let mut middle = Self {
            mixer,
            status,
            notes_played: rx,
            beats: beat_rx,
            flash: Vec::new(),
            beat_flash: 0.0,
            accent: false,
            cursor_track: 0,
            cursor_step: 0,
            song_path,
            instrument_path,
            message: String::new(),
            display: DisplayState::default(),
        };
        middle.refresh();
        middle
    }

    pub fn display_state(&self) -> &DisplayState {
        &self.display
    }

    pub fn mixer(&self) -> &Mixer<Sequencer> {
        &self.mixer
    }

    fn with_sequencer<R>(&self, f: impl FnOnce(&mut Sequencer, &mut MixerCore) -> R) -> Option<R> {
        let mut state = self.mixer.lock();
        let (seq, core) = state.split_mut();
        seq.map(|seq| f(seq, core))
    }

    pub fn handle_input(&mut self, event: InputEvent) {
        match event {
            InputEvent::TogglePlay => {
                self.with_sequencer(|seq, core| {
                    if seq.is_playing() {
                        seq.pause();
                    } else {
                        seq.play(core);
                    }
                });
            }
            InputEvent::Stop => {
                self.with_sequencer(|seq, core| {
                    seq.stop();
                    core.kill_all_voices();
                });
            }
            InputEvent::ToggleLoop => {
                self.with_sequencer(|seq, _| seq.set_looping(!seq.is_looping()));
            }
            InputEvent::ToggleMetronome => {
                self.with_sequencer(|seq, _| seq.set_metronome(!seq.is_metronome_on()));
            }

            InputEvent::CursorLeft => self.cursor_step = self.cursor_step.saturating_sub(1),
            InputEvent::CursorRight => self.cursor_step += 1,
            InputEvent::CursorUp => self.cursor_track = self.cursor_track.saturating_sub(1),
            InputEvent::CursorDown => self.cursor_track += 1,
            InputEvent::ToggleNote => self.toggle_note(),

            InputEvent::TempoUp => self.adjust_tempo(TEMPO_STEP as i32),
            InputEvent::TempoDown => self.adjust_tempo(-(TEMPO_STEP as i32)),
            InputEvent::SubdivisionUp => {
                self.with_sequencer(|seq, core| seq.set_subdivision(seq.subdivision() * 2, core));
            }
            InputEvent::SubdivisionDown => {
                self.with_sequencer(|seq, core| seq.set_subdivision(seq.subdivision() / 2, core));
            }
            InputEvent::MeasuresUp => {
                self.with_sequencer(|seq, _| seq.set_num_measures(seq.num_measures() + 1));
            }
            InputEvent::MeasuresDown => {
                self.with_sequencer(|seq, _| seq.set_num_measures(seq.num_measures().saturating_sub(1)));
            }
            InputEvent::BeatsUp => {
                self.with_sequencer(|seq, _| seq.set_beats_per_measure(seq.beats_per_measure() + 1));
            }
            InputEvent::BeatsDown => {
                self.with_sequencer(|seq, _| seq.set_beats_per_measure(seq.beats_per_measure().saturating_sub(1)));
            }
            InputEvent::VolumeUp => self.adjust_volume(VOLUME_STEP),
            InputEvent::VolumeDown => self.adjust_volume(-VOLUME_STEP),

            InputEvent::ToggleMute => self.toggle_mute(),
            InputEvent::ToggleSolo => self.toggle_solo(),
            InputEvent::AddTrack => self.add_sine_track(),
            InputEvent::DeleteTrack => self.delete_track(),
            InputEvent::ClearTrack => self.clear_track(),
            InputEvent::Audition => self.audition(),

            InputEvent::Save => {
                self.message = match self.save() {
                    Ok(()) => format!("saved {}", self.song_path.display()),
                    Err(e) => {
                        log::error!("save failed: {e:#}");
                        format!("save failed: {e}")
                    }
                };
            }
            // handled by the main loop
            InputEvent::Quit => {}
        }
        self.refresh();
    }

    /// Advance flash timers by `elapsed` seconds and rebuild the display.
    pub fn tick(&mut self, elapsed: f64) {
        for left in &mut self.flash {
            *left = (*left - elapsed).max(0.0);
        }
        for (track, _note) in self.notes_played.try_iter() {
            if track >= self.flash.len() {
                self.flash.resize(track + 1, 0.0);
            }
            self.flash[track] = FLASH_SECONDS;
        }
        self.beat_flash = (self.beat_flash - elapsed).max(0.0);
        if let Some(full) = self.beats.try_iter().last() {
            self.beat_flash = FLASH_SECONDS;
            self.accent = full;
        }
        self.refresh();
    }

    fn adjust_tempo(&mut self, delta: i32) {
        self.with_sequencer(|seq, core| {
            let bpm = seq.bpm().saturating_add_signed(delta);
            seq.set_beats_per_minute(bpm, core)
        });
    }

    fn adjust_volume(&mut self, delta: f32) {
        let mut state = self.mixer.lock();
        let core = state.core_mut();
        core.set_master_volume(core.master_volume() + delta);
    }

    fn toggle_note(&mut self) {
        let (track_index, cursor_step) = (self.cursor_track, self.cursor_step);
        self.with_sequencer(|seq, _| {
            // the cursor moves in visible steps, the grid is at full resolution
            let note = cursor_step * seq.step();
            let Some(inst) = seq.instrument_mut() else { return };
            let Some(id) = inst.track_at(track_index).map(|t| t.id()) else { return };
            if let Some(track) = inst.track_mut(id) {
                let velocity = if track.velocity(note) > 0.0 { 0.0 } else { 1.0 };
                track.set_note(note, velocity);
            }
        });
    }

    fn toggle_mute(&mut self) {
        let track_index = self.cursor_track;
        let result = self.with_sequencer(|seq, _| {
            let inst = seq.instrument_mut()?;
            let track = inst.track_at(track_index)?;
            let (id, muted) = (track.id(), track.is_muted());
            Some(inst.set_muted(id, !muted))
        });
        if let Some(Some(Err(e))) = result {
            self.message = e.to_string();
        }
    }

    fn toggle_solo(&mut self) {
        let track_index = self.cursor_track;
        let result = self.with_sequencer(|seq, _| {
            let inst = seq.instrument_mut()?;
            let id = inst.track_at(track_index)?.id();
            let solo = if inst.solo() == Some(id) { None } else { Some(id) };
            Some(inst.set_solo(solo))
        });
        if let Some(Some(Err(e))) = result {
            self.message = e.to_string();
        }
    }

    fn add_sine_track(&mut self) {
        let added = self.with_sequencer(|seq, core| {
            if seq.instrument().is_none() {
                seq.set_instrument(Some(Instrument::new("untitled")), core);
            }
            let inst = seq.instrument_mut()?;
            let n = inst.len() as u32;
            // climb a minor pentatonic-ish ladder from A3
            let frequency = (220.0 * 2f32.powf([0, 3, 5, 7, 10][n as usize % 5] as f32 / 12.0)) as u32
                * (1 + n / 5);
            let patch = Arc::new(Patch::single(
                Sound::SineSynth(SineSynthSound::new(frequency, 0.5)),
                Process::Adsr(AdsrProcess::new(0.02, 0.1, 0.35)),
            ));
            Some(inst.add_track(format!("sine {frequency}"), None, patch).map(|id| (id, frequency)))
        });
        match added.flatten() {
            Some(Ok((id, frequency))) => log::info!("added track {} ({frequency} Hz)", id.0),
            Some(Err(e)) => self.message = e.to_string(),
            None => {}
        }
    }

    fn clear_track(&mut self) {
        let track_index = self.cursor_track;
        self.with_sequencer(|seq, _| {
            let Some(inst) = seq.instrument_mut() else { return };
            let Some(id) = inst.track_at(track_index).map(|t| t.id()) else { return };
            if let Some(track) = inst.track_mut(id) {
                track.clear_notes();
            }
        });
    }

    // the patch is cloned out so the voice starts through the mixer's own lock
    fn audition(&mut self) {
        let track_index = self.cursor_track;
        let patch = self.with_sequencer(|seq, _| {
            let track = seq.instrument()?.track_at(track_index)?;
            Some((Arc::clone(track.patch()), track.volume()))
        });
        if let Some(Some((patch, volume))) = patch {
            match self.mixer.play_patch(&patch, volume) {
                Some(voice) => log::debug!("auditioning track {track_index} as voice {}", voice.0),
                None => self.message = "voice limit reached".into(),
            }
        }
    }

    fn delete_track(&mut self) {
        let track_index = self.cursor_track;
        let removed = self.with_sequencer(|seq, core| {
            let id = seq.instrument()?.track_at(track_index)?.id();
            Some(seq.delete_track(id, core))
        });
        if let Some(Some(true)) = removed {
            self.flash.clear();
            self.message = "track deleted".into();
        }
    }

    /// Write the instrument and a song that points at it.
    pub fn save(&self) -> anyhow::Result<()> {
        let song_dir = self.song_path.parent().unwrap_or_else(|| Path::new(""));
        let instrument_ref = self
            .instrument_path
            .strip_prefix(song_dir)
            .unwrap_or(&self.instrument_path)
            .to_string_lossy()
            .into_owned();

        let song = {
            let state = self.mixer.lock();
            let Some(seq) = state.controller() else {
                anyhow::bail!("no sequencer installed");
            };
            if let Some(inst) = seq.instrument() {
                persistence::save_instrument(&self.instrument_path, inst)?;
            }
            seq.to_song(instrument_ref)
        };
        song.save(&self.song_path)?;
        Ok(())
    }

    fn refresh(&mut self) {
        let voices = self.mixer.num_active_voices();
        let state = self.mixer.lock();
        let Some(seq) = state.controller() else {
            return;
        };
        let step = seq.step();
        let steps = seq.note_count() / step;

        let mut tracks = Vec::new();
        let mut instrument_name = String::new();
        if let Some(inst) = seq.instrument() {
            instrument_name = inst.name.clone();
            for (i, track) in inst.tracks().enumerate() {
                tracks.push(TrackRow {
                    name: track.name.clone(),
                    cells: track.notes().iter().step_by(step).copied().collect(),
                    muted: track.is_muted(),
                    solo: inst.solo() == Some(track.id()),
                    flashing: self.flash.get(i).is_some_and(|&left| left > 0.0),
                });
            }
        }

        self.cursor_track = self.cursor_track.min(tracks.len().saturating_sub(1));
        self.cursor_step = self.cursor_step.min(steps.saturating_sub(1));

        let playhead = (seq.state() != TransportState::Stopped).then(|| self.status.position() / step);
        self.display = DisplayState {
            instrument_name,
            tracks,
            cursor_track: self.cursor_track,
            cursor_step: self.cursor_step,
            playhead,
            steps_per_beat: seq.subdivision() as usize,
            beats_per_measure: seq.beats_per_measure(),
            bpm: seq.bpm(),
            subdivision: seq.subdivision(),
            measures: seq.num_measures(),
            playing: self.status.is_playing(),
            looping: seq.is_looping(),
            metronome: seq.is_metronome_on(),
            beat: (self.beat_flash > 0.0).then_some(self.accent),
            master_volume: state.core().master_volume(),
            voices,
            message: self.message.clone(),
        };
    }
}
