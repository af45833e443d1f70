// A song file: which instrument to use, the transport setup and the notes.
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::instrument::{Instrument, TrackId};
use super::persistence;
use crate::error::LoadError;
use crate::sequencer::MAX_BEAT_SUBDIVISIONS;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Song {
    pub instrument: String, // name or path, relative to the song file
    pub tempo: u32,
    pub measures: u32,
    pub beats_per_measure: u32,
    pub notes: Vec<SongNote>,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SongNote {
    pub beat: f32, // 1-based, fraction is the position inside the beat
    pub track: u32,
    pub velocity: f32,
}

impl SongNote {
    pub fn position(&self) -> Option<usize> {
        let slot = ((self.beat - 1.0) * MAX_BEAT_SUBDIVISIONS as f32).round();
        (slot >= 0.0).then_some(slot as usize)
    }

    pub fn from_position(position: usize, track: TrackId, velocity: f32) -> Self {
        Self {
            beat: position as f32 / MAX_BEAT_SUBDIVISIONS as f32 + 1.0,
            track: track.0,
            velocity,
        }
    }
}

impl Song {
    pub fn load(path: &Path) -> Result<Self, LoadError> {
        let data = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), LoadError> {
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        log::info!("saved song to {}", path.display());
        Ok(())
    }

    // "drums" -> <song dir>/drums.json, "kits/a.json" -> <song dir>/kits/a.json
    pub fn instrument_path(&self, song_path: &Path) -> PathBuf {
        let mut path = song_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(&self.instrument);
        if path.extension().is_none() {
            path.set_extension("json");
        }
        path
    }

    pub fn load_instrument(&self, song_path: &Path) -> Result<Instrument, LoadError> {
        persistence::load_instrument(&self.instrument_path(song_path))
    }

    /// Write the notes into an instrument whose grid is already sized for
    /// this song. Returns how many notes were skipped.
    pub fn write_notes(&self, instrument: &mut Instrument) -> usize {
        let mut skipped = 0;
        for note in &self.notes {
            let Some(position) = note.position().filter(|&p| p < instrument.note_count()) else {
                log::warn!("song note at beat {} is outside the grid, skipping", note.beat);
                skipped += 1;
                continue;
            };
            let Some(track) = instrument.track_mut(TrackId(note.track)) else {
                log::warn!("song note references unknown track {}, skipping", note.track);
                skipped += 1;
                continue;
            };
            track.set_note(position, note.velocity);
        }
        skipped
    }

    // every nonzero slot of every track, in track then position order
    pub fn collect_notes(instrument: &Instrument) -> Vec<SongNote> {
        instrument
            .tracks()
            .flat_map(|track| {
                track
                    .notes()
                    .iter()
                    .enumerate()
                    .filter(|(_, v)| **v != 0)
                    .map(move |(pos, _)| SongNote::from_position(pos, track.id(), track.velocity(pos)))
            })
            .collect()
    }
}
