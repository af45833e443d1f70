// Tracks and the instrument that owns them. The sequencer owns the active
// instrument inside the audio lock, so every edit here happens under it.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::audio::Patch;
use crate::error::LoadError;

// note grid bytes are velocities in steps of 1/255
pub const VELOCITY_QUANTUM: f32 = 255.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TrackId(pub u32);

#[derive(Debug)]
pub struct Track {
    id: TrackId,
    pub name: String,
    pub color_scheme: Option<String>,
    notes: Vec<u8>, // one byte per subdivision slot, 0 = off
    patch: Arc<Patch>,
    muted: bool,
    volume: f32,
}

impl Track {
    fn new(id: TrackId, name: String, color_scheme: Option<String>, patch: Arc<Patch>, note_count: usize) -> Self {
        Self {
            id,
            name,
            color_scheme,
            notes: vec![0; note_count],
            patch,
            muted: false,
            volume: 1.0,
        }
    }

    pub fn id(&self) -> TrackId {
        self.id
    }

    pub fn notes(&self) -> &[u8] {
        &self.notes
    }

    pub fn patch(&self) -> &Arc<Patch> {
        &self.patch
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
    }

    // 1.0 stores 255, 0.0 clears the slot
    pub fn set_note(&mut self, index: usize, velocity: f32) {
        if let Some(slot) = self.notes.get_mut(index) {
            *slot = (velocity.clamp(0.0, 1.0) * VELOCITY_QUANTUM).round() as u8;
        }
    }

    pub fn velocity(&self, index: usize) -> f32 {
        self.notes.get(index).map_or(0.0, |&v| v as f32 / VELOCITY_QUANTUM)
    }

    pub fn clear_notes(&mut self) {
        self.notes.fill(0);
    }

    // grows with silence or truncates
    fn resize_notes(&mut self, note_count: usize) {
        self.notes.resize(note_count, 0);
    }
}

#[derive(Debug)]
pub struct Instrument {
    pub name: String,
    tracks: BTreeMap<TrackId, Track>,
    next_id: u32,
    solo: Option<TrackId>,
    note_count: usize,
}

impl Instrument {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tracks: BTreeMap::new(),
            next_id: 0,
            solo: None,
            note_count: 0,
        }
    }

    pub fn next_id(&self) -> u32 {
        self.next_id
    }

    // never lowers the counter, so ids are not reused
    pub(crate) fn reserve_ids(&mut self, next_id: u32) {
        self.next_id = self.next_id.max(next_id);
    }

    pub fn add_track(
        &mut self,
        name: impl Into<String>,
        color_scheme: Option<String>,
        patch: Arc<Patch>,
    ) -> Result<TrackId, LoadError> {
        let id = TrackId(self.next_id);
        self.next_id = id.0.checked_add(1).ok_or(LoadError::TrackIdOutOfRange(id.0))?;
        self.tracks
            .insert(id, Track::new(id, name.into(), color_scheme, patch, self.note_count));
        Ok(id)
    }

    // for loaders that carry their own ids
    pub(crate) fn insert_track(
        &mut self,
        id: TrackId,
        name: String,
        color_scheme: Option<String>,
        patch: Arc<Patch>,
    ) -> Result<&mut Track, LoadError> {
        if self.tracks.contains_key(&id) {
            return Err(LoadError::DuplicateTrackId(id.0));
        }
        // the id after this one has to fit as well
        let next_id = id.0.checked_add(1).ok_or(LoadError::TrackIdOutOfRange(id.0))?;
        self.reserve_ids(next_id);
        let track = Track::new(id, name, color_scheme, patch, self.note_count);
        Ok(self.tracks.entry(id).or_insert(track))
    }

    pub fn remove_track(&mut self, id: TrackId) -> Option<Track> {
        if self.solo == Some(id) {
            self.solo = None;
        }
        self.tracks.remove(&id)
    }

    pub fn track(&self, id: TrackId) -> Option<&Track> {
        self.tracks.get(&id)
    }

    pub fn track_mut(&mut self, id: TrackId) -> Option<&mut Track> {
        self.tracks.get_mut(&id)
    }

    // in id order, which is creation order
    pub fn tracks(&self) -> impl Iterator<Item = &Track> {
        self.tracks.values()
    }

    pub fn track_at(&self, index: usize) -> Option<&Track> {
        self.tracks.values().nth(index)
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn note_count(&self) -> usize {
        self.note_count
    }

    pub fn resize_notes(&mut self, note_count: usize) {
        self.note_count = note_count;
        for track in self.tracks.values_mut() {
            track.resize_notes(note_count);
        }
    }

    pub fn solo(&self) -> Option<TrackId> {
        self.solo
    }

    pub fn set_solo(&mut self, id: Option<TrackId>) -> Result<(), LoadError> {
        if let Some(id) = id {
            let track = self.tracks.get(&id).ok_or(LoadError::UnknownTrack(id.0))?;
            if track.muted {
                return Err(LoadError::MutedSolo(id.0));
            }
        }
        self.solo = id;
        Ok(())
    }

    pub fn set_muted(&mut self, id: TrackId, muted: bool) -> Result<(), LoadError> {
        let track = self.tracks.get_mut(&id).ok_or(LoadError::UnknownTrack(id.0))?;
        track.muted = muted;
        if muted && self.solo == Some(id) {
            self.solo = None;
        }
        Ok(())
    }

    pub fn is_audible(&self, track: &Track) -> bool {
        !track.muted && self.solo.is_none_or(|solo| solo == track.id)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::audio::{DecayProcess, Process, SineSynthSound, Sound};

    pub(crate) fn sine_patch(frequency: u32) -> Arc<Patch> {
        Arc::new(Patch::single(
            Sound::SineSynth(SineSynthSound::new(frequency, 0.25)),
            Process::Decay(DecayProcess::new(0.5)),
        ))
    }

    #[test]
    fn ids_run_out_instead_of_wrapping() {
        let mut inst = Instrument::new("kit");
        inst.reserve_ids(u32::MAX - 1);
        assert_eq!(inst.add_track("last", None, sine_patch(60)).unwrap(), TrackId(u32::MAX - 1));
        assert!(matches!(
            inst.add_track("one more", None, sine_patch(60)),
            Err(LoadError::TrackIdOutOfRange(_))
        ));
        assert!(inst.insert_track(TrackId(u32::MAX), "top".into(), None, sine_patch(60)).is_err());
        assert_eq!(inst.len(), 1);
    }

    #[test]
    fn velocity_quantization() {
        let mut inst = Instrument::new("kit");
        inst.resize_notes(8);
        let id = inst.add_track("kick", None, sine_patch(60)).unwrap();
        let track = inst.track_mut(id).unwrap();

        track.set_note(3, 1.0);
        assert_eq!(track.notes()[3], 255);
        assert_eq!(track.velocity(3), 1.0);
        track.set_note(3, 0.0);
        assert_eq!(track.notes()[3], 0);
        track.set_note(4, 0.5);
        assert_eq!(track.notes()[4], 128);
        // out of range is ignored
        track.set_note(99, 1.0);
        assert_eq!(track.notes().len(), 8);
    }

    #[test]
    fn ids_are_never_reused() {
        let mut inst = Instrument::new("kit");
        let a = inst.add_track("a", None, sine_patch(100)).unwrap();
        let b = inst.add_track("b", None, sine_patch(200)).unwrap();
        inst.remove_track(b);
        let c = inst.add_track("c", None, sine_patch(300)).unwrap();

        assert_eq!((a, b, c), (TrackId(0), TrackId(1), TrackId(2)));
        let names: Vec<_> = inst.tracks().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["a", "c"]);
        assert_eq!(inst.track_at(1).unwrap().id(), c);
    }

    #[test]
    fn resize_keeps_existing_notes_and_zero_fills() {
        let mut inst = Instrument::new("kit");
        inst.resize_notes(4);
        let id = inst.add_track("hat", None, sine_patch(8000)).unwrap();
        inst.track_mut(id).unwrap().set_note(1, 1.0);

        inst.resize_notes(8);
        assert_eq!(inst.track(id).unwrap().notes(), &[0, 255, 0, 0, 0, 0, 0, 0]);
        inst.resize_notes(1);
        assert_eq!(inst.track(id).unwrap().notes(), &[0]);
        // new tracks get the current length
        let other = inst.add_track("snare", None, sine_patch(200)).unwrap();
        assert_eq!(inst.track(other).unwrap().notes().len(), 1);
    }

    #[test]
    fn solo_must_reference_an_unmuted_track() {
        let mut inst = Instrument::new("kit");
        let a = inst.add_track("a", None, sine_patch(100)).unwrap();
        let b = inst.add_track("b", None, sine_patch(200)).unwrap();

        assert!(matches!(inst.set_solo(Some(TrackId(9))), Err(LoadError::UnknownTrack(9))));
        inst.set_muted(b, true).unwrap();
        assert!(matches!(inst.set_solo(Some(b)), Err(LoadError::MutedSolo(1))));

        inst.set_solo(Some(a)).unwrap();
        assert!(inst.is_audible(inst.track(a).unwrap()));
        inst.set_muted(b, false).unwrap();
        assert!(!inst.is_audible(inst.track(b).unwrap()));

        // muting or removing the solo track clears solo
        inst.set_muted(a, true).unwrap();
        assert_eq!(inst.solo(), None);
        inst.set_muted(a, false).unwrap();
        inst.set_solo(Some(a)).unwrap();
        inst.remove_track(a);
        assert_eq!(inst.solo(), None);
    }

    #[test]
    fn inserting_duplicate_ids_fails() {
        let mut inst = Instrument::new("kit");
        inst.insert_track(TrackId(5), "x".into(), None, sine_patch(1)).unwrap();
        assert!(inst.insert_track(TrackId(5), "y".into(), None, sine_patch(2)).is_err());
        assert_eq!(inst.next_id(), 6);
    }
}
