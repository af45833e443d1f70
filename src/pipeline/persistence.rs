// Instrument files: load on the GUI thread, then hand the result to the
// sequencer under the audio lock.
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::instrument::{Instrument, TrackId};
use crate::audio::{Patch, ProcessDef, SAMPLE_RATE, SoundDef};
use crate::error::LoadError;

pub const INSTRUMENT_VERSION: u32 = 2;

#[derive(Debug, Serialize, Deserialize)]
struct InstrumentFile {
    version: u32,
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    nextid: Option<u32>,
    // parsed one by one so a bad track only costs that track
    tracks: Vec<serde_json::Value>,
}

#[derive(Debug, Serialize, Deserialize)]
struct TrackDef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<u32>,
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    colorscheme: Option<String>,
    #[serde(default = "full_volume")]
    volume: f32,
    #[serde(default)]
    mute: bool,
    sounds: Vec<SoundDef>,
    processes: Vec<ProcessDef>,
}

fn full_volume() -> f32 {
    1.0
}

pub fn load_instrument(path: &Path) -> Result<Instrument, LoadError> {
    let data = std::fs::read_to_string(path)?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    let instrument = instrument_from_str(&data, base_dir)?;
    log::info!(
        "loaded instrument '{}' from {} ({} tracks)",
        instrument.name,
        path.display(),
        instrument.len()
    );
    Ok(instrument)
}

pub fn instrument_from_str(data: &str, base_dir: &Path) -> Result<Instrument, LoadError> {
    let file: InstrumentFile = serde_json::from_str(data)?;
    if file.version == 0 || file.version > INSTRUMENT_VERSION {
        return Err(LoadError::UnsupportedVersion(file.version));
    }
    let legacy = file.version < 2;
    if legacy {
        log::warn!("instrument '{}' uses deprecated version {} format, ids assigned on load", file.name, file.version);
    }

    let mut instrument = Instrument::new(file.name);
    for (index, value) in file.tracks.into_iter().enumerate() {
        if let Err(e) = load_track(&mut instrument, value, base_dir, legacy) {
            log::warn!("skipping track {index} of '{}': {e}", instrument.name);
        }
    }
    if let Some(next_id) = file.nextid {
        instrument.reserve_ids(next_id);
    }
    Ok(instrument)
}

fn load_track(instrument: &mut Instrument, value: serde_json::Value, base_dir: &Path, legacy: bool) -> Result<(), LoadError> {
    let def: TrackDef = serde_json::from_value(value)?;
    let patch = Arc::new(Patch::from_defs(&def.sounds, &def.processes, base_dir, SAMPLE_RATE)?);

    let id = match def.id {
        Some(id) if !legacy => TrackId(id),
        _ => TrackId(instrument.next_id()),
    };
    let track = instrument.insert_track(id, def.name, def.colorscheme, patch)?;
    track.set_volume(def.volume);
    if def.mute {
        instrument.set_muted(id, true)?;
    }
    Ok(())
}

pub fn save_instrument(path: &Path, instrument: &Instrument) -> Result<(), LoadError> {
    let json = instrument_to_string(instrument)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, json)?;
    log::info!("saved instrument '{}' to {}", instrument.name, path.display());
    Ok(())
}

pub fn instrument_to_string(instrument: &Instrument) -> Result<String, LoadError> {
    let tracks = instrument
        .tracks()
        .map(|track| {
            serde_json::to_value(TrackDef {
                id: Some(track.id().0),
                name: track.name.clone(),
                colorscheme: track.color_scheme.clone(),
                volume: track.volume(),
                mute: track.is_muted(),
                sounds: track.patch().sound_defs(),
                processes: track.patch().process_defs(),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let file = InstrumentFile {
        version: INSTRUMENT_VERSION,
        name: instrument.name.clone(),
        nextid: Some(instrument.next_id()),
        tracks,
    };
    Ok(serde_json::to_string_pretty(&file)?)
}
