// Types passed between the TUI and the middle layer.
//
// Keys:
//   Space         //  TogglePlay
//   s             //  Stop
//   l / m         //  ToggleLoop / ToggleMetronome
//   arrows        //  CursorLeft / CursorRight / CursorUp / CursorDown
//   Enter         //  ToggleNote
//   + / -         //  TempoUp / TempoDown
//   ] / [         //  SubdivisionUp / SubdivisionDown
//   . / ,         //  MeasuresUp / MeasuresDown
//   > / <         //  BeatsUp / BeatsDown
//   ( / )         //  VolumeDown / VolumeUp
//   u / o         //  ToggleMute / ToggleSolo
//   a / x         //  AddTrack / DeleteTrack
//   c             //  ClearTrack
//   p             //  Audition
//   w             //  Save
//   Esc / q       //  Quit
//
// The TUI only ever reads a DisplayState; all sequencer state lives behind
// the audio lock and is reached through the middle layer.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputEvent {
    TogglePlay,
    Stop,
    ToggleLoop,
    ToggleMetronome,

    CursorLeft,
    CursorRight,
    CursorUp,
    CursorDown,
    ToggleNote,

    TempoUp,
    TempoDown,
    SubdivisionUp,
    SubdivisionDown,
    MeasuresUp,
    MeasuresDown,
    BeatsUp,
    BeatsDown,
    VolumeUp,
    VolumeDown,

    ToggleMute,
    ToggleSolo,
    AddTrack,
    DeleteTrack,
    ClearTrack,
    Audition, // play the track's patch once, right now

    Save,
    Quit,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct TrackRow {
    pub name: String,
    pub cells: Vec<u8>, // velocity at each visible step
    pub muted: bool,
    pub solo: bool,
    pub flashing: bool, // a note just played on this track
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct DisplayState {
    pub instrument_name: String,
    pub tracks: Vec<TrackRow>,
    pub cursor_track: usize,
    pub cursor_step: usize,
    pub playhead: Option<usize>, // visible step under the playhead, None when stopped
    pub steps_per_beat: usize,
    pub beats_per_measure: u32,
    pub bpm: u32,
    pub subdivision: u32,
    pub measures: u32,
    pub playing: bool,
    pub looping: bool,
    pub metronome: bool,
    pub beat: Option<bool>, // lit just after a beat, true on measure starts
    pub master_volume: f32,
    pub voices: u32,
    pub message: String,
}

impl DisplayState {
    pub fn steps(&self) -> usize {
        self.tracks.first().map_or(0, |t| t.cells.len())
    }
}
