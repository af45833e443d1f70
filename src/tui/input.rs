use std::time::Duration;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crate::shared::InputEvent;

// poll for a key press from the terminal and map it to an input event
pub fn poll_input(timeout: Duration) -> anyhow::Result<Vec<InputEvent>> {
    if !event::poll(timeout)? {
        return Ok(vec![]);
    }

    if let Event::Key(key) = event::read()? {
        if key.kind != KeyEventKind::Press {
            return Ok(vec![]);
        }
        return Ok(handle_key(key.code).into_iter().collect());
    }
    Ok(vec![])
}

fn handle_key(code: KeyCode) -> Option<InputEvent> {
    let event = match code {
        KeyCode::Esc | KeyCode::Char('q') => InputEvent::Quit,

        // transport
        KeyCode::Char(' ') => InputEvent::TogglePlay,
        KeyCode::Char('s') => InputEvent::Stop,
        KeyCode::Char('l') => InputEvent::ToggleLoop,
        KeyCode::Char('m') => InputEvent::ToggleMetronome,

        // note grid
        KeyCode::Left => InputEvent::CursorLeft,
        KeyCode::Right => InputEvent::CursorRight,
        KeyCode::Up => InputEvent::CursorUp,
        KeyCode::Down => InputEvent::CursorDown,
        KeyCode::Enter => InputEvent::ToggleNote,

        // tempo and grid shape
        KeyCode::Char('+' | '=') => InputEvent::TempoUp,
        KeyCode::Char('-') => InputEvent::TempoDown,
        KeyCode::Char(']') => InputEvent::SubdivisionUp,
        KeyCode::Char('[') => InputEvent::SubdivisionDown,
        KeyCode::Char('.') => InputEvent::MeasuresUp,
        KeyCode::Char(',') => InputEvent::MeasuresDown,
        KeyCode::Char('>') => InputEvent::BeatsUp,
        KeyCode::Char('<') => InputEvent::BeatsDown,
        KeyCode::Char(')') => InputEvent::VolumeUp,
        KeyCode::Char('(') => InputEvent::VolumeDown,

        // tracks
        KeyCode::Char('u') => InputEvent::ToggleMute,
        KeyCode::Char('o') => InputEvent::ToggleSolo,
        KeyCode::Char('a') => InputEvent::AddTrack,
        KeyCode::Char('x') => InputEvent::DeleteTrack,
        KeyCode::Char('c') => InputEvent::ClearTrack,
        KeyCode::Char('p') => InputEvent::Audition,

        KeyCode::Char('w') => InputEvent::Save,
        _ => return None,
    };
    Some(event)
}
