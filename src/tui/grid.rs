use crate::shared::DisplayState;
use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph};
use ratatui::Frame;

const NAME_WIDTH: usize = 12;

// one row per track: name column, then a cell per visible step with a bar
// between beats
pub fn draw_note_grid(frame: &mut Frame, area: Rect, state: &DisplayState) {
    let lines: Vec<Line> = state
        .tracks
        .iter()
        .enumerate()
        .map(|(row, track)| {
            let mut spans = vec![track_label(row, state)];
            for (step, &velocity) in track.cells.iter().enumerate() {
                if step > 0 && step % state.steps_per_beat.max(1) == 0 {
                    spans.push(Span::styled("|", Style::default().fg(Color::DarkGray)));
                }
                spans.push(cell(row, step, velocity, state));
            }
            Line::from(spans)
        })
        .collect();

    let title = format!(" {} ", state.instrument_name);
    let grid = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title(title));
    frame.render_widget(grid, area);
}

fn track_label(row: usize, state: &DisplayState) -> Span<'static> {
    let track = &state.tracks[row];
    let flag = match (track.muted, track.solo) {
        (true, _) => 'M',
        (_, true) => 'S',
        _ => ' ',
    };
    let mut name: String = track.name.chars().take(NAME_WIDTH - 2).collect();
    name = format!("{flag} {name:<width$}", width = NAME_WIDTH - 2);

    let mut style = Style::default();
    if track.flashing {
        style = style.fg(Color::Black).bg(Color::LightMagenta);
    } else if track.muted {
        style = style.fg(Color::DarkGray);
    }
    if row == state.cursor_track {
        style = style.add_modifier(Modifier::BOLD);
    }
    Span::styled(name, style)
}

fn cell(row: usize, step: usize, velocity: u8, state: &DisplayState) -> Span<'static> {
    let on = velocity > 0;
    let mut style = if on {
        // brighter for louder notes
        let color = if velocity > 170 { Color::LightMagenta } else { Color::Magenta };
        Style::default().fg(color)
    } else {
        Style::default().fg(Color::DarkGray)
    };
    if state.playhead == Some(step) {
        style = style.bg(Color::Rgb(40, 40, 60));
    }
    if row == state.cursor_track && step == state.cursor_step {
        style = style.add_modifier(Modifier::REVERSED);
    }
    Span::styled(if on { "██" } else { "··" }, style)
}
