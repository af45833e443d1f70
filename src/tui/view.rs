use crate::shared::DisplayState;
use ratatui::layout::{Layout, Direction, Constraint, Rect};
use ratatui::style::{Color, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph};
use ratatui::Frame;

use super::grid;

const HELP: &str = "space play/pause  s stop  l loop  m click  ←→↑↓ move  enter note  +/- tempo  \
[/] subdiv  ,/. measures  </> beats  (/) volume  u mute  o solo  a add  x delete  c clear  p audition  \
w save  q quit";

pub fn render(frame: &mut Frame, area: Rect, state: &DisplayState) {
    let sections = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // transport readout
            Constraint::Min(4), // note grid
            Constraint::Length(3), // message + key help
        ])
        .split(area);

    draw_transport(frame, sections[0], state);
    grid::draw_note_grid(frame, sections[1], state);
    draw_footer(frame, sections[2], state);
}

fn draw_transport(frame: &mut Frame, area: Rect, state: &DisplayState) {
    let (icon, icon_color) = if state.playing {
        ("▶ PLAY", Color::Green)
    } else if state.playhead.is_some() {
        ("‖ PAUSE", Color::Yellow)
    } else {
        ("■ STOP", Color::Gray)
    };
    let toggle = |on: bool| if on { Color::Cyan } else { Color::DarkGray };
    let beat = match state.beat {
        Some(true) => Span::styled(" ● ", Style::default().fg(Color::LightRed)),
        Some(false) => Span::styled(" ● ", Style::default().fg(Color::White)),
        None => Span::raw("   "),
    };

    let line = Line::from(vec![
        Span::styled(icon, Style::default().fg(icon_color)),
        beat,
        Span::raw(format!(
            "{} bpm   1/{}   {} bars of {}   vol {:>3}%   voices {:>2}   ",
            state.bpm,
            state.subdivision,
            state.measures,
            state.beats_per_measure,
            (state.master_volume * 100.0).round(),
            state.voices
        )),
        Span::styled("LOOP ", Style::default().fg(toggle(state.looping))),
        Span::styled("CLICK", Style::default().fg(toggle(state.metronome))),
    ]);
    let block = Block::default().borders(Borders::ALL).title(" synthcity ");
    frame.render_widget(Paragraph::new(line).block(block), area);
}

fn draw_footer(frame: &mut Frame, area: Rect, state: &DisplayState) {
    let lines = vec![
        Line::from(Span::styled(state.message.clone(), Style::default().fg(Color::Yellow))),
        Line::from(Span::styled(HELP, Style::default().fg(Color::DarkGray))),
    ];
    frame.render_widget(Paragraph::new(lines).block(Block::default().borders(Borders::TOP)), area);
}
