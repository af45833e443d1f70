mod audio;
mod config;
mod error;
mod loader;
mod middle;
mod pipeline;
mod render;
mod sequencer;
mod shared;
mod tui;

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Context;
use clap::Parser;
use crossterm::terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;

use audio::Mixer;
use config::{Cli, Command};
use middle::Middle;
use pipeline::instrument::Instrument;
use pipeline::persistence;
use pipeline::song::Song;
use sequencer::Sequencer;
use shared::InputEvent;

fn main() {
    if let Err(e) = run() {
        log::error!("{e:#}");
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli)?;

    match &cli.command {
        Some(Command::Render { output }) => {
            let mixer = Mixer::offline();
            setup(&mixer, &cli)?;
            render::render_to_wav(&mixer, output)?;
            Ok(())
        }
        None => run_interactive(&cli),
    }
}

// the terminal is raw while the TUI runs, so interactive logs go to a file
fn init_logging(cli: &Cli) -> anyhow::Result<()> {
    let mut builder = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    builder.format_timestamp_millis();
    if cli.command.is_none() {
        let file = std::fs::File::create(&cli.log_file)
            .with_context(|| format!("failed to create log file {}", cli.log_file.display()))?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }
    builder.init();
    log::info!("synthcity starting up");
    Ok(())
}

struct SessionPaths {
    song: PathBuf,
    instrument: PathBuf,
}

/// Load whatever the command line names and configure a fresh sequencer
/// with it. Files are read before the audio lock is taken.
fn setup(mixer: &Mixer<Sequencer>, cli: &Cli) -> anyhow::Result<SessionPaths> {
    let song = match &cli.song {
        Some(path) => Some(Song::load(path).with_context(|| format!("failed to load song {}", path.display()))?),
        None => None,
    };
    let song_path = cli.song.clone().unwrap_or_else(|| PathBuf::from("song.json"));
    let instrument_path = match (&cli.instrument, &song) {
        (Some(path), _) => path.clone(),
        (None, Some(song)) => song.instrument_path(&song_path),
        (None, None) => song_path.parent().unwrap_or_else(|| Path::new("")).join("instrument.json"),
    };
    let instrument = if cli.instrument.is_some() || song.is_some() {
        Some(load_instrument(&instrument_path)?)
    } else {
        None
    };

    mixer.set_controller(Some(Sequencer::new()));
    let mut state = mixer.lock();
    let (seq, core) = state.split_mut();
    let seq = seq.context("sequencer missing after install")?;

    match (song, instrument) {
        (Some(song), Some(instrument)) => {
            let skipped = seq.load_song(&song, instrument, core);
            if skipped > 0 {
                log::warn!("{skipped} song notes did not fit and were dropped");
            }
            log::info!("loaded song {} ({} notes)", song_path.display(), song.notes.len() - skipped);
        }
        (None, Some(instrument)) => {
            seq.set_instrument(Some(instrument), core);
        }
        _ => {}
    }

    if let Some(bpm) = cli.tempo {
        seq.set_beats_per_minute(bpm, core);
    }
    if let Some(subdivision) = cli.subdivision {
        seq.set_subdivision(subdivision, core);
    }
    if let Some(measures) = cli.measures {
        seq.set_num_measures(measures);
    }
    if let Some(beats) = cli.beats_per_measure {
        seq.set_beats_per_measure(beats);
    }
    seq.set_looping(cli.looping);
    seq.set_metronome(cli.metronome);

    Ok(SessionPaths {
        song: song_path,
        instrument: instrument_path,
    })
}

fn load_instrument(path: &Path) -> anyhow::Result<Instrument> {
    persistence::load_instrument(path).with_context(|| format!("failed to load instrument {}", path.display()))
}

fn run_interactive(cli: &Cli) -> anyhow::Result<()> {
    let mixer = Mixer::<Sequencer>::init(cli.buffer_size).context("failed to open audio output")?;
    let paths = setup(&mixer, cli)?;
    let mut middle = Middle::new(mixer, paths.song, paths.instrument);

    terminal::enable_raw_mode()?;
    let _guard = RawModeGuard; // auto drops when out of scope
    crossterm::execute!(std::io::stdout(), terminal::EnterAlternateScreen)?;

    let backend = CrosstermBackend::new(std::io::stdout());
    let mut term = Terminal::new(backend)?;
    term.clear()?;

    let tick_rate = std::time::Duration::from_millis(16); // ~60fps
    let mut last_tick = Instant::now();

    loop {
        let ds = middle.display_state().clone();
        term.draw(|frame| {
            tui::view::render(frame, frame.area(), &ds);
        })?;

        for event in tui::input::poll_input(tick_rate)? {
            if event == InputEvent::Quit {
                log::info!("quitting");
                return Ok(());
            }
            middle.handle_input(event);
        }

        let elapsed = last_tick.elapsed().as_secs_f64();
        last_tick = Instant::now();
        middle.tick(elapsed);
    }
}

struct RawModeGuard;
impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = crossterm::execute!(std::io::stdout(), terminal::LeaveAlternateScreen);
        let _ = terminal::disable_raw_mode();
    }
}
