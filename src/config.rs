use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::audio::DEFAULT_BUFFER_FRAMES;

#[derive(Parser, Debug)]
#[command(name = "synthcity")]
#[command(about = "Step sequencer and sample mixer", long_about = None)]
pub struct Cli {
    /// Instrument file to load at startup
    #[arg(short, long)]
    pub instrument: Option<PathBuf>,

    /// Song file to load at startup (loads its instrument too)
    #[arg(short, long)]
    pub song: Option<PathBuf>,

    /// Hardware buffer size in frames
    #[arg(long, default_value_t = DEFAULT_BUFFER_FRAMES)]
    pub buffer_size: u32,

    /// Tempo in beats per minute (overrides the song)
    #[arg(short, long)]
    pub tempo: Option<u32>,

    /// Grid steps per beat
    #[arg(long)]
    pub subdivision: Option<u32>,

    /// Number of measures (overrides the song)
    #[arg(long)]
    pub measures: Option<u32>,

    /// Beats per measure (overrides the song)
    #[arg(long)]
    pub beats_per_measure: Option<u32>,

    /// Loop back to the start instead of stopping
    #[arg(long = "loop")]
    pub looping: bool,

    /// Click on every beat
    #[arg(long)]
    pub metronome: bool,

    /// Where interactive mode writes its log
    #[arg(long, default_value = "synthcity.log")]
    pub log_file: PathBuf,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Render one pass of the loaded song to a WAV file
    Render {
        /// Output WAV file path
        output: PathBuf,
    },
}
