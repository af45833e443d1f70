use std::path::PathBuf;

/// Failures while building instruments, patches, sounds or songs from disk.
/// These never cross into the audio thread; the loader catches them and
/// skips the offending entity.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("WAV error in '{path}': {source}")]
    Wav {
        path: PathBuf,
        source: hound::Error,
    },

    #[error("unsupported WAV '{path}': {channels} channel(s), {bits}-bit (need mono 16-bit PCM)")]
    UnsupportedWav {
        path: PathBuf,
        channels: u16,
        bits: u16,
    },

    #[error("WAV '{0}' contains only silence")]
    SilentWav(PathBuf),

    #[error("unsupported instrument file version {0}")]
    UnsupportedVersion(u32),

    #[error("patch needs at least one sound and one process")]
    EmptyPatch,

    #[error("duplicate track id {0}")]
    DuplicateTrackId(u32),

    #[error("track id {0} is out of range")]
    TrackIdOutOfRange(u32),

    #[error("no track with id {0}")]
    UnknownTrack(u32),

    #[error("track {0} is muted and cannot be soloed")]
    MutedSolo(u32),
}

#[derive(Debug, thiserror::Error)]
pub enum MixerError {
    #[error("no default output device")]
    NoDevice,

    #[error("failed to query output configs: {0}")]
    Config(#[from] cpal::SupportedStreamConfigsError),

    #[error("device has no stereo {sample_rate}Hz signed 16-bit output")]
    UnsupportedConfig { sample_rate: u32 },

    #[error("failed to build output stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("failed to start output stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),
}
