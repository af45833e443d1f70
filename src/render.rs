// Offline bounce: drive the same mixer and sequencer without a device and
// write what comes out to a WAV file.
use std::path::Path;

use anyhow::{Context, bail};

use crate::audio::{CHANNELS, Mixer, SAMPLE_RATE};
use crate::sequencer::Sequencer;

pub const MAX_RENDER_SECONDS: u32 = 600;
const BLOCK_FRAMES: usize = 1024;

/// Play the loaded song once from the top, keep going until every voice has
/// rung out, and write the result as 16-bit stereo. Returns frames written.
pub fn render_to_wav(mixer: &Mixer<Sequencer>, path: &Path) -> anyhow::Result<usize> {
    let status = {
        let mut state = mixer.lock();
        let (seq, core) = state.split_mut();
        let Some(seq) = seq else {
            bail!("no sequencer installed");
        };
        if seq.instrument().is_none_or(|i| i.is_empty()) {
            bail!("nothing to render: no instrument tracks loaded");
        }
        seq.set_looping(false);
        seq.stop();
        seq.play(core);
        seq.status()
    };

    let spec = hound::WavSpec {
        channels: CHANNELS as u16,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)
        .with_context(|| format!("failed to create {}", path.display()))?;

    let max_frames = (MAX_RENDER_SECONDS * SAMPLE_RATE) as usize;
    let mut block = vec![0i16; BLOCK_FRAMES * CHANNELS];
    let mut frames = 0;
    while frames < max_frames {
        mixer.render(&mut block);
        for &sample in &block {
            writer.write_sample(sample)?;
        }
        frames += BLOCK_FRAMES;
        if !status.is_playing() && mixer.num_active_voices() == 0 {
            break;
        }
    }
    if frames >= max_frames {
        log::warn!("render hit the {MAX_RENDER_SECONDS}s cap, output is truncated");
    }

    writer.finalize()?;
    log::info!(
        "rendered {:.2}s to {}",
        frames as f32 / SAMPLE_RATE as f32,
        path.display()
    );
    Ok(frames)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::instrument::Instrument;
    use crate::pipeline::instrument::tests::sine_patch;
    use crate::sequencer::interval;

    fn one_beat_mixer(notes: &[usize]) -> Mixer<Sequencer> {
        let mixer = Mixer::offline();
        mixer.set_controller(Some(Sequencer::new()));
        {
            let mut state = mixer.lock();
            let (seq, core) = state.split_mut();
            let seq = seq.unwrap();
            seq.set_num_measures(1);
            seq.set_beats_per_measure(1);
            let mut inst = Instrument::new("r");
            let id = inst.add_track("sine", None, sine_patch(440)).unwrap();
            seq.set_instrument(Some(inst), core);
            let track = seq.instrument_mut().unwrap().track_mut(id).unwrap();
            for &n in notes {
                track.set_note(n, 1.0);
            }
        }
        mixer
    }

    #[test]
    fn renders_one_pass_and_the_tail() {
        let mixer = one_beat_mixer(&[0, 24]);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.wav");

        let frames = render_to_wav(&mixer, &path).unwrap();

        let reader = hound::WavReader::open(&path).unwrap();
        let spec = reader.spec();
        assert_eq!((spec.channels, spec.sample_rate, spec.bits_per_sample), (2, 44100, 16));
        assert_eq!(reader.len() as usize, frames * CHANNELS);
        // four steps at 1/4, plus the last note's quarter-beat ring
        assert!(frames >= 4 * interval(120, 4) as usize);
        assert!(frames < SAMPLE_RATE as usize * 2);

        let samples: Vec<i16> = reader.into_samples().map(|s| s.unwrap()).collect();
        assert!(samples.iter().any(|&s| s != 0));
        assert_eq!(mixer.num_active_voices(), 0);
        assert!(!mixer.lock().controller().unwrap().is_playing());
    }

    #[test]
    fn refuses_empty_instrument() {
        let mixer = Mixer::offline();
        mixer.set_controller(Some(Sequencer::new()));
        let dir = tempfile::tempdir().unwrap();
        assert!(render_to_wav(&mixer, &dir.path().join("x.wav")).is_err());
    }
}
