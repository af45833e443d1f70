use std::path::Path;

use crate::error::LoadError;

// samples quieter than this at either end of the file are trimmed away
const TRIM_THRESHOLD: f32 = 16.0 / 32768.0;

// Decoded, trimmed mono audio owned by a WavSound
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SampleBuffer {
    pub data: Vec<f32>, // the audio data array, one value per frame
}

impl SampleBuffer {
    pub fn new(data: Vec<f32>) -> Self {
        Self { data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    // Load a mono 16-bit WAV file from disk into the sample buffer
    pub fn load_wav(path: &Path, target_rate: u32) -> Result<Self, LoadError> {
        let wav_err = |source| LoadError::Wav { path: path.to_path_buf(), source };
        let mut reader = hound::WavReader::open(path).map_err(wav_err)?;
        let spec = reader.spec();

        // no conversion here, the mixer only knows how to play mono 16-bit data
        if spec.channels != 1
            || spec.bits_per_sample != 16
            || spec.sample_format != hound::SampleFormat::Int
        {
            return Err(LoadError::UnsupportedWav {
                path: path.to_path_buf(),
                channels: spec.channels,
                bits: spec.bits_per_sample,
            });
        }

        let samples: Vec<f32> = reader
            .samples::<i16>()
            .map(|s| s.map(|x| x as f32 / 32768.0))
            .collect::<Result<Vec<_>, _>>()
            .map_err(wav_err)?;

        let mut data = trim_silence(&samples).to_vec();
        if data.is_empty() {
            return Err(LoadError::SilentWav(path.to_path_buf()));
        }

        if spec.sample_rate != target_rate {
            data = resample_linear(&data, spec.sample_rate, target_rate);
        }

        Ok(Self::new(data))
    }
}

fn trim_silence(samples: &[f32]) -> &[f32] {
    let audible = |s: &f32| s.abs() > TRIM_THRESHOLD;
    match (samples.iter().position(audible), samples.iter().rposition(audible)) {
        (Some(start), Some(end)) => &samples[start..=end],
        _ => &[],
    }
}

fn resample_linear(frames: &[f32], source_rate: u32, target_rate: u32) -> Vec<f32> {
    if source_rate == target_rate {
        return frames.to_vec();
    }
    let ratio = target_rate as f64 / source_rate as f64;
    let out_len = (frames.len() as f64 * ratio).ceil() as usize;
    let mut out = Vec::with_capacity(out_len);

    for i in 0..out_len {
        // fractional position in the source buffer
        let src_pos = i as f64 / ratio; // ex. 3.7
        let idx = src_pos.floor() as usize; // ex. 3
        let frac = (src_pos - idx as f64) as f32; // ex. 0.7
        if idx >= frames.len().saturating_sub(1) { // edge case
            out.push(frames.last().copied().unwrap_or(0.0));
        } else {
            out.push(frames[idx] * (1.0 - frac) + frames[idx + 1] * frac);
        }
    }
    out
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::path::PathBuf;

    pub(crate) fn write_wav(dir: &Path, name: &str, spec: hound::WavSpec, samples: &[i16]) -> PathBuf {
        let path = dir.join(name);
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for &s in samples {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();
        path
    }

    pub(crate) fn mono16(sample_rate: u32) -> hound::WavSpec {
        hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        }
    }

    #[test]
    fn loads_and_trims_mono_wav() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_wav(dir.path(), "kick.wav", mono16(44100), &[0, 0, 16384, -16384, 8192, 0, 0]);

        let buffer = SampleBuffer::load_wav(&path, 44100).unwrap();
        assert_eq!(buffer.data, vec![0.5, -0.5, 0.25]);
    }

    #[test]
    fn rejects_stereo_wav() {
        let dir = tempfile::tempdir().unwrap();
        let spec = hound::WavSpec { channels: 2, ..mono16(44100) };
        let path = write_wav(dir.path(), "stereo.wav", spec, &[100, 100, 200, 200]);

        let err = SampleBuffer::load_wav(&path, 44100).unwrap_err();
        assert!(matches!(err, LoadError::UnsupportedWav { channels: 2, bits: 16, .. }));
    }

    #[test]
    fn rejects_silent_wav() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_wav(dir.path(), "silence.wav", mono16(44100), &[0; 32]);

        assert!(matches!(SampleBuffer::load_wav(&path, 44100), Err(LoadError::SilentWav(_))));
    }

    #[test]
    fn missing_file_is_a_wav_error() {
        let err = SampleBuffer::load_wav(Path::new("/nonexistent/nope.wav"), 44100).unwrap_err();
        assert!(matches!(err, LoadError::Wav { .. }));
    }

    #[test]
    fn resamples_to_target_rate() {
        let dir = tempfile::tempdir().unwrap();
        let samples = vec![8000i16; 100];
        let path = write_wav(dir.path(), "low.wav", mono16(22050), &samples);

        let buffer = SampleBuffer::load_wav(&path, 44100).unwrap();
        assert_eq!(buffer.len(), 200);
        assert!(buffer.data.iter().all(|&s| (s - 8000.0 / 32768.0).abs() < 1e-6));
    }
}
