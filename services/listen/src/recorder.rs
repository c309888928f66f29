//! Writes the mixed conversation to disk.

use chorus_core::{SAMPLE_RATE, codec::f32_to_i16};
use hound::{SampleFormat, WavSpec, WavWriter};
use std::path::Path;
use tracing::debug;

/// Writes `samples` as a 16-bit mono WAV at the relay's sample rate.
pub fn write_wav(path: &Path, samples: &[f32]) -> Result<(), hound::Error> {
    let spec = WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec)?;
    for sample in f32_to_i16(samples) {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;
    debug!(path = %path.display(), samples = samples.len(), "WAV written.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::WavReader;

    #[test]
    fn test_writes_pcm16_mono() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.wav");

        write_wav(&path, &[0.0, 0.5, -1.0, 2.0]).unwrap();

        let mut reader = WavReader::open(&path).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 1);
        assert_eq!(spec.sample_rate, 44_100);
        assert_eq!(spec.bits_per_sample, 16);
        let samples: Vec<i16> = reader.samples::<i16>().map(Result::unwrap).collect();
        assert_eq!(samples.len(), 4);
        assert_eq!(samples[0], 0);
        assert!(samples[1] > 16_000);
        assert!(samples[2] <= -32_767);
        assert_eq!(samples[3], i16::MAX);
    }

    #[test]
    fn test_empty_timeline_is_a_valid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("silence.wav");
        write_wav(&path, &[]).unwrap();
        assert_eq!(WavReader::open(&path).unwrap().len(), 0);
    }
}
