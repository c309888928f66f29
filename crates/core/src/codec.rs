//! PCM16 codec for relay audio payloads.
//!
//! Every audio payload is base64-encoded signed 16-bit little-endian mono PCM
//! at [`SAMPLE_RATE`](crate::SAMPLE_RATE).

use base64::Engine;

/// Why a payload could not be turned into samples.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("payload is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("PCM16 payload has an odd byte length of {0}")]
    OddLength(usize),
    #[error("expected {expected} samples but payload holds {actual}")]
    Truncated { expected: usize, actual: usize },
}

/// Decodes a base64 PCM16 payload into samples normalized to [-1, 1].
///
/// Fails if the payload holds fewer than `expected_samples` samples. Extra
/// samples beyond the expectation are kept.
pub fn decode_pcm16(payload: &str, expected_samples: usize) -> Result<Vec<f32>, DecodeError> {
    let bytes = base64::engine::general_purpose::STANDARD.decode(payload)?;
    if bytes.len() % 2 != 0 {
        return Err(DecodeError::OddLength(bytes.len()));
    }
    let actual = bytes.len() / 2;
    if actual < expected_samples {
        return Err(DecodeError::Truncated {
            expected: expected_samples,
            actual,
        });
    }
    Ok(bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
        .collect())
}

/// Number of samples a payload should carry, judging by its base64 length.
pub fn estimated_samples(payload: &str) -> usize {
    let significant = payload.trim_end_matches('=').len();
    significant * 3 / 4 / 2
}

/// Encodes samples as a base64 PCM16 payload.
pub fn encode_pcm16(samples: &[i16]) -> String {
    let bytes: Vec<u8> = samples
        .iter()
        .flat_map(|sample| sample.to_le_bytes())
        .collect();
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

/// Converts integer samples to the normalized float range used for playback.
pub fn i16_to_f32(samples: &[i16]) -> Vec<f32> {
    samples.iter().map(|&s| s as f32 / 32768.0).collect()
}

/// Converts normalized samples back to PCM16, clamping out-of-range values.
pub fn f32_to_i16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&s| (s * 32768.0).clamp(i16::MIN as f32, i16::MAX as f32) as i16)
        .collect()
}

/// Playback duration in seconds of `sample_count` samples.
pub fn chunk_duration(sample_count: usize) -> f64 {
    sample_count as f64 / crate::SAMPLE_RATE as f64
}
