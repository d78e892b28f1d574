//! PCM16 conversion helpers shared by the capture and playback pipelines.
//!
//! Wire audio is 16-bit signed little-endian PCM, mono, base64 encoded.
//! Device audio is `f32` in `[-1.0, 1.0]`.

use base64::prelude::*;

use super::{AudioError, AudioResult};

/// Microphone sample rate expected by the upstream service.
pub const CAPTURE_SAMPLE_RATE: u32 = 16_000;

/// Sample rate of audio produced by the upstream service.
pub const PLAYBACK_SAMPLE_RATE: u32 = 24_000;

/// MIME type attached to realtime input chunks.
pub const PCM_MIME_TYPE: &str = "audio/pcm";

const PCM16_SCALE: f32 = 32768.0;

/// Convert one float sample to PCM16, clamping to `[-1.0, 1.0]` first.
///
/// Non-finite input is treated as silence.
#[inline]
pub fn f32_to_pcm16(sample: f32) -> i16 {
    if !sample.is_finite() {
        return 0;
    }
    let clamped = sample.clamp(-1.0, 1.0);
    (clamped * PCM16_SCALE)
        .round()
        .clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

/// Convert one PCM16 sample to float by dividing by 32768.
#[inline]
pub fn pcm16_to_f32(sample: i16) -> f32 {
    sample as f32 / PCM16_SCALE
}

/// Pack a block of float samples as little-endian PCM16 bytes.
pub fn encode_pcm16_le(samples: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        bytes.extend_from_slice(&f32_to_pcm16(sample).to_le_bytes());
    }
    bytes
}

/// Unpack little-endian PCM16 bytes into float samples.
///
/// A trailing odd byte is ignored.
pub fn decode_pcm16_le(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|pair| pcm16_to_f32(i16::from_le_bytes([pair[0], pair[1]])))
        .collect()
}

/// Capture side: float block -> base64 PCM16 payload.
pub fn samples_to_base64(samples: &[f32]) -> String {
    BASE64_STANDARD.encode(encode_pcm16_le(samples))
}

/// Playback side: base64 PCM16 payload -> float samples.
pub fn base64_to_samples(payload: &str) -> AudioResult<Vec<f32>> {
    let bytes = BASE64_STANDARD
        .decode(payload.trim())
        .map_err(|e| AudioError::InvalidFrame(format!("invalid base64 audio: {e}")))?;
    Ok(decode_pcm16_le(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    const STEP: f32 = 1.0 / 32768.0;

    #[test]
    fn test_clamps_out_of_range_samples() {
        assert_eq!(f32_to_pcm16(1.5), i16::MAX);
        assert_eq!(f32_to_pcm16(-1.5), i16::MIN);
        assert_eq!(f32_to_pcm16(f32::NAN), 0);
        assert_eq!(f32_to_pcm16(0.0), 0);
    }

    #[test]
    fn test_round_trip_within_one_step() {
        let block: Vec<f32> = (0..2048)
            .map(|i| ((i as f32) * 0.013).sin() * 0.999)
            .chain([1.0, -1.0, 0.5, -0.5, 0.25, 1e-6, -1e-6])
            .collect();

        let decoded = base64_to_samples(&samples_to_base64(&block)).unwrap();
        assert_eq!(decoded.len(), block.len());
        for (original, restored) in block.iter().zip(decoded.iter()) {
            assert!(
                (original - restored).abs() <= STEP + f32::EPSILON,
                "{original} vs {restored}"
            );
        }
    }

    #[test]
    fn test_little_endian_layout() {
        let bytes = encode_pcm16_le(&[pcm16_to_f32(0x0102), pcm16_to_f32(-2)]);
        assert_eq!(bytes, vec![0x02, 0x01, 0xFE, 0xFF]);
    }

    #[test]
    fn test_decode_divides_by_32768() {
        let bytes = [0x00, 0x80, 0xFF, 0x7F, 0x00, 0x40];
        let samples = decode_pcm16_le(&bytes);
        assert_eq!(samples, vec![-1.0, 32767.0 / 32768.0, 0.5]);
    }

    #[test]
    fn test_odd_trailing_byte_ignored() {
        assert_eq!(decode_pcm16_le(&[0x00, 0x40, 0x11]).len(), 1);
    }

    #[test]
    fn test_invalid_base64_rejected() {
        let result = base64_to_samples("not base64 !!");
        assert!(matches!(result, Err(AudioError::InvalidFrame(_))));
    }
}
