//! PCM16 wire format and signal-energy helpers
//!
//! The service consumes 16-bit signed little-endian mono PCM, base64-encoded
//! and tagged with its sample rate. Conversion is asymmetric on purpose:
//! negative samples scale by 32768, non-negative by 32767, so both rails map
//! exactly onto the i16 range.

use crate::error::{LiveError, LiveResult};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

/// A base64 PCM16 payload tagged with its sample rate, ready for transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PcmPayload {
    /// Base64-encoded little-endian i16 samples.
    pub data: String,
    /// MIME tag, e.g. `audio/pcm;rate=16000`.
    pub mime_type: String,
}

/// Convert float samples to i16, clamping to [-1.0, 1.0] first.
pub fn f32_to_i16(sample: f32) -> i16 {
    let s = sample.clamp(-1.0, 1.0);
    if s < 0.0 {
        (s * 32768.0) as i16
    } else {
        (s * 32767.0) as i16
    }
}

/// Encode a frame of float samples as a transport payload.
pub fn encode_pcm16(samples: &[f32], sample_rate: u32) -> PcmPayload {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        bytes.extend_from_slice(&f32_to_i16(sample).to_le_bytes());
    }
    PcmPayload {
        data: BASE64.encode(&bytes),
        mime_type: format!("audio/pcm;rate={sample_rate}"),
    }
}

/// Decode little-endian PCM16 bytes back to normalized floats.
pub fn decode_pcm16(bytes: &[u8]) -> LiveResult<Vec<f32>> {
    if bytes.len() % 2 != 0 {
        return Err(LiveError::Decode(format!(
            "PCM16 payload has odd length {}",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
        .collect())
}

/// Decode a base64 PCM16 payload (the inbound audio-chunk format).
pub fn decode_base64_pcm16(data: &str) -> LiveResult<Vec<f32>> {
    let bytes = BASE64
        .decode(data)
        .map_err(|e| LiveError::Decode(format!("Invalid base64: {e}")))?;
    decode_pcm16(&bytes)
}

/// RMS signal energy of a frame, boosted by `gain` and clamped to [0, 1].
/// Feeds the volume meter only; never gates transmission.
pub fn rms_volume(samples: &[f32], gain: f32) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let mean_square =
        samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32;
    (mean_square.sqrt() * gain).clamp(0.0, 1.0)
}
