//! Wire encoding for audio frames.
//!
//! Every conversion here is pure and per-frame: normalized float samples scale
//! linearly to 16-bit PCM, the little-endian byte sequence is base64 encoded,
//! and a MIME tag identifying format and sample rate travels alongside the
//! payload. Inbound synthesized speech reverses the same steps.

use crate::defaults;
use crate::error::{IntervoxError, Result};
use base64::prelude::*;

/// A binary-safe text encoding of one audio frame plus its wire content type.
///
/// Transient: exists only between encode and send.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedFrame {
    /// Base64 of little-endian 16-bit PCM.
    pub data: String,
    /// MIME-like tag, e.g. `audio/pcm;rate=16000`.
    pub mime_type: String,
}

/// Scale a normalized float sample (-1.0..1.0) to 16-bit signed range.
#[inline]
pub fn f32_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

/// Convert a slice of normalized float samples to 16-bit PCM.
pub fn pcm_from_f32(samples: &[f32]) -> Vec<i16> {
    samples.iter().map(|&s| f32_to_i16(s)).collect()
}

/// Serialize 16-bit PCM samples to little-endian bytes.
pub fn pcm_to_le_bytes(samples: &[i16]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for sample in samples {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    bytes
}

/// Parse little-endian bytes into 16-bit PCM samples.
///
/// A trailing odd byte is an error: PCM16 payloads are always sample-aligned.
pub fn pcm_from_le_bytes(bytes: &[u8]) -> Result<Vec<i16>> {
    if bytes.len() % 2 != 0 {
        return Err(IntervoxError::Protocol {
            message: format!("PCM payload has odd length {}", bytes.len()),
        });
    }
    Ok(bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect())
}

/// Encode a frame of 16-bit PCM for the wire.
pub fn encode_frame(samples: &[i16]) -> EncodedFrame {
    EncodedFrame {
        data: BASE64_STANDARD.encode(pcm_to_le_bytes(samples)),
        mime_type: defaults::INPUT_MIME_TYPE.to_string(),
    }
}

/// Decode an inbound base64 audio chunk into playable 16-bit PCM.
pub fn decode_chunk(data: &str) -> Result<Vec<i16>> {
    let bytes = BASE64_STANDARD
        .decode(data)
        .map_err(|e| IntervoxError::Protocol {
            message: format!("invalid base64 audio chunk: {}", e),
        })?;
    pcm_from_le_bytes(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn f32_scaling_endpoints() {
        assert_eq!(f32_to_i16(0.0), 0);
        assert_eq!(f32_to_i16(1.0), i16::MAX);
        assert_eq!(f32_to_i16(-1.0), -i16::MAX);
    }

    #[test]
    fn f32_scaling_clamps_out_of_range() {
        assert_eq!(f32_to_i16(2.5), i16::MAX);
        assert_eq!(f32_to_i16(-2.5), -i16::MAX);
    }

    #[test]
    fn le_bytes_layout() {
        let bytes = pcm_to_le_bytes(&[0x0102, -1]);
        assert_eq!(bytes, vec![0x02, 0x01, 0xFF, 0xFF]);
    }

    #[test]
    fn le_bytes_rejects_odd_length() {
        let err = pcm_from_le_bytes(&[0x00, 0x01, 0x02]).unwrap_err();
        assert!(err.to_string().contains("odd length"));
    }

    #[test]
    fn encode_frame_tags_input_mime() {
        let frame = encode_frame(&[0, 100, -100]);
        assert_eq!(frame.mime_type, "audio/pcm;rate=16000");
        assert!(!frame.data.is_empty());
    }

    #[test]
    fn encode_is_order_independent_between_frames() {
        // Encoding the same samples twice, interleaved with other frames,
        // yields identical output — no cross-frame state.
        let a = encode_frame(&[1, 2, 3]);
        let _ = encode_frame(&[9, 9, 9]);
        let b = encode_frame(&[1, 2, 3]);
        assert_eq!(a, b);
    }

    #[test]
    fn decode_chunk_roundtrip() {
        let samples = vec![0i16, 1000, -1000, i16::MAX, i16::MIN];
        let encoded = BASE64_STANDARD.encode(pcm_to_le_bytes(&samples));
        assert_eq!(decode_chunk(&encoded).unwrap(), samples);
    }

    #[test]
    fn decode_chunk_rejects_invalid_base64() {
        let err = decode_chunk("not!!base64??").unwrap_err();
        assert!(matches!(
            err,
            crate::error::IntervoxError::Protocol { .. }
        ));
    }
}
