//! Default configuration constants for intervox.
//!
//! Shared constants used across configuration types and the audio/transport
//! pipelines, kept in one place for consistency.

/// Microphone capture sample rate in Hz.
///
/// 16kHz mono is what the agent's speech recognizer expects for caller audio.
pub const INPUT_SAMPLE_RATE: u32 = 16_000;

/// Synthesized speech sample rate in Hz.
///
/// The agent emits 24kHz mono PCM for its own voice.
pub const OUTPUT_SAMPLE_RATE: u32 = 24_000;

/// Samples per capture frame.
///
/// 4096 samples at 16kHz is 256ms per frame. Each frame is encoded and sent
/// independently, so the exact cadence of hardware callbacks does not matter.
pub const FRAME_SAMPLES: usize = 4096;

/// MIME tag attached to every outbound audio frame.
pub const INPUT_MIME_TYPE: &str = "audio/pcm;rate=16000";

/// MIME tag the agent attaches to inbound synthesized speech.
pub const OUTPUT_MIME_TYPE: &str = "audio/pcm;rate=24000";

/// Default synthesized voice.
pub const DEFAULT_VOICE: &str = "Aoede";

/// Default speaking-rate multiplier.
pub const DEFAULT_SPEAKING_RATE: f32 = 1.0;

/// Lowest accepted speaking-rate multiplier.
pub const MIN_SPEAKING_RATE: f32 = 0.5;

/// Highest accepted speaking-rate multiplier.
pub const MAX_SPEAKING_RATE: f32 = 1.5;

/// Name of the feedback tool the agent is permitted to invoke.
pub const FEEDBACK_TOOL_NAME: &str = "record_feedback";

/// Clamp a speaking rate into the accepted range.
pub fn clamp_speaking_rate(rate: f32) -> f32 {
    rate.clamp(MIN_SPEAKING_RATE, MAX_SPEAKING_RATE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_duration_is_256ms() {
        let ms = FRAME_SAMPLES as u32 * 1000 / INPUT_SAMPLE_RATE;
        assert_eq!(ms, 256);
    }

    #[test]
    fn clamp_speaking_rate_bounds() {
        assert_eq!(clamp_speaking_rate(0.1), MIN_SPEAKING_RATE);
        assert_eq!(clamp_speaking_rate(2.0), MAX_SPEAKING_RATE);
        assert_eq!(clamp_speaking_rate(1.0), 1.0);
    }

    #[test]
    fn mime_tags_carry_sample_rates() {
        assert!(INPUT_MIME_TYPE.contains("16000"));
        assert!(OUTPUT_MIME_TYPE.contains("24000"));
    }
}
