//! Audio capture, encoding, and playback.
//!
//! Capture delivers fixed-size microphone frames; encode converts each frame
//! into its wire form; playback schedules inbound synthesized speech for
//! gapless output.

#[cfg(feature = "cpal-audio")]
pub mod capture;
pub mod encode;
pub mod playback;

use crate::error::Result;
use tokio::sync::mpsc;

/// A fixed-length frame of mono 16-bit PCM samples from the microphone.
///
/// Frames are self-contained: each one is encoded and sent without reference
/// to its neighbors, so jittered delivery timing cannot corrupt the stream.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Sequence number for ordering frames.
    pub sequence: u64,
    /// Audio samples as 16-bit PCM.
    pub samples: Vec<i16>,
}

impl AudioFrame {
    /// Creates a new audio frame.
    pub fn new(sequence: u64, samples: Vec<i16>) -> Self {
        Self { sequence, samples }
    }

    /// Returns the duration of this frame in milliseconds.
    pub fn duration_ms(&self, sample_rate: u32) -> u32 {
        (self.samples.len() as u32 * 1000) / sample_rate
    }
}

/// Trait for microphone frame sources.
///
/// This trait allows swapping implementations (real audio device vs test fake).
/// `start` registers the frame sink; delivery cadence is driven by the audio
/// hardware, not the application.
pub trait FrameSource: Send {
    /// Start capturing and deliver frames into `sink`.
    fn start(&mut self, sink: mpsc::UnboundedSender<AudioFrame>) -> Result<()>;

    /// Stop capturing. Must be safe to call more than once.
    fn stop(&mut self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_duration_ms() {
        let frame = AudioFrame::new(0, vec![0i16; 1600]);
        assert_eq!(frame.duration_ms(16_000), 100);
    }

    #[test]
    fn frame_duration_of_default_frame_size() {
        let frame = AudioFrame::new(3, vec![0i16; crate::defaults::FRAME_SAMPLES]);
        assert_eq!(frame.duration_ms(crate::defaults::INPUT_SAMPLE_RATE), 256);
    }
}
