//! intervox - Live mock-interview voice sessions
//!
//! Duplex audio conversation with an AI interviewer: microphone capture,
//! gapless playback of synthesized speech, live transcript assembly, and
//! structured per-answer feedback reduced into a session report.

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod audio;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod defaults;
pub mod error;
pub mod feedback;
pub mod session;
pub mod transcript;
pub mod transport;

// Core traits (capture → transport → playback)
pub use audio::playback::{OutputClock, PlaybackScheduler, PlaybackSink};
pub use audio::{AudioFrame, FrameSource};
pub use transport::{AgentConnector, AgentHandle, SessionContext, SessionEvent};

// Session lifecycle
pub use session::{InterviewSession, Phase, SessionState};

// Transcript and feedback
pub use feedback::{FeedbackAggregator, FeedbackEvent, SessionReport};
pub use transcript::{Speaker, TranscriptAssembler, TranscriptTurn};

// Error handling
pub use error::{IntervoxError, Result};

// Config
pub use config::Config;

/// Build version string with optional git commit hash.
///
/// Returns `"0.3.1+abc1234"` when git hash is available, `"0.3.1"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_string_starts_with_cargo_version() {
        let ver = version_string();
        assert!(
            ver.starts_with(env!("CARGO_PKG_VERSION")),
            "version_string should start with CARGO_PKG_VERSION, got: {}",
            ver
        );
    }

    #[test]
    fn version_string_contains_plus_when_git_hash_present() {
        let ver = version_string();
        if option_env!("GIT_HASH").is_some_and(|h| !h.is_empty()) {
            assert!(
                ver.contains('+'),
                "With GIT_HASH set, version should contain '+', got: {}",
                ver
            );
        } else {
            assert_eq!(ver, env!("CARGO_PKG_VERSION"));
        }
    }
}
