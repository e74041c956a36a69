//! Duplex streaming transport to the conversational interview agent.
//!
//! One WebSocket connection carries four logical channels: outbound encoded
//! microphone audio, inbound synthesized speech, two transcript delta streams,
//! and structured tool invocations. Order is guaranteed within a channel,
//! never across channels.

pub mod messages;
pub mod session;

pub use messages::{ClientMessage, ServerMessage};
pub use session::{
    AgentConnector, AgentHandle, CloseReason, LiveConnector, SessionEvent,
};

use crate::defaults;

/// Caller-supplied context for one interview session.
///
/// The persona instruction is opaque to the transport; it is assembled by the
/// caller from the role, company, job description, and candidate summary.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionContext {
    /// Behavior/persona instruction describing the interview.
    pub persona_instruction: String,
    /// Synthesized voice identifier.
    pub voice: String,
    /// Speaking-rate multiplier; clamped to 0.5–1.5.
    pub speaking_rate: f32,
    /// Agent model identifier.
    pub model: String,
}

impl SessionContext {
    pub fn new(persona_instruction: impl Into<String>) -> Self {
        Self {
            persona_instruction: persona_instruction.into(),
            voice: defaults::DEFAULT_VOICE.to_string(),
            speaking_rate: defaults::DEFAULT_SPEAKING_RATE,
            model: String::new(),
        }
    }

    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = voice.into();
        self
    }

    pub fn with_speaking_rate(mut self, rate: f32) -> Self {
        self.speaking_rate = defaults::clamp_speaking_rate(rate);
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}
