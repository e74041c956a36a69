//! Error types for intervox.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum IntervoxError {
    // Configuration errors
    #[error("Configuration file not found at {path}")]
    ConfigFileNotFound { path: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Acquisition errors — fatal to session start, no retry
    #[error("Audio device not found: {device}")]
    AudioDeviceNotFound { device: String },

    #[error("Microphone unavailable: {message}")]
    MicrophoneUnavailable { message: String },

    #[error("Audio capture failed: {message}")]
    AudioCapture { message: String },

    #[error("Audio playback failed: {message}")]
    AudioPlayback { message: String },

    // Transport errors — fatal to the active session
    #[error("Failed to connect to interview agent: {message}")]
    TransportConnect { message: String },

    #[error("Interview session disconnected: {reason}")]
    SessionDisconnected { reason: String },

    #[error("Transport send failed: {message}")]
    TransportSend { message: String },

    // Protocol errors — logged and discarded, never fatal to the session
    #[error("Protocol error: {message}")]
    Protocol { message: String },

    // Lifecycle errors
    #[error("An interview session is already running")]
    SessionBusy,

    #[error("Session is not active")]
    SessionNotActive,

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, IntervoxError>;
