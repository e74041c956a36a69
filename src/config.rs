use crate::defaults;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub audio: AudioConfig,
    pub agent: AgentConfig,
}

/// Audio capture/playback configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioConfig {
    /// Input device name. None selects the best default device.
    pub input_device: Option<String>,
    /// Output device name. None selects the system default.
    pub output_device: Option<String>,
    pub input_sample_rate: u32,
    pub output_sample_rate: u32,
}

/// Interview agent configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentConfig {
    /// WebSocket endpoint of the conversational agent.
    pub endpoint: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    /// Agent model identifier.
    pub model: String,
    /// Synthesized voice name.
    pub voice: String,
    /// Speaking-rate multiplier (0.5 to 1.5).
    pub speaking_rate: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            input_device: None,
            output_device: None,
            input_sample_rate: defaults::INPUT_SAMPLE_RATE,
            output_sample_rate: defaults::OUTPUT_SAMPLE_RATE,
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            endpoint: "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1alpha.GenerativeService.BidiGenerateContent".to_string(),
            api_key_env: "INTERVOX_API_KEY".to_string(),
            model: "models/gemini-2.0-flash-live-001".to_string(),
            voice: defaults::DEFAULT_VOICE.to_string(),
            speaking_rate: defaults::DEFAULT_SPEAKING_RATE,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Only returns defaults if the file is missing.
    /// Returns errors for invalid TOML.
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(e) => {
                if e.downcast_ref::<std::io::Error>()
                    .map(|io_err| io_err.kind() == std::io::ErrorKind::NotFound)
                    .unwrap_or(false)
                {
                    Ok(Self::default())
                } else {
                    Err(e)
                }
            }
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - INTERVOX_MODEL → agent.model
    /// - INTERVOX_VOICE → agent.voice
    /// - INTERVOX_AUDIO_DEVICE → audio.input_device
    /// - INTERVOX_ENDPOINT → agent.endpoint
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(model) = std::env::var("INTERVOX_MODEL")
            && !model.is_empty()
        {
            self.agent.model = model;
        }

        if let Ok(voice) = std::env::var("INTERVOX_VOICE")
            && !voice.is_empty()
        {
            self.agent.voice = voice;
        }

        if let Ok(device) = std::env::var("INTERVOX_AUDIO_DEVICE")
            && !device.is_empty()
        {
            self.audio.input_device = Some(device);
        }

        if let Ok(endpoint) = std::env::var("INTERVOX_ENDPOINT")
            && !endpoint.is_empty()
        {
            self.agent.endpoint = endpoint;
        }

        self
    }

    /// Validate cross-field constraints that serde cannot express.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.agent.speaking_rate < defaults::MIN_SPEAKING_RATE
            || self.agent.speaking_rate > defaults::MAX_SPEAKING_RATE
        {
            return Err(crate::error::IntervoxError::ConfigInvalidValue {
                key: "agent.speaking_rate".to_string(),
                message: format!(
                    "must be between {} and {}",
                    defaults::MIN_SPEAKING_RATE,
                    defaults::MAX_SPEAKING_RATE
                ),
            });
        }
        if self.agent.endpoint.is_empty() {
            return Err(crate::error::IntervoxError::ConfigInvalidValue {
                key: "agent.endpoint".to_string(),
                message: "must not be empty".to_string(),
            });
        }
        Ok(())
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/intervox/config.toml on Linux
    #[cfg(feature = "cli")]
    pub fn default_path() -> anyhow::Result<PathBuf> {
        dirs::config_dir()
            .map(|d| d.join("intervox").join("config.toml"))
            .ok_or_else(|| anyhow::anyhow!("could not determine config directory"))
    }

    #[cfg(not(feature = "cli"))]
    pub fn default_path() -> anyhow::Result<PathBuf> {
        Ok(PathBuf::from("intervox.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.audio.input_sample_rate, 16_000);
        assert_eq!(config.audio.output_sample_rate, 24_000);
        assert_eq!(config.agent.voice, "Aoede");
    }

    #[test]
    fn load_partial_toml_fills_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[agent]\nvoice = \"Charon\"\nspeaking_rate = 1.2\n"
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.agent.voice, "Charon");
        assert_eq!(config.agent.speaking_rate, 1.2);
        // Untouched sections keep defaults
        assert_eq!(config.audio.input_sample_rate, 16_000);
        assert!(config.audio.input_device.is_none());
    }

    #[test]
    fn load_invalid_toml_is_an_error() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "agent = not toml").unwrap();
        assert!(Config::load(file.path()).is_err());
    }

    #[test]
    fn load_or_default_missing_file_returns_defaults() {
        let config = Config::load_or_default(Path::new("/nonexistent/intervox.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn validate_rejects_out_of_range_speaking_rate() {
        let mut config = Config::default();
        config.agent.speaking_rate = 3.0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("agent.speaking_rate"));
    }

    #[test]
    fn validate_rejects_empty_endpoint() {
        let mut config = Config::default();
        config.agent.endpoint = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn config_roundtrips_through_toml() {
        let config = Config::default();
        let serialized = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&serialized).unwrap();
        assert_eq!(parsed, config);
    }
}
