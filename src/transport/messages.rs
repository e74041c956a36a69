//! Wire message types for the agent's bidirectional streaming protocol.
//!
//! Messages are JSON objects with one top-level key naming the message kind
//! (externally tagged), camelCase field names throughout. Unknown server
//! message kinds fail deserialization and are discarded by the session loop.

use crate::defaults;
use crate::transport::SessionContext;
use serde::{Deserialize, Serialize};
use serde_json::json;

// =============================================================================
// Client → Agent
// =============================================================================

/// Messages sent to the agent.
#[derive(Debug, Clone, Serialize)]
pub enum ClientMessage {
    /// Session configuration; must be the first message on the stream.
    #[serde(rename = "setup")]
    Setup(Setup),

    /// Streamed media input (encoded microphone frames).
    #[serde(rename = "realtimeInput")]
    RealtimeInput(RealtimeInput),

    /// Receipt for a tool invocation. Required before the agent continues.
    #[serde(rename = "toolResponse")]
    ToolResponse(ToolResponse),
}

/// Session setup payload.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Setup {
    pub model: String,
    pub generation_config: GenerationConfig,
    pub system_instruction: Content,
    pub tools: Vec<Tool>,
    /// Request transcription of the caller's audio.
    pub input_audio_transcription: TranscriptionConfig,
    /// Request transcription of the agent's own speech.
    pub output_audio_transcription: TranscriptionConfig,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub response_modalities: Vec<String>,
    pub speech_config: SpeechConfig,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    pub voice_config: VoiceConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speaking_rate: Option<f32>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceConfig {
    pub prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrebuiltVoiceConfig {
    pub voice_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Content {
    pub parts: Vec<TextPart>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextPart {
    pub text: String,
}

/// Tool declaration the agent is permitted to invoke.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
    pub function_declarations: Vec<FunctionDeclaration>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionDeclaration {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Marker requesting a transcription side-channel. No options today.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TranscriptionConfig {}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInput {
    pub media_chunks: Vec<MediaChunk>,
}

/// One base64 payload plus its wire content type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaChunk {
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResponse {
    pub function_responses: Vec<FunctionResponse>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionResponse {
    pub id: String,
    pub name: String,
    pub response: serde_json::Value,
}

impl ClientMessage {
    /// Build the setup message from the caller's session context.
    pub fn setup(context: &SessionContext) -> Self {
        ClientMessage::Setup(Setup {
            model: context.model.clone(),
            generation_config: GenerationConfig {
                response_modalities: vec!["AUDIO".to_string()],
                speech_config: SpeechConfig {
                    voice_config: VoiceConfig {
                        prebuilt_voice_config: PrebuiltVoiceConfig {
                            voice_name: context.voice.clone(),
                        },
                    },
                    speaking_rate: Some(defaults::clamp_speaking_rate(context.speaking_rate)),
                },
            },
            system_instruction: Content {
                parts: vec![TextPart {
                    text: context.persona_instruction.clone(),
                }],
            },
            tools: vec![feedback_tool()],
            input_audio_transcription: TranscriptionConfig::default(),
            output_audio_transcription: TranscriptionConfig::default(),
        })
    }

    /// Wrap one encoded audio frame for sending.
    pub fn audio_frame(mime_type: &str, data: String) -> Self {
        ClientMessage::RealtimeInput(RealtimeInput {
            media_chunks: vec![MediaChunk {
                mime_type: mime_type.to_string(),
                data,
            }],
        })
    }

    /// Trivial receipt acknowledging one tool invocation.
    pub fn tool_ack(id: &str, name: &str) -> Self {
        ClientMessage::ToolResponse(ToolResponse {
            function_responses: vec![FunctionResponse {
                id: id.to_string(),
                name: name.to_string(),
                response: json!({ "result": "ok" }),
            }],
        })
    }
}

/// Declaration of the per-exchange feedback tool.
///
/// The schema is what the agent is permitted to emit; the aggregator
/// re-validates on receipt since the remote end is not trusted to honor it.
pub fn feedback_tool() -> Tool {
    Tool {
        function_declarations: vec![FunctionDeclaration {
            name: defaults::FEEDBACK_TOOL_NAME.to_string(),
            description: "Record structured feedback about the candidate's last answer."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "score": {
                        "type": "integer",
                        "description": "Answer quality from 0 to 100",
                        "minimum": 0,
                        "maximum": 100
                    },
                    "strengths": {
                        "type": "array",
                        "items": { "type": "string" }
                    },
                    "areasForImprovement": {
                        "type": "array",
                        "items": { "type": "string" }
                    }
                },
                "required": ["score"]
            }),
        }],
    }
}

// =============================================================================
// Agent → Client
// =============================================================================

/// Messages received from the agent.
#[derive(Debug, Clone, Deserialize)]
pub enum ServerMessage {
    /// The agent accepted the setup; streaming may begin.
    #[serde(rename = "setupComplete")]
    SetupComplete(serde_json::Value),

    /// Interleaved model output: audio, transcripts, turn boundaries.
    #[serde(rename = "serverContent")]
    ServerContent(ServerContent),

    /// Tool invocation requiring acknowledgment.
    #[serde(rename = "toolCall")]
    ToolCall(ToolCall),

    /// The agent will close the connection shortly.
    #[serde(rename = "goAway")]
    GoAway(GoAway),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerContent {
    #[serde(default)]
    pub model_turn: Option<ModelTurn>,
    /// Transcript delta of the caller's recognized speech.
    #[serde(default)]
    pub input_transcription: Option<Transcription>,
    /// Transcript delta of the agent's own speech.
    #[serde(default)]
    pub output_transcription: Option<Transcription>,
    #[serde(default)]
    pub turn_complete: bool,
    #[serde(default)]
    pub interrupted: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelTurn {
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub inline_data: Option<MediaChunk>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Transcription {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCall {
    #[serde(default)]
    pub function_calls: Vec<FunctionCall>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionCall {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub args: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoAway {
    #[serde(default)]
    pub time_left: Option<String>,
}
