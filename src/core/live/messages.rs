//! Live session wire frames.
//!
//! Outbound frames are typed and serialize to the snake_case JSON the service
//! accepts. Inbound frames are classified from their JSON by presence of
//! well-known fields, see [`InboundEvent::classify`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::config::{ActivityDetection, ActivityHandling, ResponseModality, SessionConfig};
use crate::core::audio::PCM_MIME_TYPE;

// =============================================================================
// Routing directive
// =============================================================================

/// First frame on a gateway connection, naming the upstream endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingDirective {
    pub service_url: String,
}

impl RoutingDirective {
    pub fn new(service_url: impl Into<String>) -> Self {
        Self {
            service_url: service_url.into(),
        }
    }

    /// Extract the upstream endpoint from a raw frame.
    ///
    /// Returns `None` for frames that are not a JSON object carrying a string
    /// `service_url`; such frames are payload, not control.
    pub fn detect(frame: &[u8]) -> Option<String> {
        let value: Value = serde_json::from_slice(frame).ok()?;
        value
            .get("service_url")
            .and_then(Value::as_str)
            .map(str::to_string)
    }
}

// =============================================================================
// Outbound messages
// =============================================================================

/// Messages the session client sends through the gateway.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientMessage {
    Setup(Setup),
    RealtimeInput(RealtimeInput),
    ClientContent(ClientContent),
    ToolResponse(ToolResponse),
}

impl ClientMessage {
    pub fn setup(config: &SessionConfig) -> Self {
        Self::Setup(Setup::from_config(config))
    }

    /// Realtime input envelope around one base64 PCM16 chunk.
    pub fn audio(base64_pcm: impl Into<String>) -> Self {
        Self::RealtimeInput(RealtimeInput {
            media_chunks: vec![MediaChunk {
                mime_type: PCM_MIME_TYPE.to_string(),
                data: base64_pcm.into(),
            }],
        })
    }

    /// A complete user text turn.
    pub fn text(text: impl Into<String>) -> Self {
        Self::ClientContent(ClientContent {
            turns: vec![Turn {
                role: "user".to_string(),
                parts: vec![TextPart { text: text.into() }],
            }],
            turn_complete: true,
        })
    }

    pub fn tool_response(function_responses: Vec<FunctionResponse>) -> Self {
        Self::ToolResponse(ToolResponse { function_responses })
    }
}

/// Session setup frame body.
#[derive(Debug, Clone, Serialize)]
pub struct Setup {
    pub model: String,
    pub generation_config: GenerationConfig,
    pub system_instruction: SystemInstruction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Tools>,
    pub proactivity: Proactivity,
    pub realtime_input_config: RealtimeInputConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_audio_transcription: Option<AudioTranscriptionConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_audio_transcription: Option<AudioTranscriptionConfig>,
}

impl Setup {
    pub fn from_config(config: &SessionConfig) -> Self {
        let tools = (!config.functions.is_empty()).then(|| Tools {
            function_declarations: config.functions.iter().map(|f| f.definition()).collect(),
        });

        Self {
            model: config.model.clone(),
            generation_config: GenerationConfig {
                response_modalities: config.response_modalities.clone(),
                temperature: config.temperature,
                speech_config: SpeechConfig {
                    voice_config: VoiceConfig {
                        prebuilt_voice_config: PrebuiltVoiceConfig {
                            voice_name: config.voice.clone(),
                        },
                    },
                },
                enable_affective_dialog: config.affective_dialog.then_some(true),
            },
            system_instruction: SystemInstruction {
                parts: vec![TextPart {
                    text: config.system_instruction.clone(),
                }],
            },
            tools,
            proactivity: Proactivity {
                proactive_audio: config.proactive_audio,
            },
            realtime_input_config: RealtimeInputConfig {
                automatic_activity_detection: config.activity_detection.clone(),
                activity_handling: config.activity_handling,
            },
            input_audio_transcription: config
                .input_transcription
                .then_some(AudioTranscriptionConfig {}),
            output_audio_transcription: config
                .output_transcription
                .then_some(AudioTranscriptionConfig {}),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerationConfig {
    pub response_modalities: Vec<ResponseModality>,
    pub temperature: f32,
    pub speech_config: SpeechConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_affective_dialog: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SpeechConfig {
    pub voice_config: VoiceConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct VoiceConfig {
    pub prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct PrebuiltVoiceConfig {
    pub voice_name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemInstruction {
    pub parts: Vec<TextPart>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TextPart {
    pub text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Tools {
    pub function_declarations: Vec<Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Proactivity {
    pub proactive_audio: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RealtimeInputConfig {
    pub automatic_activity_detection: ActivityDetection,
    pub activity_handling: ActivityHandling,
}

/// Serializes as `{}`; presence enables transcription.
#[derive(Debug, Clone, Serialize)]
pub struct AudioTranscriptionConfig {}

#[derive(Debug, Clone, Serialize)]
pub struct RealtimeInput {
    pub media_chunks: Vec<MediaChunk>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MediaChunk {
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClientContent {
    pub turns: Vec<Turn>,
    pub turn_complete: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Turn {
    pub role: String,
    pub parts: Vec<TextPart>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolResponse {
    pub function_responses: Vec<FunctionResponse>,
}

/// Result of one function call, echoed back with the call id.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub response: Value,
}

// =============================================================================
// Inbound events
// =============================================================================

/// A function invocation requested inside a tool-call payload.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FunctionCall {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

/// Extract the function calls of a `toolCall` payload. Malformed entries are skipped.
pub fn function_calls(tool_call: &Value) -> Vec<FunctionCall> {
    tool_call
        .get("functionCalls")
        .and_then(Value::as_array)
        .map(|calls| {
            calls
                .iter()
                .filter_map(|call| serde_json::from_value(call.clone()).ok())
                .collect()
        })
        .unwrap_or_default()
}

/// Classified upstream frame.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    SetupComplete,
    TurnComplete,
    Interrupted,
    InputTranscription { text: String, finished: bool },
    OutputTranscription { text: String, finished: bool },
    ToolCall(Value),
    Text(String),
    /// Base64 PCM16 at the playback rate
    Audio(String),
    Error(Value),
    /// Unparseable JSON or no known field present
    Unclassified,
}

/// JSON truthiness: null, false, 0 and "" are unset; objects and arrays are set.
fn is_set(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}

fn transcription(value: &Value) -> (String, bool) {
    let text = value
        .get("text")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    (text, is_set(value.get("finished")))
}

impl InboundEvent {
    /// Classify a text or binary frame. Invalid JSON is `Unclassified`.
    pub fn from_frame(frame: &[u8]) -> Self {
        match serde_json::from_slice::<Value>(frame) {
            Ok(value) => Self::classify(&value),
            Err(_) => Self::Unclassified,
        }
    }

    /// First match wins: setup-complete, turn-complete, interrupted, input
    /// transcription, output transcription, tool call, text part, inline data
    /// part, error.
    pub fn classify(frame: &Value) -> Self {
        if is_set(frame.get("setupComplete")) {
            return Self::SetupComplete;
        }

        let content = frame.get("serverContent");
        let field = |name: &str| content.and_then(|c| c.get(name));

        if is_set(field("turnComplete")) {
            return Self::TurnComplete;
        }
        if is_set(field("interrupted")) {
            return Self::Interrupted;
        }
        if let Some(value) = field("inputTranscription").filter(|v| is_set(Some(*v))) {
            let (text, finished) = transcription(value);
            return Self::InputTranscription { text, finished };
        }
        if let Some(value) = field("outputTranscription").filter(|v| is_set(Some(*v))) {
            let (text, finished) = transcription(value);
            return Self::OutputTranscription { text, finished };
        }
        if let Some(call) = frame.get("toolCall").filter(|v| is_set(Some(*v))) {
            return Self::ToolCall(call.clone());
        }

        let first_part = content.and_then(|c| c.pointer("/modelTurn/parts/0"));
        if let Some(text) = first_part
            .and_then(|p| p.get("text"))
            .filter(|v| is_set(Some(*v)))
        {
            let text = match text {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            return Self::Text(text);
        }
        if let Some(data) = first_part
            .and_then(|p| p.get("inlineData"))
            .and_then(|inline| inline.get("data"))
            .and_then(Value::as_str)
        {
            return Self::Audio(data.to_string());
        }

        if let Some(error) = frame.get("error").filter(|v| is_set(Some(*v))) {
            return Self::Error(error.clone());
        }

        Self::Unclassified
    }

    /// Short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SetupComplete => "setup_complete",
            Self::TurnComplete => "turn_complete",
            Self::Interrupted => "interrupted",
            Self::InputTranscription { .. } => "input_transcription",
            Self::OutputTranscription { .. } => "output_transcription",
            Self::ToolCall(_) => "tool_call",
            Self::Text(_) => "text",
            Self::Audio(_) => "audio",
            Self::Error(_) => "error",
            Self::Unclassified => "unclassified",
        }
    }
}
