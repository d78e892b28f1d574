//! Live session configuration.
//!
//! A [`SessionConfig`] is built once before connecting and shared read-only by
//! the session client. Starting a new session means building a new config.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// Region used when none is configured.
pub const DEFAULT_LOCATION: &str = "us-central1";

/// Prebuilt voice used when none is configured.
pub const DEFAULT_VOICE: &str = "Kore";

/// Bidirectional streaming endpoint path on the regional API host.
pub const LIVE_API_PATH: &str =
    "/ws/google.cloud.aiplatform.v1beta1.LlmBidiService/BidiGenerateContent";

/// Build the regional websocket endpoint the gateway should connect to.
///
/// # Example
/// ```
/// use live_gateway::core::live::service_url;
///
/// assert_eq!(
///     service_url("us-central1"),
///     "wss://us-central1-aiplatform.googleapis.com/ws/google.cloud.aiplatform.v1beta1.LlmBidiService/BidiGenerateContent"
/// );
/// ```
pub fn service_url(location: &str) -> String {
    format!("wss://{location}-aiplatform.googleapis.com{LIVE_API_PATH}")
}

/// Build the fully qualified publisher model resource name.
pub fn model_uri(project_id: &str, location: &str, model: &str) -> String {
    format!("projects/{project_id}/locations/{location}/publishers/google/models/{model}")
}

// =============================================================================
// Enumerations
// =============================================================================

/// Output modality requested from the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResponseModality {
    Audio,
    Text,
}

/// Sensitivity for detecting the start of user speech.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum StartSensitivity {
    #[default]
    #[serde(rename = "START_SENSITIVITY_UNSPECIFIED")]
    Unspecified,
    #[serde(rename = "START_SENSITIVITY_HIGH")]
    High,
    #[serde(rename = "START_SENSITIVITY_LOW")]
    Low,
}

/// Sensitivity for detecting the end of user speech.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EndSensitivity {
    #[default]
    #[serde(rename = "END_SENSITIVITY_UNSPECIFIED")]
    Unspecified,
    #[serde(rename = "END_SENSITIVITY_HIGH")]
    High,
    #[serde(rename = "END_SENSITIVITY_LOW")]
    Low,
}

/// What user activity does to an ongoing model response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActivityHandling {
    #[default]
    #[serde(rename = "ACTIVITY_HANDLING_UNSPECIFIED")]
    Unspecified,
    #[serde(rename = "START_OF_ACTIVITY_INTERRUPTS")]
    StartOfActivityInterrupts,
    #[serde(rename = "NO_INTERRUPTION")]
    NoInterruption,
}

// =============================================================================
// Turn taking
// =============================================================================

/// Server-side voice activity detection parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityDetection {
    pub disabled: bool,
    /// Silence required before the user's turn is considered over
    pub silence_duration_ms: u32,
    /// Audio kept before detected speech onset
    pub prefix_padding_ms: u32,
    pub end_of_speech_sensitivity: EndSensitivity,
    pub start_of_speech_sensitivity: StartSensitivity,
}

impl Default for ActivityDetection {
    fn default() -> Self {
        Self {
            disabled: false,
            silence_duration_ms: 2000,
            prefix_padding_ms: 500,
            end_of_speech_sensitivity: EndSensitivity::Unspecified,
            start_of_speech_sensitivity: StartSensitivity::Unspecified,
        }
    }
}

// =============================================================================
// Function declarations
// =============================================================================

/// A callable function offered to the model.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDeclaration {
    pub name: String,
    pub description: String,
    /// JSON schema per parameter name
    pub parameters: Map<String, Value>,
    /// Names of required parameters
    pub required: Vec<String>,
}

impl FunctionDeclaration {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: Map::new(),
            required: Vec::new(),
        }
    }

    /// Add a parameter schema, e.g. `json!({"type": "STRING"})`.
    pub fn with_parameter(mut self, name: impl Into<String>, schema: Value, required: bool) -> Self {
        let name = name.into();
        if required {
            self.required.push(name.clone());
        }
        self.parameters.insert(name, schema);
        self
    }

    /// Declaration as sent in the setup frame.
    pub fn definition(&self) -> Value {
        json!({
            "name": self.name,
            "description": self.description,
            "parameters": {
                "type": "OBJECT",
                "properties": self.parameters,
                "required": self.required,
            },
        })
    }
}

// =============================================================================
// Session configuration
// =============================================================================

/// Everything the setup frame carries.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Fully qualified model resource name, see [`model_uri`]
    pub model: String,
    pub response_modalities: Vec<ResponseModality>,
    pub voice: String,
    pub temperature: f32,
    pub system_instruction: String,
    pub input_transcription: bool,
    pub output_transcription: bool,
    pub affective_dialog: bool,
    pub proactive_audio: bool,
    pub activity_detection: ActivityDetection,
    pub activity_handling: ActivityHandling,
    pub functions: Vec<FunctionDeclaration>,
}

impl SessionConfig {
    /// Defaults for a native-audio voice session against `model`.
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            response_modalities: vec![ResponseModality::Audio],
            voice: DEFAULT_VOICE.to_string(),
            temperature: 1.0,
            system_instruction: String::new(),
            input_transcription: true,
            output_transcription: true,
            affective_dialog: true,
            proactive_audio: false,
            activity_detection: ActivityDetection::default(),
            activity_handling: ActivityHandling::default(),
            functions: Vec::new(),
        }
    }

    pub fn with_system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = instruction.into();
        self
    }

    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = voice.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_function(mut self, function: FunctionDeclaration) -> Self {
        self.functions.push(function);
        self
    }
}
