//! Typed request/response records for each capability endpoint, and the
//! `Capabilities` seam the workflows call through.

use crate::gateway::Gateway;
use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared::agent_api::ChatMessage;
use shared::error::GatewayError;
use shared::settings::Capability;

// ── Chat (hosted LLM) ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct LlmRequest {
    pub model: String,
    pub inputs: LlmInputs,
}

#[derive(Debug, Clone, Serialize)]
pub struct LlmInputs {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl LlmRequest {
    pub const DEFAULT_TEMPERATURE: f32 = 0.2;
    pub const DEFAULT_MAX_TOKENS: u32 = 1200;

    /// Single user message under an explicit system prompt.
    pub fn prompt(model: &str, system: &str, user_text: &str) -> Self {
        Self::from_messages(
            model,
            vec![ChatMessage::system(system), ChatMessage::user(user_text)],
        )
    }

    /// System-role messages are folded into `inputs.system`, joined by blank
    /// lines; the rest are sent in order.
    pub fn from_messages(model: &str, messages: Vec<ChatMessage>) -> Self {
        let mut system = String::new();
        let mut rest = Vec::with_capacity(messages.len());
        for m in messages {
            if m.role == "system" {
                if !system.is_empty() {
                    system.push_str("\n\n");
                }
                system.push_str(&m.content);
            } else {
                rest.push(m);
            }
        }

        Self {
            model: model.to_string(),
            inputs: LlmInputs {
                system: (!system.trim().is_empty()).then_some(system),
                messages: rest,
                temperature: Self::DEFAULT_TEMPERATURE,
                max_tokens: Self::DEFAULT_MAX_TOKENS,
            },
        }
    }

    pub fn with_sampling(mut self, temperature: f32, max_tokens: u32) -> Self {
        self.inputs.temperature = temperature;
        self.inputs.max_tokens = max_tokens;
        self
    }
}

#[derive(Debug, Deserialize)]
struct LlmResponse {
    #[serde(default)]
    outputs: Option<LlmOutputs>,
}

#[derive(Debug, Deserialize)]
struct LlmOutputs {
    #[serde(default)]
    text: Option<String>,
}

// ── Multimodal ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct MultimodalRequest {
    pub inputs: MultimodalInputs,
}

#[derive(Debug, Clone, Serialize)]
pub struct MultimodalInputs {
    pub prompt: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,
}

impl MultimodalRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            inputs: MultimodalInputs {
                prompt: prompt.into(),
                images: Vec::new(),
                files: Vec::new(),
            },
        }
    }

    pub fn with_image(mut self, data_url: impl Into<String>) -> Self {
        self.inputs.images.push(data_url.into());
        self
    }

    pub fn with_file(mut self, data_url: impl Into<String>) -> Self {
        self.inputs.files.push(data_url.into());
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MultimodalReport {
    /// Summary text, when the service put one at a known location.
    pub text: Option<String>,
    pub raw: Value,
}

impl MultimodalReport {
    fn from_value(value: Value) -> Result<Self, GatewayError> {
        if !value.is_object() {
            return Err(GatewayError::empty(
                Capability::Multimodal,
                "expected a JSON object",
            ));
        }
        let text = ["outputs.text", "text", "output"]
            .iter()
            .find_map(|path| json_path(&value, path).and_then(Value::as_str))
            .filter(|t| !t.trim().is_empty())
            .map(str::to_string);
        Ok(Self { text, raw: value })
    }
}

// ── OCR ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct OcrRequest {
    pub file_base64: String,
}

#[derive(Debug, Deserialize)]
struct TextResponse {
    #[serde(default)]
    text: Option<String>,
}

// ── Object detection ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct DetectionRequest {
    pub image_base64: String,
    pub labels: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Detection {
    #[serde(default, alias = "class", alias = "name")]
    pub label: Option<String>,
    #[serde(default, alias = "score")]
    pub confidence: Option<f64>,
    #[serde(default, alias = "box")]
    pub bbox: Option<Vec<f64>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DetectionReport {
    pub detections: Vec<Detection>,
    pub raw: Value,
}

impl DetectionReport {
    fn from_value(value: Value) -> Result<Self, GatewayError> {
        if !value.is_object() {
            return Err(GatewayError::empty(
                Capability::ObjectDetection,
                "expected a JSON object",
            ));
        }
        let detections = ["detections", "objects", "predictions", "outputs.detections"]
            .iter()
            .find_map(|path| json_path(&value, path).and_then(Value::as_array))
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| serde_json::from_value(item.clone()).ok())
                    .collect()
            })
            .unwrap_or_default();
        Ok(Self {
            detections,
            raw: value,
        })
    }

    /// `label (confidence)` lines for display.
    pub fn summary(&self) -> Vec<String> {
        self.detections
            .iter()
            .map(|d| {
                let label = d.label.as_deref().unwrap_or("unlabelled");
                match d.confidence {
                    Some(c) => format!("{} ({:.2})", label, c),
                    None => label.to_string(),
                }
            })
            .collect()
    }
}

// ── Speech ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct SttRequest {
    pub audio_base64: String,
    pub language: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TtsRequest {
    pub text: String,
    pub voice: String,
}

#[derive(Debug, Deserialize)]
struct TtsResponse {
    #[serde(default)]
    audio_base64: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SynthesizedAudio {
    pub bytes: Vec<u8>,
    /// Declared by a `data:` prefix when the service sent one.
    pub mime: Option<String>,
}

/// Decode base64 audio, with or without a `data:<mime>;base64,` prefix.
pub fn decode_audio(payload: &str) -> Result<SynthesizedAudio, base64::DecodeError> {
    let payload = payload.trim();
    let (mime, data) = match payload.split_once(',') {
        Some((prefix, data)) => {
            let mime = prefix
                .strip_prefix("data:")
                .and_then(|p| p.split(';').next())
                .filter(|m| !m.is_empty())
                .map(str::to_string);
            (mime, data)
        }
        None => (None, payload),
    };
    let bytes = base64::engine::general_purpose::STANDARD.decode(data)?;
    Ok(SynthesizedAudio { bytes, mime })
}

/// Dotted-path lookup into a JSON value (`"outputs.text"`).
pub fn json_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(value, |cur, key| cur.as_object().and_then(|o| o.get(key)))
}

fn non_empty(capability: Capability, text: Option<String>, what: &str) -> Result<String, GatewayError> {
    text.filter(|t| !t.trim().is_empty())
        .ok_or_else(|| GatewayError::empty(capability, format!("response contained no {}", what)))
}

/// Every remote AI function the workflows use.
#[async_trait]
pub trait Capabilities: Send + Sync {
    async fn complete(&self, request: &LlmRequest) -> Result<String, GatewayError>;

    async fn analyze(&self, request: &MultimodalRequest) -> Result<MultimodalReport, GatewayError>;

    /// `document` is a base64 data URL.
    async fn ocr(&self, document: &str) -> Result<String, GatewayError>;

    async fn detect(&self, image: &str, labels: &[String]) -> Result<DetectionReport, GatewayError>;

    async fn transcribe(&self, audio: &str, language: &str) -> Result<String, GatewayError>;

    async fn synthesize(&self, text: &str, voice: &str) -> Result<SynthesizedAudio, GatewayError>;
}

#[async_trait]
impl Capabilities for Gateway {
    async fn complete(&self, request: &LlmRequest) -> Result<String, GatewayError> {
        let resp: LlmResponse = self.post_json(Capability::Chat, request).await?;
        non_empty(Capability::Chat, resp.outputs.and_then(|o| o.text), "output text")
    }

    async fn analyze(&self, request: &MultimodalRequest) -> Result<MultimodalReport, GatewayError> {
        let value: Value = self.post_json(Capability::Multimodal, request).await?;
        MultimodalReport::from_value(value)
    }

    async fn ocr(&self, document: &str) -> Result<String, GatewayError> {
        let req = OcrRequest {
            file_base64: document.to_string(),
        };
        let resp: TextResponse = self.post_json(Capability::Ocr, &req).await?;
        non_empty(Capability::Ocr, resp.text, "extracted text")
    }

    async fn detect(&self, image: &str, labels: &[String]) -> Result<DetectionReport, GatewayError> {
        let req = DetectionRequest {
            image_base64: image.to_string(),
            labels: labels.to_vec(),
        };
        let value: Value = self.post_json(Capability::ObjectDetection, &req).await?;
        DetectionReport::from_value(value)
    }

    async fn transcribe(&self, audio: &str, language: &str) -> Result<String, GatewayError> {
        let req = SttRequest {
            audio_base64: audio.to_string(),
            language: language.to_string(),
        };
        let resp: TextResponse = self.post_json(Capability::SpeechToText, &req).await?;
        non_empty(Capability::SpeechToText, resp.text, "transcript")
    }

    async fn synthesize(&self, text: &str, voice: &str) -> Result<SynthesizedAudio, GatewayError> {
        let req = TtsRequest {
            text: text.to_string(),
            voice: voice.to_string(),
        };
        let resp: TtsResponse = self.post_json(Capability::TextToSpeech, &req).await?;
        let payload = non_empty(Capability::TextToSpeech, resp.audio_base64, "audio")?;
        let audio = decode_audio(&payload).map_err(|e| {
            GatewayError::empty(
                Capability::TextToSpeech,
                format!("audio was not valid base64: {}", e),
            )
        })?;
        if audio.bytes.is_empty() {
            return Err(GatewayError::empty(Capability::TextToSpeech, "audio was empty"));
        }
        Ok(audio)
    }
}
