use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("Invalid {capability} endpoint '{url}': {reason}")]
    InvalidUrl {
        capability: Capability,
        url: String,
        reason: String,
    },
    #[error("Unknown auth scheme '{0}' (expected bearer, x-api-key, apikey or bearer + x-api-key)")]
    UnknownScheme(String),
    #[error("Unknown capability '{0}'")]
    UnknownCapability(String),
    #[error("Unknown chat backend '{0}' (expected gemini or hosted)")]
    UnknownBackend(String),
}

/// A remote AI function reachable through the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Chat,
    Multimodal,
    Ocr,
    ObjectDetection,
    SpeechToText,
    TextToSpeech,
}

impl Capability {
    pub const ALL: [Capability; 6] = [
        Capability::Chat,
        Capability::Multimodal,
        Capability::Ocr,
        Capability::ObjectDetection,
        Capability::SpeechToText,
        Capability::TextToSpeech,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Chat => "chat",
            Capability::Multimodal => "multimodal",
            Capability::Ocr => "ocr",
            Capability::ObjectDetection => "object_detection",
            Capability::SpeechToText => "speech_to_text",
            Capability::TextToSpeech => "text_to_speech",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Capability::Chat => "LLM",
            Capability::Multimodal => "LMM",
            Capability::Ocr => "OCR",
            Capability::ObjectDetection => "Object Detection",
            Capability::SpeechToText => "Speech-to-Text",
            Capability::TextToSpeech => "Text-to-Speech",
        }
    }

    /// Environment variable that overrides this capability's endpoint.
    pub fn env_key(&self) -> &'static str {
        match self {
            Capability::Chat => "CONSULTBOT_CHAT_URL",
            Capability::Multimodal => "CONSULTBOT_MULTIMODAL_URL",
            Capability::Ocr => "CONSULTBOT_OCR_URL",
            Capability::ObjectDetection => "CONSULTBOT_OBJECT_DETECTION_URL",
            Capability::SpeechToText => "CONSULTBOT_SPEECH_TO_TEXT_URL",
            Capability::TextToSpeech => "CONSULTBOT_TEXT_TO_SPEECH_URL",
        }
    }

    pub fn default_timeout(&self) -> Duration {
        match self {
            Capability::Chat | Capability::ObjectDetection => Duration::from_secs(120),
            Capability::Multimodal | Capability::Ocr => Duration::from_secs(150),
            Capability::SpeechToText | Capability::TextToSpeech => Duration::from_secs(180),
        }
    }

    pub fn default_endpoint(&self) -> &'static str {
        match self {
            Capability::Chat => "https://telkom-ai-dag-api.apilogy.id/Telkom-LLM/0.0.4/llm",
            Capability::Multimodal => {
                "https://telkom-ai-dag.api.apilogy.id/LargeMultimodalModel/0.0.2"
            }
            Capability::Ocr => "http://telkom-ai-dag.api.apilogy.id/OCR_Document_Based/0.0.5",
            Capability::ObjectDetection => {
                "http://telkom-ai-dag.api.apilogy.id/Object_Detection/0.0.1"
            }
            Capability::SpeechToText => "http://telkom-ai-dag.api.apilogy.id/Speech_To_Text/0.0.2",
            Capability::TextToSpeech => "http://telkom-ai-dag.api.apilogy.id/Text_To_Speech/0.0.2",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Capability {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "chat" | "llm" | "telkom_llm" => Ok(Capability::Chat),
            "multimodal" | "lmm" => Ok(Capability::Multimodal),
            "ocr" => Ok(Capability::Ocr),
            "object_detection" | "od" => Ok(Capability::ObjectDetection),
            "speech_to_text" | "stt" => Ok(Capability::SpeechToText),
            "text_to_speech" | "tts" => Ok(Capability::TextToSpeech),
            _ => Err(SettingsError::UnknownCapability(s.to_string())),
        }
    }
}

/// How the credential is presented to capability endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AuthScheme {
    /// `Authorization: Bearer <key>`
    #[default]
    #[serde(rename = "bearer")]
    Bearer,
    /// `x-api-key: <key>`
    #[serde(rename = "x-api-key")]
    HeaderKey,
    /// `apikey: <key>`
    #[serde(rename = "apikey")]
    AlternateHeaderKey,
    /// Both `Authorization: Bearer <key>` and `x-api-key: <key>`.
    #[serde(rename = "bearer + x-api-key")]
    Both,
}

impl AuthScheme {
    pub const ALL: [AuthScheme; 4] = [
        AuthScheme::Bearer,
        AuthScheme::HeaderKey,
        AuthScheme::AlternateHeaderKey,
        AuthScheme::Both,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AuthScheme::Bearer => "bearer",
            AuthScheme::HeaderKey => "x-api-key",
            AuthScheme::AlternateHeaderKey => "apikey",
            AuthScheme::Both => "bearer + x-api-key",
        }
    }
}

impl fmt::Display for AuthScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthScheme {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .to_lowercase()
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        match normalized.as_str() {
            "bearer" => Ok(AuthScheme::Bearer),
            "x-api-key" | "header-key" => Ok(AuthScheme::HeaderKey),
            "apikey" | "alternate-header-key" => Ok(AuthScheme::AlternateHeaderKey),
            "bearer+x-api-key" | "both" => Ok(AuthScheme::Both),
            _ => Err(SettingsError::UnknownScheme(s.to_string())),
        }
    }
}

/// Capability → endpoint URL, seeded with the defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConfig {
    urls: BTreeMap<Capability, String>,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            urls: Capability::ALL
                .iter()
                .map(|c| (*c, c.default_endpoint().to_string()))
                .collect(),
        }
    }
}

impl EndpointConfig {
    pub fn get(&self, capability: Capability) -> &str {
        self.urls
            .get(&capability)
            .map(|s| s.as_str())
            .unwrap_or_else(|| capability.default_endpoint())
    }

    /// Replace one endpoint. Only absolute http(s) URLs are accepted.
    pub fn set(&mut self, capability: Capability, url: &str) -> Result<(), SettingsError> {
        let url = url.trim();
        let parsed = url::Url::parse(url).map_err(|e| SettingsError::InvalidUrl {
            capability,
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(SettingsError::InvalidUrl {
                capability,
                url: url.to_string(),
                reason: format!("unsupported scheme '{}'", parsed.scheme()),
            });
        }
        self.urls.insert(capability, url.to_string());
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = (Capability, &str)> {
        Capability::ALL.into_iter().map(move |c| (c, self.get(c)))
    }
}

/// Which service answers free-form chat turns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatBackendKind {
    /// Google Gemini with streamed replies.
    #[default]
    Gemini,
    /// The hosted LLM capability behind the gateway.
    Hosted,
}

impl ChatBackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatBackendKind::Gemini => "gemini",
            ChatBackendKind::Hosted => "hosted",
        }
    }
}

impl FromStr for ChatBackendKind {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "gemini" => Ok(ChatBackendKind::Gemini),
            "hosted" | "llm" | "telkom" => Ok(ChatBackendKind::Hosted),
            _ => Err(SettingsError::UnknownBackend(s.to_string())),
        }
    }
}

pub const SCHEME_ENV: &str = "CONSULTBOT_AUTH_SCHEME";
pub const BACKEND_ENV: &str = "CONSULTBOT_CHAT_BACKEND";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSettings {
    pub auth_scheme: AuthScheme,
    pub endpoints: EndpointConfig,
    pub chat_backend: ChatBackendKind,
    pub gemini_model: String, // e.g., "gemini-2.5-flash"
    pub llm_model: String,    // hosted model id sent in the chat payload
    pub stt_language: String,
    pub tts_voice: String,
    pub detection_labels: Vec<String>,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            auth_scheme: AuthScheme::default(),
            endpoints: EndpointConfig::default(),
            chat_backend: ChatBackendKind::default(),
            gemini_model: "gemini-2.5-flash".into(),
            llm_model: "telkom-llm-0.0.4".into(),
            stt_language: "id".into(),
            tts_voice: "id_female_1".into(),
            detection_labels: vec![
                "rack".into(),
                "cable".into(),
                "power-socket".into(),
                "distribution-box".into(),
                "ladder".into(),
            ],
        }
    }
}

impl AppSettings {
    /// Apply overrides from a variable lookup (normally `std::env::var`).
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let present = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(scheme) = present(SCHEME_ENV) {
            self.auth_scheme = scheme.parse()?;
        }
        if let Some(backend) = present(BACKEND_ENV) {
            self.chat_backend = backend.parse()?;
        }
        for capability in Capability::ALL {
            if let Some(url) = present(capability.env_key()) {
                self.endpoints.set(capability, &url)?;
            }
        }
        Ok(())
    }
}
