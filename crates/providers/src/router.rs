use crate::chat::{ChatBackend, FragmentStream};
use crate::gateway::Gateway;
use crate::gemini::GeminiClient;
use crate::llm::HostedLlm;
use async_trait::async_trait;
use shared::agent_api::ChatMessage;
use shared::credentials::ApiKey;
use shared::error::GatewayError;
use shared::settings::{AppSettings, ChatBackendKind};
use std::sync::Arc;

/// The chat backend chosen by settings. A failure is reported as-is; there is
/// no fallback to the other backend.
pub enum ChatRouter {
    Gemini(GeminiClient),
    Hosted(HostedLlm),
}

impl ChatRouter {
    pub fn from_settings(settings: &AppSettings, credential: Option<ApiKey>, gateway: Arc<Gateway>) -> Self {
        match settings.chat_backend {
            ChatBackendKind::Gemini => ChatRouter::Gemini(GeminiClient::new(&settings.gemini_model, credential)),
            ChatBackendKind::Hosted => ChatRouter::Hosted(HostedLlm::new(gateway, &settings.llm_model)),
        }
    }

    pub fn kind(&self) -> ChatBackendKind {
        match self {
            ChatRouter::Gemini(_) => ChatBackendKind::Gemini,
            ChatRouter::Hosted(_) => ChatBackendKind::Hosted,
        }
    }

    fn backend(&self) -> &dyn ChatBackend {
        match self {
            ChatRouter::Gemini(client) => client,
            ChatRouter::Hosted(llm) => llm,
        }
    }
}

#[async_trait]
impl ChatBackend for ChatRouter {
    fn name(&self) -> &str {
        self.backend().name()
    }

    async fn generate(&self, messages: Vec<ChatMessage>) -> Result<String, GatewayError> {
        tracing::debug!(backend = self.name(), messages = messages.len(), "routing chat request");
        self.backend().generate(messages).await
    }

    async fn generate_stream(&self, messages: Vec<ChatMessage>) -> Result<FragmentStream, GatewayError> {
        tracing::debug!(backend = self.name(), messages = messages.len(), "routing chat stream");
        self.backend().generate_stream(messages).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::settings::{AuthScheme, EndpointConfig};

    fn gateway() -> Arc<Gateway> {
        Arc::new(Gateway::new(None, AuthScheme::Bearer, EndpointConfig::default()))
    }

    #[test]
    fn test_router_follows_settings() {
        let mut settings = AppSettings::default();
        assert_eq!(ChatRouter::from_settings(&settings, None, gateway()).name(), "gemini");

        settings.chat_backend = ChatBackendKind::Hosted;
        let router = ChatRouter::from_settings(&settings, None, gateway());
        assert_eq!(router.kind(), ChatBackendKind::Hosted);
        assert_eq!(router.name(), "hosted");
    }

    #[tokio::test]
    async fn test_no_fallback_without_key() {
        let settings = AppSettings::default();
        let err = ChatRouter::from_settings(&settings, None, gateway())
            .generate(vec![ChatMessage::user("hi")])
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::MissingCredential { .. }));
    }
}
