use crate::capabilities::{Capabilities, LlmRequest};
use crate::chat::ChatBackend;
use crate::gateway::Gateway;
use async_trait::async_trait;
use shared::agent_api::ChatMessage;
use shared::error::GatewayError;
use std::sync::Arc;

/// The hosted LLM capability behind the chat trait. It does not stream, so
/// its stream is the whole reply as one fragment.
pub struct HostedLlm {
    gateway: Arc<Gateway>,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl HostedLlm {
    pub fn new(gateway: Arc<Gateway>, model: &str) -> Self {
        Self {
            gateway,
            model: model.to_string(),
            temperature: LlmRequest::DEFAULT_TEMPERATURE,
            max_tokens: LlmRequest::DEFAULT_MAX_TOKENS,
        }
    }

    pub fn with_sampling(mut self, temperature: f32, max_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }
}

#[async_trait]
impl ChatBackend for HostedLlm {
    fn name(&self) -> &str {
        "hosted"
    }

    async fn generate(&self, messages: Vec<ChatMessage>) -> Result<String, GatewayError> {
        let req = LlmRequest::from_messages(&self.model, messages)
            .with_sampling(self.temperature, self.max_tokens);
        self.gateway.complete(&req).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::serve_once;
    use futures::StreamExt;
    use shared::credentials::ApiKey;
    use shared::settings::{AuthScheme, Capability, EndpointConfig};

    #[tokio::test]
    async fn test_hosted_stream_is_single_fragment() {
        let mock = serve_once(200, "application/json", r#"{"outputs":{"text":"Halo!"}}"#);
        let mut endpoints = EndpointConfig::default();
        endpoints.set(Capability::Chat, &mock.url).unwrap();
        let gateway = Gateway::new(ApiKey::parse("hosted-key-5555"), AuthScheme::HeaderKey, endpoints);
        let llm = HostedLlm::new(Arc::new(gateway), "telkom-llm-0.0.4");

        let fragments: Vec<_> = llm
            .generate_stream(vec![ChatMessage::user("hai")])
            .await
            .unwrap()
            .collect()
            .await;
        assert_eq!(fragments.len(), 1);
        assert_eq!(fragments[0].as_deref().unwrap(), "Halo!");

        let sent = mock.captured();
        assert_eq!(sent.header("x-api-key"), Some("hosted-key-5555"));
        assert_eq!(sent.json()["model"], "telkom-llm-0.0.4");
        assert_eq!(sent.json()["inputs"]["messages"][0]["content"], "hai");
    }
}
