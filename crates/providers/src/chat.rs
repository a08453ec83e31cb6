use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use shared::agent_api::ChatMessage;
use shared::error::GatewayError;

/// Ordered reply fragments. Dropping the stream cancels the request.
pub type FragmentStream = BoxStream<'static, Result<String, GatewayError>>;

/// A conversational model that can answer an assembled message sequence.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(&self, messages: Vec<ChatMessage>) -> Result<String, GatewayError>;

    /// Backends without incremental output yield the full reply as one
    /// fragment.
    async fn generate_stream(&self, messages: Vec<ChatMessage>) -> Result<FragmentStream, GatewayError> {
        let reply = self.generate(messages).await?;
        Ok(Box::pin(stream::once(async move { Ok(reply) })))
    }
}
