use crate::chat::{ChatBackend, FragmentStream};
use crate::gateway::{check_status, decode_json, masked_headers, transport_error, SHARED_HTTP};
use crate::sse::{SseEvent, SseParser};
use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use shared::agent_api::ChatMessage;
use shared::credentials::ApiKey;
use shared::error::GatewayError;
use shared::settings::Capability;
use std::collections::VecDeque;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

const GOOG_API_KEY: HeaderName = HeaderName::from_static("x-goog-api-key");

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
}

impl GeminiRequest {
    fn from_messages(messages: Vec<ChatMessage>) -> Self {
        let mut system = Vec::new();
        let mut contents = Vec::with_capacity(messages.len());
        for m in messages {
            if m.role == "system" {
                system.push(GeminiPart { text: m.content });
                continue;
            }
            // Gemini speaks "user" | "model"
            let role = match m.role.as_str() {
                "assistant" => "model",
                other => other,
            };
            contents.push(GeminiContent {
                role: Some(role.to_string()),
                parts: vec![GeminiPart { text: m.content }],
            });
        }
        Self {
            contents,
            system_instruction: (!system.is_empty()).then_some(GeminiContent {
                role: None,
                parts: system,
            }),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
    #[serde(default)]
    error: Option<GeminiErrorBody>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorBody {
    #[serde(default)]
    code: Option<u16>,
    #[serde(default)]
    message: String,
}

impl GeminiResponse {
    /// Text of the first candidate, all parts joined.
    fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|c| c.parts.iter().map(|p| p.text.as_str()).collect())
            .unwrap_or_default()
    }

    fn into_result(self) -> Result<String, GatewayError> {
        if let Some(err) = self.error {
            return Err(GatewayError::transport(
                Capability::Chat,
                format!("gemini error {}: {}", err.code.unwrap_or_default(), err.message),
            ));
        }
        let text = self.text();
        if !text.is_empty() {
            return Ok(text);
        }
        let detail = match self.prompt_feedback.and_then(|f| f.block_reason) {
            Some(reason) => format!("prompt blocked: {}", reason),
            None => "no candidate text in response".to_string(),
        };
        Err(GatewayError::empty(Capability::Chat, detail))
    }
}

/// Google Gemini chat backend. Authenticates with its own key header
/// regardless of the session's gateway scheme.
pub struct GeminiClient {
    http: Client,
    credential: Option<ApiKey>,
    model: String,
    base_url: String,
    timeout: Duration,
}

impl GeminiClient {
    pub fn new(model: &str, credential: Option<ApiKey>) -> Self {
        Self {
            http: SHARED_HTTP.clone(),
            credential,
            model: model.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Capability::Chat.default_timeout(),
        }
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn headers(&self, key: &ApiKey) -> Result<HeaderMap, GatewayError> {
        let mut value = HeaderValue::from_str(key.expose()).map_err(|_| {
            GatewayError::transport(
                Capability::Chat,
                "API key contains characters that are not allowed in HTTP headers",
            )
        })?;
        value.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(GOOG_API_KEY, value);
        Ok(headers)
    }

    async fn post(&self, url: String, messages: Vec<ChatMessage>) -> Result<Response, GatewayError> {
        let key = self
            .credential
            .as_ref()
            .ok_or(GatewayError::MissingCredential {
                capability: Capability::Chat,
            })?;
        let headers = self.headers(key)?;
        let req = GeminiRequest::from_messages(messages);

        tracing::info!(
            capability = Capability::Chat.as_str(),
            scheme = GOOG_API_KEY.as_str(),
            model = %self.model,
            url = %url,
            "sending gemini request"
        );
        tracing::debug!(headers = ?masked_headers(&headers), "request headers");

        let resp = self
            .http
            .post(url)
            .headers(headers)
            .timeout(self.timeout)
            .json(&req)
            .send()
            .await
            .map_err(|e| transport_error(Capability::Chat, e))?;

        check_status(Capability::Chat, GOOG_API_KEY.as_str(), key, resp).await
    }
}

#[async_trait]
impl ChatBackend for GeminiClient {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn generate(&self, messages: Vec<ChatMessage>) -> Result<String, GatewayError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let resp = self.post(url, messages).await?;
        let body: GeminiResponse = decode_json(Capability::Chat, resp).await?;
        body.into_result()
    }

    async fn generate_stream(&self, messages: Vec<ChatMessage>) -> Result<FragmentStream, GatewayError> {
        let url = format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            self.base_url, self.model
        );
        let resp = self.post(url, messages).await?;
        let body = resp
            .bytes_stream()
            .map(|chunk| {
                chunk
                    .map(|b| b.to_vec())
                    .map_err(|e| transport_error(Capability::Chat, e))
            })
            .boxed();
        Ok(fragments(body))
    }
}

struct StreamState {
    body: BoxStream<'static, Result<Vec<u8>, GatewayError>>,
    parser: SseParser,
    pending: VecDeque<Result<String, GatewayError>>,
    finished: bool,
}

impl StreamState {
    fn push_event(&mut self, event: SseEvent) {
        let data = event.data.trim();
        if data.is_empty() || data == "[DONE]" {
            return;
        }
        match serde_json::from_str::<GeminiResponse>(data) {
            Ok(chunk) => {
                if let Some(err) = chunk.error {
                    self.pending.push_back(Err(GatewayError::transport(
                        Capability::Chat,
                        format!(
                            "gemini stream error {}: {}",
                            err.code.unwrap_or_default(),
                            err.message
                        ),
                    )));
                    return;
                }
                let text = chunk.text();
                if !text.is_empty() {
                    self.pending.push_back(Ok(text));
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "undecodable gemini stream event");
                self.pending.push_back(Err(GatewayError::transport(
                    Capability::Chat,
                    format!("stream event was not valid JSON: {}", e),
                )));
            }
        }
    }
}

/// Turn an SSE byte stream into text fragments. The first error ends the
/// stream.
fn fragments(body: BoxStream<'static, Result<Vec<u8>, GatewayError>>) -> FragmentStream {
    let state = StreamState {
        body,
        parser: SseParser::new(),
        pending: VecDeque::new(),
        finished: false,
    };

    stream::unfold(state, |mut st| async move {
        loop {
            if let Some(item) = st.pending.pop_front() {
                if item.is_err() {
                    st.finished = true;
                    st.pending.clear();
                }
                return Some((item, st));
            }
            if st.finished {
                return None;
            }
            match st.body.next().await {
                Some(Ok(chunk)) => {
                    for event in st.parser.feed(&chunk) {
                        st.push_event(event);
                    }
                }
                Some(Err(e)) => {
                    st.finished = true;
                    return Some((Err(e), st));
                }
                None => {
                    st.finished = true;
                    if let Some(event) = st.parser.finish() {
                        st.push_event(event);
                    }
                }
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::serve_once;
    use shared::error::FailureKind;

    fn client(url: &str) -> GeminiClient {
        GeminiClient::new("gemini-2.5-flash", ApiKey::parse("gemini-test-key-1234")).with_base_url(url)
    }

    fn conversation() -> Vec<ChatMessage> {
        vec![
            ChatMessage::user("You are a tutor."),
            ChatMessage::assistant("Understood."),
            ChatMessage::user("What is a prime?"),
        ]
    }

    #[test]
    fn test_request_maps_roles() {
        let req = GeminiRequest::from_messages(vec![
            ChatMessage::system("be brief"),
            ChatMessage::user("hi"),
            ChatMessage::assistant("hello"),
        ]);
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["system_instruction"]["parts"][0]["text"], "be brief");
        assert_eq!(json["contents"][0]["role"], "user");
        assert_eq!(json["contents"][1]["role"], "model");
        assert_eq!(json["contents"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_generate_sends_key_header() {
        let mock = serve_once(
            200,
            "application/json",
            r#"{"candidates":[{"content":{"parts":[{"text":"A number "},{"text":"with two divisors."}]}}]}"#,
        );
        let reply = client(&mock.url).generate(conversation()).await.unwrap();
        assert_eq!(reply, "A number with two divisors.");

        let req = mock.captured();
        assert_eq!(req.url, "/models/gemini-2.5-flash:generateContent");
        assert_eq!(req.header("x-goog-api-key"), Some("gemini-test-key-1234"));
        assert_eq!(req.header("authorization"), None);
        assert_eq!(req.json()["contents"][1]["role"], "model");
    }

    #[tokio::test]
    async fn test_blocked_prompt_is_empty_result() {
        let mock = serve_once(
            200,
            "application/json",
            r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#,
        );
        let err = client(&mock.url).generate(conversation()).await.unwrap_err();
        assert_eq!(err.kind(), FailureKind::EmptyResult);
        assert!(err.to_string().contains("SAFETY"));
    }

    #[tokio::test]
    async fn test_forbidden_names_key_header() {
        let mock = serve_once(403, "application/json", r#"{"error":{"message":"API key not valid"}}"#);
        let err = client(&mock.url).generate(conversation()).await.unwrap_err();
        match err {
            GatewayError::Auth { scheme, key_hint, .. } => {
                assert_eq!(scheme, "x-goog-api-key");
                assert_eq!(key_hint, "1234");
            }
            other => panic!("expected auth failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_key_sends_nothing() {
        let mock = serve_once(200, "application/json", "{}");
        let err = GeminiClient::new("gemini-2.5-flash", None)
            .with_base_url(&mock.url)
            .generate(conversation())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::MissingCredential);
        assert!(mock.nothing_received());
    }

    #[tokio::test]
    async fn test_stream_yields_fragments_in_order() {
        let body = concat!(
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"Two \"}]}}]}\r\n\r\n",
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"divisors\"}]}}]}\r\n\r\n",
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\".\"}]}}]}"
        );
        let mock = serve_once(200, "text/event-stream", body);
        let fragments: Vec<String> = client(&mock.url)
            .generate_stream(conversation())
            .await
            .unwrap()
            .map(|f| f.unwrap())
            .collect()
            .await;
        assert_eq!(fragments, vec!["Two ", "divisors", "."]);
        assert_eq!(
            mock.captured().url,
            "/models/gemini-2.5-flash:streamGenerateContent?alt=sse"
        );
    }

    #[tokio::test]
    async fn test_stream_error_event_ends_stream() {
        let body = concat!(
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"partial\"}]}}]}\n\n",
            "data: {\"error\":{\"code\":500,\"message\":\"internal\"}}\n\n",
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"never\"}]}}]}\n\n"
        );
        let mock = serve_once(200, "text/event-stream", body);
        let items: Vec<_> = client(&mock.url)
            .generate_stream(conversation())
            .await
            .unwrap()
            .collect()
            .await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_deref().unwrap(), "partial");
        assert_eq!(items[1].as_ref().unwrap_err().kind(), FailureKind::Transport);
    }
}
