//! Authenticated JSON transport shared by every capability endpoint.
//!
//! One auth scheme is active per session. The gateway never retries: an
//! authentication failure is surfaced at once with the scheme that was used.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use shared::credentials::{mask_secret, ApiKey};
use shared::error::{GatewayError, MAX_ERROR_BODY};
use shared::settings::{AuthScheme, Capability, EndpointConfig};
use shared::truncate_chars;
use std::sync::LazyLock;
use std::time::Duration;

pub(crate) static SHARED_HTTP: LazyLock<Client> = LazyLock::new(|| {
    Client::builder()
        .pool_max_idle_per_host(2)
        .build()
        .expect("failed to build HTTP client")
});

const X_API_KEY: HeaderName = HeaderName::from_static("x-api-key");
const APIKEY: HeaderName = HeaderName::from_static("apikey");

/// Build the header map for one scheme. The JSON body is never touched.
pub fn auth_headers(capability: Capability, scheme: AuthScheme, key: &ApiKey) -> Result<HeaderMap, GatewayError> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    let bearer = || header_value(capability, &format!("Bearer {}", key.expose()));
    let raw = || header_value(capability, key.expose());

    match scheme {
        AuthScheme::Bearer => {
            headers.insert(AUTHORIZATION, bearer()?);
        }
        AuthScheme::HeaderKey => {
            headers.insert(X_API_KEY, raw()?);
        }
        AuthScheme::AlternateHeaderKey => {
            headers.insert(APIKEY, raw()?);
        }
        AuthScheme::Both => {
            headers.insert(AUTHORIZATION, bearer()?);
            headers.insert(X_API_KEY, raw()?);
        }
    }
    Ok(headers)
}

fn header_value(capability: Capability, value: &str) -> Result<HeaderValue, GatewayError> {
    let mut value = HeaderValue::from_str(value).map_err(|_| {
        GatewayError::transport(capability, "API key contains characters that are not allowed in HTTP headers")
    })?;
    value.set_sensitive(true);
    Ok(value)
}

/// Header map rendered for debug logs, with credential values masked.
pub fn masked_headers(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            let value = value.to_str().unwrap_or("<binary>");
            let shown = match name.as_str() {
                "authorization" | "x-api-key" | "apikey" | "x-goog-api-key" => mask_secret(value),
                _ => value.to_string(),
            };
            (name.as_str().to_string(), shown)
        })
        .collect()
}

pub struct Gateway {
    http: Client,
    credential: Option<ApiKey>,
    scheme: AuthScheme,
    endpoints: EndpointConfig,
    timeout_override: Option<Duration>,
}

impl Gateway {
    pub fn new(credential: Option<ApiKey>, scheme: AuthScheme, endpoints: EndpointConfig) -> Self {
        Self {
            http: SHARED_HTTP.clone(),
            credential,
            scheme,
            endpoints,
            timeout_override: None,
        }
    }

    /// Use one timeout for every capability instead of the per-capability
    /// defaults.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_override = Some(timeout);
        self
    }

    pub fn scheme(&self) -> AuthScheme {
        self.scheme
    }

    pub fn endpoint(&self, capability: Capability) -> &str {
        self.endpoints.get(capability)
    }

    fn credential(&self, capability: Capability) -> Result<&ApiKey, GatewayError> {
        self.credential
            .as_ref()
            .ok_or(GatewayError::MissingCredential { capability })
    }

    /// Headers for the active scheme; fails before any I/O without a key.
    fn build_headers(&self, capability: Capability) -> Result<HeaderMap, GatewayError> {
        let key = self.credential(capability)?;
        auth_headers(capability, self.scheme, key)
    }

    /// POST `payload` and decode the JSON reply into `R`.
    pub async fn post_json<P, R>(&self, capability: Capability, payload: &P) -> Result<R, GatewayError>
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let resp = self.send(capability, payload).await?;
        decode_json(capability, resp).await
    }

    /// POST `payload` and return the successful response unread.
    pub async fn send<P>(&self, capability: Capability, payload: &P) -> Result<Response, GatewayError>
    where
        P: Serialize + ?Sized,
    {
        let key = self.credential(capability)?;
        let headers = self.build_headers(capability)?;
        let url = self.endpoint(capability);
        let timeout = self
            .timeout_override
            .unwrap_or_else(|| capability.default_timeout());

        tracing::info!(
            capability = capability.as_str(),
            scheme = %self.scheme,
            url,
            "sending capability request"
        );
        tracing::debug!(headers = ?masked_headers(&headers), "request headers");

        let resp = self
            .http
            .post(url)
            .headers(headers)
            .timeout(timeout)
            .json(payload)
            .send()
            .await
            .map_err(|e| transport_error(capability, e))?;

        check_status(capability, self.scheme.as_str(), key, resp).await
    }
}

pub(crate) fn transport_error(capability: Capability, err: reqwest::Error) -> GatewayError {
    let message = if err.is_timeout() {
        format!("timed out after waiting for a response ({})", err)
    } else {
        err.to_string()
    };
    GatewayError::transport(capability, message)
}

/// Map non-success statuses onto the error taxonomy. 401 and 403 are
/// authentication failures; everything else is an HTTP failure.
pub(crate) async fn check_status(
    capability: Capability,
    scheme: &str,
    key: &ApiKey,
    resp: Response,
) -> Result<Response, GatewayError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    let body = truncate_chars(body.trim(), MAX_ERROR_BODY);

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        tracing::warn!(
            capability = capability.as_str(),
            scheme,
            status = status.as_u16(),
            "authentication rejected"
        );
        return Err(GatewayError::Auth {
            capability,
            scheme: scheme.to_string(),
            status: status.as_u16(),
            key_hint: key.hint(),
            body,
        });
    }

    tracing::warn!(
        capability = capability.as_str(),
        status = status.as_u16(),
        "capability request failed"
    );
    Err(GatewayError::Http {
        capability,
        status: status.as_u16(),
        body,
    })
}

/// Non-JSON bodies are transport failures; JSON of the wrong shape is an
/// empty result.
pub(crate) async fn decode_json<R: DeserializeOwned>(
    capability: Capability,
    resp: Response,
) -> Result<R, GatewayError> {
    let bytes = resp
        .bytes()
        .await
        .map_err(|e| transport_error(capability, e))?;
    let value: serde_json::Value = serde_json::from_slice(&bytes).map_err(|e| {
        let preview = truncate_chars(&String::from_utf8_lossy(&bytes), MAX_ERROR_BODY);
        GatewayError::transport(
            capability,
            format!("response was not valid JSON ({}) | body: {}", e, preview),
        )
    })?;
    serde_json::from_value(value)
        .map_err(|e| GatewayError::empty(capability, format!("unexpected response shape: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{serve_once, silent_endpoint};
    use shared::error::FailureKind;

    fn key() -> ApiKey {
        ApiKey::parse("test-key-0123456789").unwrap()
    }

    fn gateway_for(url: &str, scheme: AuthScheme, credential: Option<ApiKey>) -> Gateway {
        let mut endpoints = EndpointConfig::default();
        endpoints.set(Capability::Chat, url).unwrap();
        Gateway::new(credential, scheme, endpoints)
    }

    #[test]
    fn test_header_shapes() {
        let k = key();
        let bearer = auth_headers(Capability::Chat, AuthScheme::Bearer, &k).unwrap();
        assert_eq!(bearer["authorization"], "Bearer test-key-0123456789");
        assert!(bearer.get("x-api-key").is_none());

        let header_key = auth_headers(Capability::Chat, AuthScheme::HeaderKey, &k).unwrap();
        assert_eq!(header_key["x-api-key"], "test-key-0123456789");
        assert!(header_key.get("authorization").is_none());

        let alt = auth_headers(Capability::Chat, AuthScheme::AlternateHeaderKey, &k).unwrap();
        assert_eq!(alt["apikey"], "test-key-0123456789");
        assert_eq!(alt.len(), 2);

        let both = auth_headers(Capability::Chat, AuthScheme::Both, &k).unwrap();
        assert_eq!(both["authorization"], "Bearer test-key-0123456789");
        assert_eq!(both["x-api-key"], "test-key-0123456789");

        for scheme in AuthScheme::ALL {
            let headers = auth_headers(Capability::Chat, scheme, &k).unwrap();
            assert_eq!(headers["content-type"], "application/json");
        }
    }

    #[test]
    fn test_unprintable_key_is_typed_error() {
        let key = ApiKey::parse("abc\ndefghijkl").unwrap();
        let err = auth_headers(Capability::Ocr, AuthScheme::HeaderKey, &key).unwrap_err();
        assert_eq!(err.kind(), FailureKind::Transport);
        assert!(err.to_string().contains("not allowed in HTTP headers"));
    }

    #[test]
    fn test_masked_headers_hide_key() {
        let headers = auth_headers(Capability::Chat, AuthScheme::Both, &ApiKey::parse("abcdefghijklmnopqrstuvwxyz").unwrap()).unwrap();
        for (name, value) in masked_headers(&headers) {
            assert!(!value.contains("uvwxyz"), "{} leaked", name);
        }
    }

    #[tokio::test]
    async fn test_missing_credential_sends_nothing() {
        let mock = serve_once(200, "application/json", "{}");
        let gateway = gateway_for(&mock.url, AuthScheme::Bearer, None);

        let err = gateway
            .post_json::<_, serde_json::Value>(Capability::Chat, &serde_json::json!({"a": 1}))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), FailureKind::MissingCredential);
        assert!(mock.nothing_received());
    }

    #[tokio::test]
    async fn test_scheme_changes_headers_not_body() {
        let payload = serde_json::json!({"inputs": {"prompt": "ping"}});

        let first = serve_once(200, "application/json", "{}");
        gateway_for(&first.url, AuthScheme::Bearer, Some(key()))
            .post_json::<_, serde_json::Value>(Capability::Chat, &payload)
            .await
            .unwrap();
        let bearer = first.captured();

        let second = serve_once(200, "application/json", "{}");
        gateway_for(&second.url, AuthScheme::HeaderKey, Some(key()))
            .post_json::<_, serde_json::Value>(Capability::Chat, &payload)
            .await
            .unwrap();
        let header_key = second.captured();

        assert_eq!(bearer.body, header_key.body);
        assert_eq!(bearer.header("authorization"), Some("Bearer test-key-0123456789"));
        assert_eq!(bearer.header("x-api-key"), None);
        assert_eq!(header_key.header("x-api-key"), Some("test-key-0123456789"));
        assert_eq!(header_key.header("authorization"), None);
    }

    #[tokio::test]
    async fn test_401_is_auth_failure_with_scheme() {
        let mock = serve_once(401, "application/json", r#"{"message":"Invalid credentials"}"#);
        let err = gateway_for(&mock.url, AuthScheme::AlternateHeaderKey, Some(key()))
            .post_json::<_, serde_json::Value>(Capability::Chat, &serde_json::json!({}))
            .await
            .unwrap_err();

        match &err {
            GatewayError::Auth {
                scheme,
                status,
                key_hint,
                body,
                ..
            } => {
                assert_eq!(scheme, "apikey");
                assert_eq!(*status, 401);
                assert_eq!(key_hint, "6789");
                assert!(body.contains("Invalid credentials"));
            }
            other => panic!("expected auth failure, got {:?}", other),
        }
        assert_eq!(err.kind(), FailureKind::Authentication);
    }

    #[tokio::test]
    async fn test_500_body_is_truncated() {
        let long_body = "x".repeat(2_000);
        let mock = serve_once(500, "text/plain", &long_body);
        let err = gateway_for(&mock.url, AuthScheme::Bearer, Some(key()))
            .post_json::<_, serde_json::Value>(Capability::Chat, &serde_json::json!({}))
            .await
            .unwrap_err();

        match err {
            GatewayError::Http { status, body, .. } => {
                assert_eq!(status, 500);
                assert_eq!(body.len(), MAX_ERROR_BODY);
            }
            other => panic!("expected http failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_non_json_reply_is_transport_failure() {
        let mock = serve_once(200, "text/html", "<html>gateway page</html>");
        let err = gateway_for(&mock.url, AuthScheme::Bearer, Some(key()))
            .post_json::<_, serde_json::Value>(Capability::Chat, &serde_json::json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::Transport);
        assert!(err.to_string().contains("gateway page"));
    }

    #[tokio::test]
    async fn test_timeout_is_transport_failure() {
        let url = silent_endpoint();
        let err = gateway_for(&url, AuthScheme::Bearer, Some(key()))
            .with_timeout(Duration::from_millis(200))
            .post_json::<_, serde_json::Value>(Capability::Chat, &serde_json::json!({}))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), FailureKind::Transport);
        assert!(err.to_string().contains("timed out"));
    }
}
