//! Failure taxonomy raised by every capability call, whichever endpoint was
//! used.

use crate::settings::Capability;

/// Coarse failure category, used by the surface to pick a presentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Extraction,
    MissingCredential,
    Authentication,
    Transport,
    EmptyResult,
}

/// Response bodies quoted in errors are cut to this many characters.
pub const MAX_ERROR_BODY: usize = 500;

#[derive(Debug, Clone, thiserror::Error)]
pub enum GatewayError {
    #[error("No API key provided for {capability}. Set GEMINI_API_KEY in the environment or .env file, or enter a key for this session.")]
    MissingCredential { capability: Capability },

    #[error("Authentication failed ({status}) calling {capability}. Current scheme: {scheme}. API key (last 4 chars): ...{key_hint}. Check the key or try another auth scheme. Details: {body}")]
    Auth {
        capability: Capability,
        scheme: String,
        status: u16,
        key_hint: String,
        body: String,
    },

    #[error("{capability} returned HTTP {status} | body: {body}")]
    Http {
        capability: Capability,
        status: u16,
        body: String,
    },

    #[error("{capability} request failed: {message}")]
    Transport {
        capability: Capability,
        message: String,
    },

    #[error("{capability} returned no usable result: {detail}")]
    EmptyResult {
        capability: Capability,
        detail: String,
    },
}

impl GatewayError {
    pub fn kind(&self) -> FailureKind {
        match self {
            GatewayError::MissingCredential { .. } => FailureKind::MissingCredential,
            GatewayError::Auth { .. } => FailureKind::Authentication,
            GatewayError::Http { .. } | GatewayError::Transport { .. } => FailureKind::Transport,
            GatewayError::EmptyResult { .. } => FailureKind::EmptyResult,
        }
    }

    pub fn capability(&self) -> Capability {
        match self {
            GatewayError::MissingCredential { capability }
            | GatewayError::Auth { capability, .. }
            | GatewayError::Http { capability, .. }
            | GatewayError::Transport { capability, .. }
            | GatewayError::EmptyResult { capability, .. } => *capability,
        }
    }

    pub fn empty(capability: Capability, detail: impl Into<String>) -> Self {
        GatewayError::EmptyResult {
            capability,
            detail: detail.into(),
        }
    }

    pub fn transport(capability: Capability, message: impl std::fmt::Display) -> Self {
        GatewayError::Transport {
            capability,
            message: message.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        let err = GatewayError::Http {
            capability: Capability::Ocr,
            status: 502,
            body: "bad gateway".into(),
        };
        assert_eq!(err.kind(), FailureKind::Transport);
        assert_eq!(err.capability(), Capability::Ocr);

        let err = GatewayError::empty(Capability::SpeechToText, "no transcript");
        assert_eq!(err.kind(), FailureKind::EmptyResult);
    }

    #[test]
    fn test_auth_message_names_scheme() {
        let err = GatewayError::Auth {
            capability: Capability::Chat,
            scheme: "x-api-key".into(),
            status: 401,
            key_hint: "abcd".into(),
            body: "invalid key".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("x-api-key"));
        assert!(msg.contains("...abcd"));
        assert!(msg.contains("try another auth scheme"));
    }
}
