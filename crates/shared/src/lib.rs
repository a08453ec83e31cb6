//! Types shared by every ConsultBot crate: settings, the session credential,
//! the gateway error taxonomy and chat message shapes.

pub mod credentials;
pub mod error;
pub mod settings;

/// Keep at most `max` characters of `text`, never splitting a code point.
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

pub mod agent_api {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct ChatMessage {
        pub role: String, // "system" | "user" | "assistant"
        pub content: String,
    }

    impl ChatMessage {
        pub fn system(content: impl Into<String>) -> Self {
            Self {
                role: "system".into(),
                content: content.into(),
            }
        }

        pub fn user(content: impl Into<String>) -> Self {
            Self {
                role: "user".into(),
                content: content.into(),
            }
        }

        pub fn assistant(content: impl Into<String>) -> Self {
            Self {
                role: "assistant".into(),
                content: content.into(),
            }
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "lowercase")]
    pub enum Speaker {
        User,
        Assistant,
    }

    impl Speaker {
        pub fn as_str(&self) -> &'static str {
            match self {
                Speaker::User => "user",
                Speaker::Assistant => "assistant",
            }
        }
    }

    /// One speaker's contribution to the conversation.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct ConversationTurn {
        pub speaker: Speaker,
        pub content: String,
        pub timestamp: DateTime<Utc>,
        /// Set on the single assistant entry recorded when a turn fails.
        #[serde(default)]
        pub is_error: bool,
    }

    impl ConversationTurn {
        pub fn user(content: impl Into<String>) -> Self {
            Self {
                speaker: Speaker::User,
                content: content.into(),
                timestamp: Utc::now(),
                is_error: false,
            }
        }

        pub fn assistant(content: impl Into<String>) -> Self {
            Self {
                speaker: Speaker::Assistant,
                content: content.into(),
                timestamp: Utc::now(),
                is_error: false,
            }
        }

        pub fn error(content: impl Into<String>) -> Self {
            Self {
                is_error: true,
                ..Self::assistant(content)
            }
        }

        pub fn to_message(&self) -> ChatMessage {
            ChatMessage {
                role: self.speaker.as_str().to_string(),
                content: self.content.clone(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("", 3), "");
    }

    #[test]
    fn error_turn_is_marked_assistant() {
        let turn = agent_api::ConversationTurn::error("boom");
        assert!(turn.is_error);
        assert_eq!(turn.speaker, agent_api::Speaker::Assistant);
        assert_eq!(turn.to_message().role, "assistant");
    }
}
