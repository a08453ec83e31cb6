//! Session credential handling.
//!
//! The key is trimmed and validated once, kept in zeroizing storage, and only
//! ever shown masked.

use std::fmt;
use zeroize::Zeroizing;

/// Keys shorter than this (after trimming) are treated as absent.
pub const MIN_KEY_LEN: usize = 10;

/// Environment variable the credential is read from.
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

#[derive(Clone)]
pub struct ApiKey(Zeroizing<String>);

impl ApiKey {
    /// Returns `None` for empty or implausibly short keys.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.chars().count() < MIN_KEY_LEN {
            return None;
        }
        Some(Self(Zeroizing::new(trimmed.to_string())))
    }

    pub fn from_env() -> Option<Self> {
        std::env::var(API_KEY_ENV)
            .ok()
            .and_then(|raw| Self::parse(&raw))
    }

    pub fn expose(&self) -> &str {
        self.0.as_str()
    }

    /// Last four characters, used in auth failure messages.
    pub fn hint(&self) -> String {
        let chars: Vec<char> = self.0.chars().collect();
        chars[chars.len().saturating_sub(4)..].iter().collect()
    }

    /// `****abcd` form for status lines.
    pub fn masked(&self) -> String {
        format!("****{}", self.hint())
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ApiKey({})", self.masked())
    }
}

/// Mask a header value for debug logging: first 20 characters then `...`.
/// Short values show at most half of themselves.
pub fn mask_secret(value: &str) -> String {
    let shown = (value.chars().count() / 2).min(20);
    let prefix: String = value.chars().take(shown).collect();
    format!("{}...", prefix)
}
