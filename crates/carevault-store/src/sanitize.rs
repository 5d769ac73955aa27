//! Sanitization gate applied to payloads entering and leaving the store.
//!
//! The rules are domain-specific, so the store only depends on the
//! [`Sanitizer`] trait. Implementations must be idempotent: cleaning an
//! already-clean value returns it unchanged, because loads re-run the gate on
//! values that were cleaned when saved.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Rejection reported by a sanitizer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct SanitizeError {
    /// Why the payload was rejected.
    pub reason: String,
}

impl SanitizeError {
    /// Creates a rejection with the given reason.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Validates and cleans payloads.
pub trait Sanitizer: Send + Sync {
    /// Returns the cleaned payload, or a rejection.
    fn clean(&self, payload: Value) -> Result<Value, SanitizeError>;
}

/// Accepts every payload unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughSanitizer;

impl Sanitizer for PassthroughSanitizer {
    fn clean(&self, payload: Value) -> Result<Value, SanitizeError> {
        Ok(payload)
    }
}

/// Configuration for [`TextSanitizer`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TextSanitizerConfig {
    /// Maximum nesting depth of arrays and objects.
    pub max_depth: usize,
    /// Maximum length of any single string, in characters.
    pub max_string_chars: usize,
    /// Case-insensitive substrings that cause rejection.
    pub blocked_markers: Vec<String>,
}

impl Default for TextSanitizerConfig {
    fn default() -> Self {
        Self {
            max_depth: 32,
            max_string_chars: 65_536,
            blocked_markers: vec![
                "<script".to_string(),
                "javascript:".to_string(),
                "onerror=".to_string(),
            ],
        }
    }
}

/// Strips control characters from strings and rejects markup that could be
/// rendered as active content.
#[derive(Debug, Clone, Default)]
pub struct TextSanitizer {
    config: TextSanitizerConfig,
}

impl TextSanitizer {
    /// Creates a sanitizer with the given configuration.
    pub fn new(config: TextSanitizerConfig) -> Self {
        let blocked_markers = config
            .blocked_markers
            .into_iter()
            .map(|m| m.to_lowercase())
            .collect();
        Self {
            config: TextSanitizerConfig {
                blocked_markers,
                ..config
            },
        }
    }

    fn clean_value(&self, value: Value, depth: usize) -> Result<Value, SanitizeError> {
        if depth > self.config.max_depth {
            return Err(SanitizeError::new(format!(
                "nesting deeper than {} levels",
                self.config.max_depth
            )));
        }
        match value {
            Value::String(s) => self.clean_str(&s).map(Value::String),
            Value::Array(items) => items
                .into_iter()
                .map(|v| self.clean_value(v, depth + 1))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Value::Object(obj) => {
                let mut cleaned = Map::new();
                for (k, v) in obj {
                    let k = self.clean_str(&k)?;
                    cleaned.insert(k, self.clean_value(v, depth + 1)?);
                }
                Ok(Value::Object(cleaned))
            }
            other => Ok(other),
        }
    }

    fn clean_str(&self, s: &str) -> Result<String, SanitizeError> {
        let cleaned: String = s
            .chars()
            .filter(|c| !c.is_control() || matches!(c, '\n' | '\r' | '\t'))
            .collect();

        if cleaned.chars().count() > self.config.max_string_chars {
            return Err(SanitizeError::new(format!(
                "string longer than {} characters",
                self.config.max_string_chars
            )));
        }

        let lowered = cleaned.to_lowercase();
        if let Some(marker) = self
            .config
            .blocked_markers
            .iter()
            .find(|m| lowered.contains(m.as_str()))
        {
            return Err(SanitizeError::new(format!(
                "blocked content '{}'",
                marker
            )));
        }
        Ok(cleaned)
    }
}

impl Sanitizer for TextSanitizer {
    fn clean(&self, payload: Value) -> Result<Value, SanitizeError> {
        self.clean_value(payload, 0)
    }
}
