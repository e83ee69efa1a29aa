use std::time::Duration;

use serde::Deserialize;

/// Annotation pipeline configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AssistConfig {
    /// Analyzer backend base URL
    pub base_url: String,
    /// Language sent with grammar checks
    pub language: String,
    pub request_timeout_ms: u64,

    pub grammar_enabled: bool,
    pub grammar_debounce_ms: u64,
    /// Texts shorter than this (in characters) are not checked
    pub grammar_min_chars: usize,
    /// A length change above this always triggers a recheck
    pub grammar_length_threshold: usize,

    pub completion_enabled: bool,
    pub completion_debounce_ms: u64,
    /// Characters before the cursor sent as context
    pub completion_context_chars: usize,
    /// Minimum trimmed context length before asking
    pub completion_min_chars: usize,
    pub completion_max_words: u32,
}

impl Default for AssistConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            language: "en-US".to_string(),
            request_timeout_ms: 15_000,
            grammar_enabled: true,
            grammar_debounce_ms: 1500,
            grammar_min_chars: 5,
            grammar_length_threshold: 5,
            completion_enabled: true,
            completion_debounce_ms: 1000,
            completion_context_chars: 800,
            completion_min_chars: 20,
            completion_max_words: 15,
        }
    }
}

impl AssistConfig {
    pub fn grammar_debounce(&self) -> Duration {
        Duration::from_millis(self.grammar_debounce_ms)
    }

    pub fn completion_debounce(&self) -> Duration {
        Duration::from_millis(self.completion_debounce_ms)
    }
}
