//! Reminder text generation.
//!
//! The generator prefers a remote text-completion provider and degrades to a
//! curated list whenever the provider is missing, slow, failing or returns
//! nothing usable. It never returns an error.

pub mod catalog;
mod groq;

pub use groq::{GroqClient, GroqConfig};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::Result;
use crate::domain::{Language, RandomSource, ThreadRandom};

/// Token budget for a generated reminder.
const MAX_TOKENS: u32 = 500;

/// Sampling temperature for generated reminders.
const TEMPERATURE: f32 = 0.9;

/// Longest reminder body in characters before truncation.
const MAX_MESSAGE_CHARS: usize = 60;

/// Default bound on a single completion call.
pub const DEFAULT_GENERATION_TIMEOUT: Duration = Duration::from_secs(10);

/// Remote text-completion capability.
#[async_trait]
pub trait TextCompletion: Send + Sync {
    /// Provider name, for logs.
    fn provider(&self) -> &'static str;

    /// Complete `prompt`.
    async fn complete(&self, prompt: &str, max_tokens: u32, temperature: f32) -> Result<String>;
}

/// Produces reminder bodies in the subscriber's language.
#[derive(Clone)]
pub struct MessageGenerator {
    completion: Option<Arc<dyn TextCompletion>>,
    timeout: Duration,
    random: Arc<dyn RandomSource>,
}

impl MessageGenerator {
    /// Generator that only ever uses the curated lists.
    pub fn fallback_only() -> Self {
        Self {
            completion: None,
            timeout: DEFAULT_GENERATION_TIMEOUT,
            random: Arc::new(ThreadRandom),
        }
    }

    /// Generator backed by a completion provider.
    pub fn with_completion(completion: Arc<dyn TextCompletion>, timeout: Duration) -> Self {
        Self {
            completion: Some(completion),
            timeout,
            random: Arc::new(ThreadRandom),
        }
    }

    /// Replace the random source used to pick fallback messages.
    pub fn with_random(mut self, random: Arc<dyn RandomSource>) -> Self {
        self.random = random;
        self
    }

    /// Reminder text for `locale`.
    pub async fn generate(&self, locale: &str) -> String {
        let language = Language::from_locale(locale);

        let Some(completion) = &self.completion else {
            return self.fallback(language);
        };

        let call = completion.complete(catalog::prompt(language), MAX_TOKENS, TEMPERATURE);
        let text = match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => {
                warn!(
                    provider = completion.provider(),
                    language = %language,
                    error = %e,
                    "Message generation failed, using fallback"
                );
                return self.fallback(language);
            }
            Err(_) => {
                warn!(
                    provider = completion.provider(),
                    language = %language,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Message generation timed out, using fallback"
                );
                return self.fallback(language);
            }
        };

        debug!(provider = completion.provider(), language = %language, raw = %text, "Message generated");

        match clean_generated(&text) {
            Some(message) => message,
            None => {
                debug!(language = %language, "Generated message was empty, using fallback");
                self.fallback(language)
            }
        }
    }

    /// Uniformly random curated reminder for `language`.
    pub fn fallback(&self, language: Language) -> String {
        let messages = catalog::fallback_messages(language);
        messages[self.random.pick_index(messages.len())].to_string()
    }
}

impl std::fmt::Debug for MessageGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageGenerator")
            .field("provider", &self.completion.as_ref().map(|c| c.provider()))
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Strip whitespace and one pair of surrounding quotes, cap the length.
///
/// Returns `None` when nothing is left.
pub fn clean_generated(text: &str) -> Option<String> {
    let trimmed = text.trim();
    let trimmed = trimmed
        .strip_prefix(['"', '\''])
        .unwrap_or(trimmed);
    let trimmed = trimmed.strip_suffix(['"', '\'']).unwrap_or(trimmed);
    let trimmed = trimmed.trim();

    if trimmed.is_empty() {
        return None;
    }

    if trimmed.chars().count() > MAX_MESSAGE_CHARS {
        let mut cut: String = trimmed.chars().take(MAX_MESSAGE_CHARS).collect();
        cut.push_str("...");
        return Some(cut);
    }

    Some(trimmed.to_string())
}
