//! LLM-backed answering collaborator.

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use std::sync::Arc;

use archeck_core::Interaction;

use crate::collaborators::{Answerer, CollaboratorError};
use crate::prompts::answer_system_prompt;
use crate::providers::{ChatMessage, CompletionConfig, LlmProvider};
use crate::usage::{LlmUsage, UsageTracker};

lazy_static! {
    /// A whole completion wrapped in a fenced block: ```lang\n ... \n```
    static ref FENCED_BLOCK: Regex = Regex::new(r"(?s)^```[A-Za-z0-9_-]*\s*\n(.*?)\n?```$").unwrap();

    /// Leading label some models add despite instructions ("Revised answer:")
    static ref ANSWER_LABEL: Regex = Regex::new(r"(?i)^(?:revised\s+)?answer\s*:\s*").unwrap();
}

/// Answers questions through an [`LlmProvider`].
///
/// The conversation history is replayed as alternating user/assistant
/// turns, using each interaction's current answer.
pub struct LlmAnswerer {
    provider: Arc<dyn LlmProvider>,
    config: CompletionConfig,
    system_prompt: String,
    usage: UsageTracker,
}

impl LlmAnswerer {
    pub fn new(provider: Arc<dyn LlmProvider>, config: CompletionConfig) -> Self {
        Self {
            provider,
            config,
            system_prompt: answer_system_prompt(None),
            usage: UsageTracker::new(),
        }
    }

    /// Append operator-supplied policy context to the system prompt.
    pub fn with_policy_context(mut self, context: &str) -> Self {
        self.system_prompt = answer_system_prompt(Some(context));
        self
    }

    pub fn config(&self) -> &CompletionConfig {
        &self.config
    }

    fn build_messages(&self, question: &str, context: &[Interaction]) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(context.len() * 2 + 2);
        messages.push(ChatMessage::system(self.system_prompt.clone()));
        for interaction in context {
            messages.push(ChatMessage::user(interaction.question()));
            messages.push(ChatMessage::assistant(interaction.current_answer()));
        }
        messages.push(ChatMessage::user(question));
        messages
    }
}

/// Strip wrapping artifacts from a completion: surrounding whitespace, a
/// fenced block around the whole text, an "Answer:" label and matching
/// outer quotes. Quotes are kept when the text quotes something inside.
pub fn normalize_completion(raw: &str) -> String {
    let mut text = raw.trim();

    if let Some(inner) = FENCED_BLOCK.captures(text).and_then(|c| c.get(1)) {
        text = inner.as_str().trim();
    }

    if let Some(label) = ANSWER_LABEL.find(text) {
        text = text[label.end()..].trim_start();
    }

    for quote in ['"', '\''] {
        if text.len() >= 2 && text.starts_with(quote) && text.ends_with(quote) {
            let inner = &text[1..text.len() - 1];
            if !inner.contains(quote) {
                text = inner.trim();
            }
            break;
        }
    }

    text.to_string()
}

#[async_trait]
impl Answerer for LlmAnswerer {
    async fn generate(
        &self,
        question: &str,
        context: &[Interaction],
    ) -> Result<String, CollaboratorError> {
        let messages = self.build_messages(question, context);

        let response = self.provider.complete(messages, &self.config).await?;
        self.usage.record(&response.usage, &response.model);

        tracing::debug!(
            provider = self.provider.name(),
            model = %response.model,
            prompt_tokens = response.usage.prompt_tokens,
            completion_tokens = response.usage.completion_tokens,
            stop_reason = ?response.stop_reason,
            "Completion received"
        );

        let answer = normalize_completion(&response.content);
        if answer.is_empty() {
            return Err(CollaboratorError::Decode(
                "completion contained no answer text".to_string(),
            ));
        }
        Ok(answer)
    }

    fn usage(&self) -> Option<LlmUsage> {
        Some(self.usage.snapshot())
    }

    fn name(&self) -> &str {
        self.provider.name()
    }
}
