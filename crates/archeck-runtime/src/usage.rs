//! Token usage accounting for answering calls.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::providers::TokenUsage;

/// Accumulated LLM usage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LlmUsage {
    pub total_tokens: u32,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,

    /// Number of completed LLM calls
    pub llm_calls: u32,

    /// Estimated cost in USD
    pub estimated_cost: f64,
}

impl LlmUsage {
    pub fn add(&mut self, usage: &TokenUsage, model: &str) {
        self.prompt_tokens += usage.prompt_tokens;
        self.completion_tokens += usage.completion_tokens;
        self.total_tokens += usage.total();
        self.llm_calls += 1;
        self.estimated_cost += estimate_cost(usage, model);
    }
}

/// Rough cost in USD, priced per million tokens.
fn estimate_cost(usage: &TokenUsage, model: &str) -> f64 {
    let (input_rate, output_rate) = match model {
        m if m.contains("opus") => (5.0, 25.0),
        m if m.contains("haiku") => (1.0, 5.0),
        _ => (3.0, 15.0),
    };

    (usage.prompt_tokens as f64 / 1_000_000.0) * input_rate
        + (usage.completion_tokens as f64 / 1_000_000.0) * output_rate
}

/// Thread-safe usage accumulator shared by an answerer's calls.
#[derive(Debug, Default)]
pub struct UsageTracker {
    usage: RwLock<LlmUsage>,
}

impl UsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, usage: &TokenUsage, model: &str) {
        self.usage.write().add(usage, model);
    }

    pub fn snapshot(&self) -> LlmUsage {
        self.usage.read().clone()
    }
}
