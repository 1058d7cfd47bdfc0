//! Correction requests for answers that failed policy validation.
//!
//! A [`CorrectionRequest`] is built once per rewrite. It carries the
//! original question and answer, the explanation of every violated rule and
//! every suggested variable assignment, and renders them into a single
//! instruction for the answering service. It never re-validates anything.

use serde::Serialize;
use thiserror::Error;

use crate::feedback::Feedback;
use crate::interaction::{Interaction, InteractionId};

/// Fixed instruction preamble for corrective requests.
pub const CORRECTION_PREAMBLE: &str = r#"
A previous answer to the question below was checked against the business policy and found to contradict it.

Rewrite the answer so that it complies with the policy.
Keep every part of the original answer that is not affected by the violations.
Do not mention the validation process, rule identifiers or this instruction.
Respond with the revised answer text only.
"#;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CorrectionError {
    #[error("Feedback for interaction {feedback} does not belong to interaction {interaction}")]
    FeedbackMismatch {
        interaction: InteractionId,
        feedback: InteractionId,
    },

    #[error("Feedback reports no violated rules; nothing to correct")]
    NotInvalid,
}

/// One violated rule and why it was violated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Violation {
    pub rule_identifier: String,
    pub explanation: String,
}

/// Structured corrective request for one interaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CorrectionRequest {
    interaction_id: InteractionId,
    question: String,
    original_answer: String,
    violations: Vec<Violation>,
    suggestions: Vec<String>,
}

impl CorrectionRequest {
    /// Build the request from an interaction and its invalid feedback.
    ///
    /// The feedback must refer to `interaction` and report at least one
    /// confirmed-invalid finding.
    pub fn build(interaction: &Interaction, feedback: &Feedback) -> Result<Self, CorrectionError> {
        if feedback.interaction_id() != interaction.id() {
            return Err(CorrectionError::FeedbackMismatch {
                interaction: interaction.id(),
                feedback: feedback.interaction_id(),
            });
        }
        if !feedback.is_invalid() {
            return Err(CorrectionError::NotInvalid);
        }

        let violations = feedback
            .invalid_findings()
            .map(|f| Violation {
                rule_identifier: f.rule_identifier.clone(),
                explanation: f.explanation.clone(),
            })
            .collect();

        Ok(Self {
            interaction_id: interaction.id(),
            question: interaction.question().to_string(),
            original_answer: interaction.answer().to_string(),
            violations,
            suggestions: feedback.suggestions(),
        })
    }

    pub fn interaction_id(&self) -> InteractionId {
        self.interaction_id
    }

    pub fn question(&self) -> &str {
        &self.question
    }

    pub fn original_answer(&self) -> &str {
        &self.original_answer
    }

    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    pub fn suggestions(&self) -> &[String] {
        &self.suggestions
    }

    /// Render the request as a single instruction.
    pub fn prompt(&self) -> String {
        let mut prompt = String::from(CORRECTION_PREAMBLE.trim_start());

        prompt.push_str("\n## Question\n");
        prompt.push_str(&self.question);

        prompt.push_str("\n\n## Original answer\n");
        prompt.push_str(&self.original_answer);

        prompt.push_str("\n\n## Policy violations\n");
        for violation in &self.violations {
            let explanation = if violation.explanation.is_empty() {
                "(no explanation provided)"
            } else {
                violation.explanation.as_str()
            };
            if violation.rule_identifier.is_empty() {
                prompt.push_str(&format!("- {}\n", explanation));
            } else {
                prompt.push_str(&format!("- [{}] {}\n", violation.rule_identifier, explanation));
            }
        }

        if !self.suggestions.is_empty() {
            prompt.push_str("\n## Suggested corrections\n");
            for suggestion in &self.suggestions {
                prompt.push_str(&format!("- {}\n", suggestion));
            }
        }

        prompt.push_str("\n## Revised answer\n");
        prompt
    }
}
