//! Bounded validate-and-rewrite loop.
//!
//! The validator is an unreliable oracle: it may keep rejecting rewrites,
//! or flip between verdicts on an ambiguous policy. Looping until it
//! accepts is therefore unsafe, and every refinement run requires an
//! explicit round budget.
//!
//! Each round validates the current answer and, if it is invalid, records
//! a rewrite. Since an interaction's rewritten answer is write-once, a
//! further round appends a new interaction (linked through
//! `revision_of`) that starts from the previous rewrite.

use serde::{Deserialize, Serialize};

use archeck_core::{Feedback, Interaction, Verdict};

use crate::session::{Session, SessionError};

/// Limits for [`Session::refine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefinementPolicy {
    /// Maximum number of rewrites. Must be at least 1.
    pub max_rounds: u32,
}

impl RefinementPolicy {
    pub fn new(max_rounds: u32) -> Self {
        Self { max_rounds }
    }
}

impl Default for RefinementPolicy {
    fn default() -> Self {
        Self { max_rounds: 2 }
    }
}

/// How a refinement run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefinementStatus {
    /// The last checked answer was confirmed valid
    Compliant,

    /// The validator could not decide; no further rewrite was attempted
    Inconclusive,

    /// The answer was still invalid when the round budget ran out
    BudgetExhausted,
}

/// One validation (and optional rewrite) step.
#[derive(Debug, Clone)]
pub struct RefinementRound {
    /// The interaction as it stood after this round
    pub interaction: Interaction,

    /// Feedback on the answer that was checked at the start of the round
    pub feedback: Feedback,
}

/// Result of [`Session::refine`].
#[derive(Debug, Clone)]
pub struct RefinementOutcome {
    pub status: RefinementStatus,

    pub rounds: Vec<RefinementRound>,

    /// Feedback on the final answer
    pub final_feedback: Feedback,
}

impl RefinementOutcome {
    /// The answer the loop settled on.
    pub fn final_answer(&self) -> Option<&str> {
        self.rounds.last().map(|r| r.interaction.current_answer())
    }

    /// Number of rewrites performed.
    pub fn rewrites(&self) -> usize {
        self.rounds
            .iter()
            .filter(|r| r.interaction.is_rewritten())
            .count()
    }
}

impl Session {
    /// Validate `interaction` and rewrite it until it passes, the validator
    /// becomes inconclusive, or `policy.max_rounds` rewrites have been made.
    ///
    /// Collaborator failures abort the run and are returned unchanged; the
    /// interactions and rewrites recorded so far stay in the history.
    pub async fn refine(
        &mut self,
        interaction: &Interaction,
        policy: RefinementPolicy,
    ) -> Result<RefinementOutcome, SessionError> {
        if policy.max_rounds == 0 {
            return Err(SessionError::InvalidInput(
                "refinement needs a budget of at least one round".to_string(),
            ));
        }

        let mut feedback = self.validate_interaction(interaction).await?;
        let mut current = self
            .interaction(interaction.id())
            .cloned()
            .unwrap_or_else(|| interaction.clone());
        let mut rounds = Vec::new();

        for round in 1..=policy.max_rounds {
            match feedback.verdict() {
                Verdict::Valid => {
                    return Ok(finish(RefinementStatus::Compliant, rounds, current, feedback));
                }
                Verdict::Inconclusive => {
                    return Ok(finish(RefinementStatus::Inconclusive, rounds, current, feedback));
                }
                Verdict::Invalid => {}
            }

            if current.is_rewritten() {
                // The rewrite was already checked; its findings carry over.
                let seed = current.current_answer().to_string();
                current = self.add_revision(&current, &seed)?;
                feedback = Feedback::parse(
                    current.id(),
                    current.answer(),
                    feedback.raw_findings().clone(),
                )?;
            }

            tracing::info!(
                conversation = %self.id(),
                interaction = %current.id(),
                round,
                max_rounds = policy.max_rounds,
                "Refinement round"
            );

            let rewritten = self.rewrite_answer(&current, &feedback).await?;
            rounds.push(RefinementRound {
                interaction: rewritten.clone(),
                feedback,
            });
            current = rewritten;
            feedback = self.validate_interaction(&current).await?;
        }

        let status = match feedback.verdict() {
            Verdict::Valid => RefinementStatus::Compliant,
            Verdict::Inconclusive => RefinementStatus::Inconclusive,
            Verdict::Invalid => {
                tracing::warn!(
                    conversation = %self.id(),
                    interaction = %current.id(),
                    max_rounds = policy.max_rounds,
                    "Refinement budget exhausted with answer still invalid"
                );
                RefinementStatus::BudgetExhausted
            }
        };

        Ok(RefinementOutcome {
            status,
            rounds,
            final_feedback: feedback,
        })
    }
}

fn finish(
    status: RefinementStatus,
    mut rounds: Vec<RefinementRound>,
    current: Interaction,
    feedback: Feedback,
) -> RefinementOutcome {
    if rounds.is_empty() {
        rounds.push(RefinementRound {
            interaction: current,
            feedback: feedback.clone(),
        });
    }
    RefinementOutcome {
        status,
        rounds,
        final_feedback: feedback,
    }
}
