//! Session orchestrator: one checked conversation.
//!
//! The session owns the conversation history and composes the answering
//! and validation collaborators with the core feedback and correction
//! model.
//!
//! # Ownership
//! A session is single-writer. Operations that append to or update the
//! history take `&mut self`, so two callers cannot interleave them without
//! external synchronisation (wrap the session in a `tokio::sync::Mutex` if
//! it must be shared). Independent sessions share nothing and may run
//! concurrently.
//!
//! # Failure policy
//! Nothing is recovered locally. Collaborator failures surface as
//! [`SessionError::Upstream`] and are never retried here; the caller
//! decides whether to retry, abort or fall back to manual input.

use std::sync::Arc;
use thiserror::Error;

use archeck_core::{
    ConversationId, CorrectionError, CorrectionRequest, Feedback, FeedbackError, History,
    Interaction, InteractionError, InteractionId, PolicyError, PolicyRef,
};

use crate::collaborators::{Answerer, CollaboratorError, Validator};
use crate::usage::LlmUsage;

/// Errors from session operations.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Upstream call failed: {0}")]
    Upstream(#[from] CollaboratorError),

    #[error("Malformed validation response: {0}")]
    MalformedResponse(#[from] FeedbackError),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl From<CorrectionError> for SessionError {
    fn from(err: CorrectionError) -> Self {
        SessionError::InvalidState(err.to_string())
    }
}

impl From<PolicyError> for SessionError {
    fn from(err: PolicyError) -> Self {
        SessionError::InvalidInput(err.to_string())
    }
}

/// A checked conversation.
pub struct Session {
    id: ConversationId,
    policy: PolicyRef,
    answerer: Arc<dyn Answerer>,
    validator: Arc<dyn Validator>,
    history: History,
}

impl Session {
    /// Create a session with an empty history.
    pub fn new(
        answerer: Arc<dyn Answerer>,
        validator: Arc<dyn Validator>,
        policy: PolicyRef,
    ) -> Self {
        Self {
            id: ConversationId::new(),
            policy,
            answerer,
            validator,
            history: History::new(),
        }
    }

    pub fn id(&self) -> ConversationId {
        self.id
    }

    pub fn policy(&self) -> &PolicyRef {
        &self.policy
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn interaction(&self, id: InteractionId) -> Option<&Interaction> {
        self.history.get(id)
    }

    /// Usage reported by the answering service, if it meters any.
    pub fn answerer_usage(&self) -> Option<LlmUsage> {
        self.answerer.usage()
    }

    /// Ask the answering service and record the result.
    ///
    /// The history is only touched once an answer has been received; a
    /// failed call leaves it exactly as it was.
    pub async fn ask_question(&mut self, question: &str) -> Result<Interaction, SessionError> {
        if question.trim().is_empty() {
            return Err(SessionError::InvalidInput(
                InteractionError::EmptyQuestion.to_string(),
            ));
        }

        tracing::debug!(
            conversation = %self.id,
            answerer = self.answerer.name(),
            context = self.history.len(),
            "Requesting answer"
        );

        let answer = self
            .answerer
            .generate(question, self.history.as_slice())
            .await
            .map_err(|e| {
                tracing::warn!(conversation = %self.id, error = %e, "Answerer call failed");
                SessionError::Upstream(e)
            })?;

        let interaction = Interaction::new(self.id, question, answer).map_err(|e| match e {
            InteractionError::EmptyAnswer => SessionError::Upstream(CollaboratorError::Decode(
                "answerer returned an empty answer".to_string(),
            )),
            other => SessionError::InvalidInput(other.to_string()),
        })?;

        Ok(self.append(interaction))
    }

    /// Record a caller-supplied question and answer without calling the
    /// answering service.
    pub fn add_qa(&mut self, question: &str, answer: &str) -> Result<Interaction, SessionError> {
        let interaction = Interaction::new(self.id, question, answer)
            .map_err(|e| SessionError::InvalidInput(e.to_string()))?;
        Ok(self.append(interaction))
    }

    /// Validate the interaction's current answer against the configured
    /// policy.
    ///
    /// Read-only with respect to the history. Every call reaches the
    /// validator; results are not cached.
    pub async fn validate_interaction(
        &self,
        interaction: &Interaction,
    ) -> Result<Feedback, SessionError> {
        let stored = self.owned(interaction)?;
        let answer = stored.current_answer();

        tracing::debug!(
            conversation = %self.id,
            interaction = %stored.id(),
            validator = self.validator.name(),
            policy = %self.policy.policy_id,
            rewritten = stored.is_rewritten(),
            "Validating answer"
        );

        let payload = self
            .validator
            .check(stored.question(), answer, &self.policy)
            .await
            .map_err(|e| {
                tracing::warn!(
                    conversation = %self.id,
                    interaction = %stored.id(),
                    error = %e,
                    "Validator call failed"
                );
                match e {
                    CollaboratorError::MalformedPayload(msg) => {
                        SessionError::MalformedResponse(FeedbackError::Decode(msg))
                    }
                    other => SessionError::Upstream(other),
                }
            })?;

        let feedback = Feedback::parse(stored.id(), answer, payload).map_err(|e| {
            tracing::warn!(
                conversation = %self.id,
                interaction = %stored.id(),
                error = %e,
                "Validator returned a malformed payload"
            );
            SessionError::MalformedResponse(e)
        })?;

        tracing::info!(
            conversation = %self.id,
            interaction = %stored.id(),
            verdict = %feedback.verdict(),
            invalid_rules = ?feedback.invalid_rules(),
            "Validation complete"
        );

        Ok(feedback)
    }

    /// Ask the answering service for a policy-compliant revision and record
    /// it as the interaction's rewritten answer.
    ///
    /// Only defined for invalid feedback about this interaction's current
    /// answer. The rewritten answer is NOT re-validated; call
    /// [`validate_interaction`](Self::validate_interaction) again (or use
    /// [`refine`](Self::refine)) to check it.
    pub async fn rewrite_answer(
        &mut self,
        interaction: &Interaction,
        feedback: &Feedback,
    ) -> Result<Interaction, SessionError> {
        let stored = self.owned(interaction)?;
        let id = stored.id();

        if !feedback.is_invalid() {
            return Err(SessionError::InvalidState(format!(
                "cannot rewrite interaction {}: feedback verdict is {}",
                id,
                feedback.verdict()
            )));
        }
        if stored.is_rewritten() {
            return Err(SessionError::InvalidState(
                InteractionError::AlreadyRewritten(id).to_string(),
            ));
        }
        if feedback.validated_answer() != stored.current_answer() {
            return Err(SessionError::InvalidState(format!(
                "feedback for interaction {} was produced for a different answer",
                id
            )));
        }

        let request = CorrectionRequest::build(stored, feedback)?;

        tracing::debug!(
            conversation = %self.id,
            interaction = %id,
            violations = request.violations().len(),
            suggestions = request.suggestions().len(),
            "Requesting corrected answer"
        );

        let rewritten = self
            .answerer
            .generate(&request.prompt(), self.history.before(id))
            .await
            .map_err(|e| {
                tracing::warn!(conversation = %self.id, interaction = %id, error = %e, "Correction call failed");
                SessionError::Upstream(e)
            })?;

        let updated = self
            .history
            .record_rewrite(id, rewritten)
            .map_err(|e| match e {
                InteractionError::EmptyAnswer => SessionError::Upstream(CollaboratorError::Decode(
                    "answerer returned an empty correction".to_string(),
                )),
                other => SessionError::InvalidState(other.to_string()),
            })?
            .cloned()
            .ok_or_else(|| {
                SessionError::InvalidState(format!("interaction {} vanished from history", id))
            })?;

        tracing::info!(conversation = %self.id, interaction = %id, "Recorded rewritten answer");

        Ok(updated)
    }

    /// Append a follow-up interaction that revises `previous`.
    pub(crate) fn add_revision(
        &mut self,
        previous: &Interaction,
        answer: &str,
    ) -> Result<Interaction, SessionError> {
        let interaction = Interaction::new(self.id, previous.question(), answer)
            .map_err(|e| SessionError::InvalidInput(e.to_string()))?
            .revising(previous.id());
        Ok(self.append(interaction))
    }

    fn append(&mut self, interaction: Interaction) -> Interaction {
        tracing::info!(
            conversation = %self.id,
            interaction = %interaction.id(),
            position = self.history.len(),
            "Recorded interaction"
        );
        self.history.push(interaction.clone());
        interaction
    }

    /// Resolve `interaction` to the copy stored in this session's history.
    fn owned(&self, interaction: &Interaction) -> Result<&Interaction, SessionError> {
        if interaction.conversation_id() != self.id {
            return Err(SessionError::InvalidState(format!(
                "interaction {} belongs to conversation {}, not {}",
                interaction.id(),
                interaction.conversation_id(),
                self.id
            )));
        }

        self.history.get(interaction.id()).ok_or_else(|| {
            SessionError::InvalidState(format!(
                "interaction {} was not recorded in conversation {}",
                interaction.id(),
                self.id
            ))
        })
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("policy", &self.policy)
            .field("answerer", &self.answerer.name())
            .field("validator", &self.validator.name())
            .field("interactions", &self.history.len())
            .finish()
    }
}

/// Builder for [`Session`].
pub struct SessionBuilder {
    answerer: Option<Arc<dyn Answerer>>,
    validator: Option<Arc<dyn Validator>>,
    policy: Option<PolicyRef>,
}

impl SessionBuilder {
    pub fn new() -> Self {
        Self {
            answerer: None,
            validator: None,
            policy: None,
        }
    }

    pub fn answerer(mut self, answerer: Arc<dyn Answerer>) -> Self {
        self.answerer = Some(answerer);
        self
    }

    pub fn validator(mut self, validator: Arc<dyn Validator>) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn policy(mut self, policy: PolicyRef) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Build the session. All three collaborators are required and the
    /// policy reference must be complete.
    pub fn build(self) -> Result<Session, SessionError> {
        let answerer = self
            .answerer
            .ok_or_else(|| SessionError::InvalidInput("No answerer set".to_string()))?;
        let validator = self
            .validator
            .ok_or_else(|| SessionError::InvalidInput("No validator set".to_string()))?;
        let policy = self
            .policy
            .ok_or_else(|| SessionError::InvalidInput("No policy set".to_string()))?;
        policy.validate()?;

        Ok(Session::new(answerer, validator, policy))
    }
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}
