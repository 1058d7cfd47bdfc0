//! Interaction records and the conversation history that owns them.
//!
//! An [`Interaction`] pairs a question with the answer it received. The
//! original answer is fixed at construction; a correction is recorded in a
//! separate, write-once field so the audit trail is never overwritten.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Errors raised when constructing or updating an interaction.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InteractionError {
    #[error("Question must not be empty")]
    EmptyQuestion,

    #[error("Answer must not be empty")]
    EmptyAnswer,

    #[error("Interaction {0} already carries a rewritten answer")]
    AlreadyRewritten(InteractionId),
}

/// Unique identifier of an interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InteractionId(Uuid);

impl InteractionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for InteractionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for InteractionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Unique identifier of a conversation (one session).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(Uuid);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// One question/answer unit in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    id: InteractionId,
    conversation_id: ConversationId,
    question: String,
    answer: String,
    rewritten_answer: Option<String>,
    /// Earlier interaction whose rewritten answer seeded this one
    revision_of: Option<InteractionId>,
    created_at: DateTime<Utc>,
}

impl Interaction {
    /// Create an interaction owned by `conversation_id`.
    ///
    /// Both question and answer must contain non-whitespace text.
    pub fn new(
        conversation_id: ConversationId,
        question: impl Into<String>,
        answer: impl Into<String>,
    ) -> Result<Self, InteractionError> {
        let question = question.into();
        let answer = answer.into();

        if question.trim().is_empty() {
            return Err(InteractionError::EmptyQuestion);
        }
        if answer.trim().is_empty() {
            return Err(InteractionError::EmptyAnswer);
        }

        Ok(Self {
            id: InteractionId::new(),
            conversation_id,
            question,
            answer,
            rewritten_answer: None,
            revision_of: None,
            created_at: Utc::now(),
        })
    }

    /// Mark this interaction as a follow-up revision of `previous`.
    pub fn revising(mut self, previous: InteractionId) -> Self {
        self.revision_of = Some(previous);
        self
    }

    pub fn id(&self) -> InteractionId {
        self.id
    }

    pub fn conversation_id(&self) -> ConversationId {
        self.conversation_id
    }

    pub fn question(&self) -> &str {
        &self.question
    }

    /// The answer the interaction was created with.
    pub fn answer(&self) -> &str {
        &self.answer
    }

    pub fn rewritten_answer(&self) -> Option<&str> {
        self.rewritten_answer.as_deref()
    }

    /// The answer that should be shown and validated: the rewrite if one
    /// exists, otherwise the original.
    pub fn current_answer(&self) -> &str {
        self.rewritten_answer.as_deref().unwrap_or(&self.answer)
    }

    pub fn revision_of(&self) -> Option<InteractionId> {
        self.revision_of
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn is_rewritten(&self) -> bool {
        self.rewritten_answer.is_some()
    }

    /// Record the corrected answer. Fails if a rewrite is already present.
    pub(crate) fn set_rewritten_answer(
        &mut self,
        rewritten: impl Into<String>,
    ) -> Result<(), InteractionError> {
        if self.rewritten_answer.is_some() {
            return Err(InteractionError::AlreadyRewritten(self.id));
        }
        let rewritten = rewritten.into();
        if rewritten.trim().is_empty() {
            return Err(InteractionError::EmptyAnswer);
        }
        self.rewritten_answer = Some(rewritten);
        Ok(())
    }
}

/// Append-only, ordered record of a conversation's interactions.
///
/// Insertion order is the context window handed to the answering service.
/// Entries are never removed or reordered; the only in-place update is
/// recording a rewritten answer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct History {
    interactions: Vec<Interaction>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, interaction: Interaction) {
        self.interactions.push(interaction);
    }

    pub fn get(&self, id: InteractionId) -> Option<&Interaction> {
        self.interactions.iter().find(|i| i.id == id)
    }

    /// Record a rewritten answer on the stored interaction `id`.
    ///
    /// Returns `Ok(None)` when no such interaction exists.
    pub fn record_rewrite(
        &mut self,
        id: InteractionId,
        rewritten: impl Into<String>,
    ) -> Result<Option<&Interaction>, InteractionError> {
        match self.interactions.iter_mut().find(|i| i.id == id) {
            Some(interaction) => {
                interaction.set_rewritten_answer(rewritten)?;
                Ok(Some(interaction))
            }
            None => Ok(None),
        }
    }

    /// Interactions recorded before `id`, in order. The whole history when
    /// `id` is not present.
    pub fn before(&self, id: InteractionId) -> &[Interaction] {
        let end = self
            .interactions
            .iter()
            .position(|i| i.id == id)
            .unwrap_or(self.interactions.len());
        &self.interactions[..end]
    }

    pub fn as_slice(&self) -> &[Interaction] {
        &self.interactions
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Interaction> {
        self.interactions.iter()
    }

    pub fn len(&self) -> usize {
        self.interactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interactions.is_empty()
    }

    pub fn last(&self) -> Option<&Interaction> {
        self.interactions.last()
    }
}

impl<'a> IntoIterator for &'a History {
    type Item = &'a Interaction;
    type IntoIter = std::slice::Iter<'a, Interaction>;

    fn into_iter(self) -> Self::IntoIter {
        self.interactions.iter()
    }
}
