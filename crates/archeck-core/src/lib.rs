//! # archeck-core
//!
//! Deterministic model for policy-checked question answering.
//!
//! This crate holds everything about a checked conversation that does not
//! involve I/O:
//! - [`Interaction`] and [`History`]: append-only question/answer records
//!   with a write-once rewritten answer
//! - [`Feedback`]: parsed, classified findings from one validation call
//! - [`CorrectionRequest`]: the corrective instruction built from an
//!   invalid interaction and its feedback
//!
//! ## Key Guarantees
//!
//! 1. **Audit trail**: an interaction's original answer never changes
//! 2. **Pure classification**: the same findings payload always yields the
//!    same verdict, invalid rules and suggestions
//! 3. **No silent fallbacks**: unknown finding kinds are errors, and
//!    inconclusive findings are never reported as pass or fail
//!
//! ## Example
//!
//! ```rust,ignore
//! use archeck_core::{ConversationId, Feedback, Interaction, Verdict};
//!
//! let interaction = Interaction::new(
//!     ConversationId::new(),
//!     "Am I eligible for LoAP as a contractor?",
//!     "Yes, contractors are eligible.",
//! )?;
//! let feedback = Feedback::parse(interaction.id(), interaction.answer(), payload)?;
//!
//! match feedback.verdict() {
//!     Verdict::Valid => println!("compliant"),
//!     Verdict::Invalid => println!("violates {:?}", feedback.invalid_rules()),
//!     Verdict::Inconclusive => println!("validator could not decide"),
//! }
//! ```

pub mod correction;
pub mod feedback;
pub mod interaction;
pub mod policy;

// Re-export main types at crate root
pub use correction::{CorrectionError, CorrectionRequest, Violation, CORRECTION_PREAMBLE};
pub use feedback::{
    parse_findings, validate_findings_schema, Feedback, FeedbackError, Finding, FindingKind,
    Verdict,
};
pub use interaction::{ConversationId, History, Interaction, InteractionError, InteractionId};
pub use policy::{PolicyError, PolicyRef};
