//! # archeck-runtime
//!
//! Runs checked conversations: answers come from an answering service,
//! are validated against a formal policy by a validation service, and
//! invalid answers are rewritten from the validator's findings.
//!
//! The pure model (interactions, feedback classification, correction
//! prompts) lives in `archeck-core`. This crate adds the orchestration and
//! the collaborators that make network calls.
//!
//! ## Example
//!
//! ```rust,ignore
//! use archeck_runtime::{ProviderRegistry, RuntimeConfig};
//!
//! let config = RuntimeConfig::from_yaml_file("archeck.yaml")?;
//! let mut session = config.build_session(&ProviderRegistry::with_defaults())?;
//!
//! let interaction = session.ask_question("Are part-time employees eligible for LoAP?").await?;
//! let feedback = session.validate_interaction(&interaction).await?;
//!
//! if feedback.is_invalid() {
//!     let corrected = session.rewrite_answer(&interaction, &feedback).await?;
//!     println!("{}", corrected.current_answer());
//! }
//! ```
//!
//! ## Features
//!
//! - `anthropic`: [`AnthropicProvider`] for the answering service
//! - `http`: [`HttpValidator`] for a remote validation endpoint
//! - `all-collaborators`: both of the above

pub mod answerer;
pub mod collaborators;
pub mod config;
pub mod prompts;
pub mod providers;
pub mod refinement;
pub mod session;
pub mod usage;
pub mod validators;

pub use answerer::{normalize_completion, LlmAnswerer};
pub use collaborators::{Answerer, CollaboratorError, Validator};
pub use config::{AnswererConfig, ConfigError, RuntimeConfig, ValidatorConfig};
pub use providers::{
    ApiCredential, ChatMessage, CompletionConfig, CompletionResponse, CredentialSource,
    LlmProvider, ProviderError, ProviderFactory, ProviderRegistry, Role, TokenUsage,
};
pub use refinement::{RefinementOutcome, RefinementPolicy, RefinementRound, RefinementStatus};
pub use session::{Session, SessionBuilder, SessionError};
pub use usage::{LlmUsage, UsageTracker};
pub use validators::ReplayValidator;

#[cfg(feature = "anthropic")]
pub use providers::{AnthropicProvider, AnthropicProviderFactory};

#[cfg(feature = "http")]
pub use validators::HttpValidator;
