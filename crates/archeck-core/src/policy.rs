//! Policy and guardrail routing identifiers.
//!
//! These are opaque values supplied by whoever provisioned the guardrail;
//! archeck only forwards them to the validation service.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PolicyError {
    #[error("Missing required policy field: {0}")]
    MissingField(&'static str),
}

/// Identifies the policy (and guardrail) an answer is validated against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRef {
    pub policy_id: String,

    /// Policy version (e.g. "1" or "DRAFT")
    pub policy_version: String,

    #[serde(default)]
    pub guardrail_id: Option<String>,

    #[serde(default)]
    pub guardrail_version: Option<String>,
}

impl PolicyRef {
    pub fn new(policy_id: impl Into<String>, policy_version: impl Into<String>) -> Self {
        Self {
            policy_id: policy_id.into(),
            policy_version: policy_version.into(),
            guardrail_id: None,
            guardrail_version: None,
        }
    }

    /// Route calls through a specific guardrail.
    pub fn with_guardrail(
        mut self,
        guardrail_id: impl Into<String>,
        guardrail_version: impl Into<String>,
    ) -> Self {
        self.guardrail_id = Some(guardrail_id.into());
        self.guardrail_version = Some(guardrail_version.into());
        self
    }

    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.policy_id.trim().is_empty() {
            return Err(PolicyError::MissingField("policy_id"));
        }
        if self.policy_version.trim().is_empty() {
            return Err(PolicyError::MissingField("policy_version"));
        }
        if matches!(&self.guardrail_id, Some(id) if id.trim().is_empty()) {
            return Err(PolicyError::MissingField("guardrail_id"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_policy_validation() {
        assert!(PolicyRef::new("loap-policy", "1").validate().is_ok());
        assert_eq!(
            PolicyRef::new("", "1").validate(),
            Err(PolicyError::MissingField("policy_id"))
        );
        assert_eq!(
            PolicyRef::new("loap-policy", " ").validate(),
            Err(PolicyError::MissingField("policy_version"))
        );
    }

    #[test]
    fn test_guardrail_is_optional() {
        let policy = PolicyRef::new("loap-policy", "1").with_guardrail("gr-123", "DRAFT");
        assert_eq!(policy.guardrail_id.as_deref(), Some("gr-123"));
        assert!(policy.validate().is_ok());
    }
}
