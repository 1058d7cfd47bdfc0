//! YAML runtime configuration.
//!
//! ```yaml
//! policy:
//!   policy_id: loap-policy
//!   policy_version: "1"
//!   guardrail_id: gr-7f3k
//!   guardrail_version: DRAFT
//!
//! answerer:
//!   provider: anthropic
//!   model: claude-sonnet-4-5-20250514
//!   max_tokens: 1024
//!   timeout: 30s
//!
//! validator:
//!   kind: http
//!   endpoint: https://validator.internal/check
//!   timeout: 10s
//!
//! refinement:
//!   max_rounds: 2
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use archeck_core::PolicyRef;

use crate::answerer::LlmAnswerer;
use crate::collaborators::{Answerer, CollaboratorError, Validator};
use crate::providers::{CompletionConfig, ProviderError, ProviderRegistry};
use crate::refinement::RefinementPolicy;
use crate::session::{Session, SessionBuilder, SessionError};
use crate::validators::ReplayValidator;

/// Errors from loading or applying a configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),

    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Top-level configuration for a checked session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub policy: PolicyRef,

    #[serde(default)]
    pub answerer: AnswererConfig,

    pub validator: ValidatorConfig,

    #[serde(default)]
    pub refinement: RefinementPolicy,
}

/// Answering service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswererConfig {
    /// Provider type registered in the [`ProviderRegistry`]
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Provider-specific settings (`api_key`, `base_url`, ...)
    #[serde(default)]
    pub provider_config: JsonValue,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default)]
    pub temperature: f32,

    #[serde(default = "default_timeout", with = "humantime_duration")]
    pub timeout: Duration,

    /// Extra text appended to the answering system prompt
    #[serde(default)]
    pub policy_context: Option<String>,
}

impl Default for AnswererConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            provider_config: JsonValue::Null,
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: 0.0,
            timeout: default_timeout(),
            policy_context: None,
        }
    }
}

/// Validation service settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidatorConfig {
    /// Remote validation endpoint
    Http {
        endpoint: String,

        #[serde(default = "default_timeout", with = "humantime_duration")]
        timeout: Duration,

        /// Bearer token; falls back to `ARCHECK_VALIDATOR_TOKEN`
        #[serde(default, skip_serializing)]
        token: Option<String>,
    },

    /// Recorded findings payloads, replayed in order
    Replay { path: PathBuf },
}

fn default_provider() -> String {
    "anthropic".to_string()
}

fn default_model() -> String {
    CompletionConfig::default().model
}

fn default_max_tokens() -> u32 {
    CompletionConfig::default().max_tokens
}

fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

mod humantime_duration {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        humantime::parse_duration(&text).map_err(serde::de::Error::custom)
    }
}

impl RuntimeConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: RuntimeConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a file. A relative replay path is resolved against the
    /// directory holding the config file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let mut config = Self::from_yaml(&content)?;

        if let ValidatorConfig::Replay { path: replay } = &mut config.validator {
            if replay.is_relative() {
                if let Some(dir) = path.parent() {
                    *replay = dir.join(&*replay);
                }
            }
        }
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.policy
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        if self.refinement.max_rounds == 0 {
            return Err(ConfigError::Invalid(
                "refinement.max_rounds must be at least 1".to_string(),
            ));
        }

        let answerer = &self.answerer;
        if answerer.provider.trim().is_empty() {
            return Err(ConfigError::Invalid("answerer.provider is empty".to_string()));
        }
        if answerer.max_tokens == 0 {
            return Err(ConfigError::Invalid(
                "answerer.max_tokens must be positive".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&answerer.temperature) {
            return Err(ConfigError::Invalid(format!(
                "answerer.temperature must be between 0 and 1, got {}",
                answerer.temperature
            )));
        }

        match &self.validator {
            ValidatorConfig::Http { endpoint, timeout, .. } => {
                if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                    return Err(ConfigError::Invalid(format!(
                        "validator.endpoint must start with http:// or https://, got '{}'",
                        endpoint
                    )));
                }
                if timeout.is_zero() {
                    return Err(ConfigError::Invalid(
                        "validator.timeout must be positive".to_string(),
                    ));
                }
            }
            ValidatorConfig::Replay { path } => {
                if path.as_os_str().is_empty() {
                    return Err(ConfigError::Invalid("validator.path is empty".to_string()));
                }
            }
        }

        Ok(())
    }

    /// Build a session from this configuration.
    pub fn build_session(&self, registry: &ProviderRegistry) -> Result<Session, ConfigError> {
        let session = SessionBuilder::new()
            .answerer(self.answerer.build(registry)?)
            .validator(self.validator.build()?)
            .policy(self.policy.clone())
            .build()?;

        tracing::info!(
            conversation = %session.id(),
            policy = %self.policy.policy_id,
            provider = %self.answerer.provider,
            "Session created from config"
        );
        Ok(session)
    }
}

impl AnswererConfig {
    pub fn completion_config(&self) -> CompletionConfig {
        CompletionConfig {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            timeout: self.timeout,
        }
    }

    pub fn build(&self, registry: &ProviderRegistry) -> Result<Arc<dyn Answerer>, ConfigError> {
        registry.validate(&self.provider, &self.provider_config)?;
        let provider = registry.create(&self.provider, &self.provider_config)?;

        let mut answerer = LlmAnswerer::new(provider, self.completion_config());
        if let Some(context) = &self.policy_context {
            answerer = answerer.with_policy_context(context);
        }
        Ok(Arc::new(answerer))
    }
}

impl ValidatorConfig {
    pub fn build(&self) -> Result<Arc<dyn Validator>, ConfigError> {
        match self {
            ValidatorConfig::Replay { path } => Ok(Arc::new(ReplayValidator::from_file(path)?)),

            #[cfg(feature = "http")]
            ValidatorConfig::Http {
                endpoint,
                timeout,
                token,
            } => {
                let token_config = match token {
                    Some(token) => serde_json::json!({ "token": token }),
                    None => JsonValue::Null,
                };
                let validator = crate::validators::HttpValidator::new(endpoint.as_str())?
                    .with_timeout(*timeout)
                    .with_token_from(&token_config);
                Ok(Arc::new(validator))
            }

            #[cfg(not(feature = "http"))]
            ValidatorConfig::Http { .. } => Err(ConfigError::Invalid(
                "http validator requires the 'http' feature".to_string(),
            )),
        }
    }
}
