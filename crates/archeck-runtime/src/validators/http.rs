//! Validator backed by a remote policy-checking endpoint.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::time::Duration;

use archeck_core::PolicyRef;

use crate::collaborators::{CollaboratorError, Validator};
use crate::providers::ApiCredential;

/// Environment variable holding the validator bearer token.
pub const VALIDATOR_TOKEN_ENV: &str = "ARCHECK_VALIDATOR_TOKEN";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Posts `{question, answer, policyId, policyVersion, guardrailId,
/// guardrailVersion}` to the endpoint and returns the JSON response body
/// unparsed.
pub struct HttpValidator {
    endpoint: String,
    timeout: Duration,
    token: Option<ApiCredential>,
    client: reqwest::Client,
}

impl std::fmt::Debug for HttpValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpValidator")
            .field("endpoint", &self.endpoint)
            .field("timeout", &self.timeout)
            .field("token", &self.token)
            .finish()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CheckRequest<'a> {
    question: &'a str,
    answer: &'a str,
    policy_id: &'a str,
    policy_version: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    guardrail_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    guardrail_version: Option<&'a str>,
}

impl HttpValidator {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, CollaboratorError> {
        let endpoint = endpoint.into();
        if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
            return Err(CollaboratorError::NotConfigured(format!(
                "validator endpoint must start with http:// or https://, got '{}'",
                endpoint
            )));
        }

        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| CollaboratorError::Transport(e.to_string()))?;

        Ok(Self {
            endpoint,
            timeout: DEFAULT_TIMEOUT,
            token: None,
            client,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_token(mut self, token: ApiCredential) -> Self {
        self.token = Some(token);
        self
    }

    /// Pick up a bearer token from `config["token"]` or
    /// `ARCHECK_VALIDATOR_TOKEN`, if either is set.
    pub fn with_token_from(mut self, config: &JsonValue) -> Self {
        self.token = ApiCredential::optional_from_config_or_env(
            config,
            "token",
            VALIDATOR_TOKEN_ENV,
            "validator token",
        );
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// First line of a response body, cut to a loggable length.
fn preview(body: &str) -> String {
    let line = body.lines().next().unwrap_or_default().trim();
    match line.char_indices().nth(80) {
        Some((end, _)) => format!("{}...", &line[..end]),
        None => line.to_string(),
    }
}

#[async_trait]
impl Validator for HttpValidator {
    async fn check(
        &self,
        question: &str,
        answer: &str,
        policy: &PolicyRef,
    ) -> Result<JsonValue, CollaboratorError> {
        let body = CheckRequest {
            question,
            answer,
            policy_id: &policy.policy_id,
            policy_version: &policy.policy_version,
            guardrail_id: policy.guardrail_id.as_deref(),
            guardrail_version: policy.guardrail_version.as_deref(),
        };

        let mut request = self
            .client
            .post(&self.endpoint)
            .timeout(self.timeout)
            .json(&body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token.expose());
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                CollaboratorError::Timeout(self.timeout)
            } else {
                CollaboratorError::Transport(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|e| format!("unreadable error body: {}", e));
            return Err(CollaboratorError::Service {
                status: status.as_u16(),
                message,
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| CollaboratorError::Transport(e.to_string()))?;

        serde_json::from_str(&body).map_err(|e| {
            CollaboratorError::MalformedPayload(format!(
                "validator returned a non-JSON body ({}): {}",
                e,
                preview(&body)
            ))
        })
    }

    fn name(&self) -> &str {
        "http"
    }
}
