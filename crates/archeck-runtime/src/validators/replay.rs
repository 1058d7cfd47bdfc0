//! Validator that replays recorded findings payloads.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value as JsonValue;
use std::collections::VecDeque;
use std::fs;
use std::path::Path;

use archeck_core::PolicyRef;

use crate::collaborators::{CollaboratorError, Validator};

/// One recorded validator call.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCheck {
    pub question: String,
    pub answer: String,
    pub policy_id: String,
}

/// Returns pre-recorded payloads, one per call, in order.
///
/// When `repeat_last` is set the final payload is returned for every call
/// after the queue runs dry; otherwise an exhausted queue is a
/// [`CollaboratorError::NotConfigured`] error.
#[derive(Debug, Default)]
pub struct ReplayValidator {
    payloads: Mutex<VecDeque<JsonValue>>,
    last: Mutex<Option<JsonValue>>,
    repeat_last: bool,
    calls: Mutex<Vec<RecordedCheck>>,
}

impl ReplayValidator {
    pub fn new(payloads: Vec<JsonValue>) -> Self {
        Self {
            payloads: Mutex::new(payloads.into()),
            ..Default::default()
        }
    }

    /// Keep answering with the last payload once the queue is empty.
    pub fn repeat_last(mut self) -> Self {
        self.repeat_last = true;
        self
    }

    /// Load payloads from a JSON file holding either a single payload
    /// object or an array of payloads.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CollaboratorError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| {
            CollaboratorError::NotConfigured(format!("cannot read {}: {}", path.display(), e))
        })?;
        let value: JsonValue = serde_json::from_str(&contents)
            .map_err(|e| CollaboratorError::Decode(format!("{}: {}", path.display(), e)))?;

        let payloads = match value {
            JsonValue::Array(items) => items,
            single => vec![single],
        };
        Ok(Self::new(payloads))
    }

    /// Every check made so far, oldest first.
    pub fn calls(&self) -> Vec<RecordedCheck> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl Validator for ReplayValidator {
    async fn check(
        &self,
        question: &str,
        answer: &str,
        policy: &PolicyRef,
    ) -> Result<JsonValue, CollaboratorError> {
        self.calls.lock().push(RecordedCheck {
            question: question.to_string(),
            answer: answer.to_string(),
            policy_id: policy.policy_id.clone(),
        });

        let next = self.payloads.lock().pop_front();
        match next {
            Some(payload) => {
                *self.last.lock() = Some(payload.clone());
                Ok(payload)
            }
            None if self.repeat_last => self.last.lock().clone().ok_or_else(|| {
                CollaboratorError::NotConfigured("replay validator has no payloads".to_string())
            }),
            None => Err(CollaboratorError::NotConfigured(
                "replay validator has no payloads left".to_string(),
            )),
        }
    }

    fn name(&self) -> &str {
        "replay"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    fn policy() -> PolicyRef {
        PolicyRef::new("loap-policy", "1")
    }

    #[tokio::test]
    async fn test_payloads_are_returned_in_order() {
        let validator = ReplayValidator::new(vec![json!({ "n": 1 }), json!({ "n": 2 })]);

        assert_eq!(validator.check("q", "a", &policy()).await.unwrap()["n"], 1);
        assert_eq!(validator.check("q", "b", &policy()).await.unwrap()["n"], 2);
        assert!(matches!(
            validator.check("q", "c", &policy()).await,
            Err(CollaboratorError::NotConfigured(_))
        ));

        let answers: Vec<_> = validator.calls().into_iter().map(|c| c.answer).collect();
        assert_eq!(answers, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_repeat_last() {
        let validator = ReplayValidator::new(vec![json!({ "n": 1 })]).repeat_last();

        validator.check("q", "a", &policy()).await.unwrap();
        assert_eq!(validator.check("q", "a", &policy()).await.unwrap()["n"], 1);
        assert_eq!(validator.call_count(), 2);
    }

    #[tokio::test]
    async fn test_from_file_accepts_single_payload() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "findings": [ {{ "result": "VALID" }} ] }}"#).unwrap();

        let validator = ReplayValidator::from_file(file.path()).unwrap();
        let payload = validator.check("q", "a", &policy()).await.unwrap();
        assert_eq!(payload["findings"][0]["result"], "VALID");
    }

    #[test]
    fn test_from_file_missing() {
        let result = ReplayValidator::from_file("/nonexistent/archeck/findings.json");
        assert!(matches!(result, Err(CollaboratorError::NotConfigured(_))));
    }
}
