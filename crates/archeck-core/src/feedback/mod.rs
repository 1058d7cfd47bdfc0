//! Feedback model: parsing and classifying validation findings.
//!
//! A [`Feedback`] is a read-only view over exactly one validation call.
//! Classification is a pure function of the raw payload: parsing the same
//! payload twice always yields the same verdict, rules and suggestions.

mod finding;
mod schema;

pub use finding::{Finding, FindingKind};
pub use schema::validate_findings_schema;

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::interaction::InteractionId;

/// Errors raised when a findings payload cannot be interpreted.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FeedbackError {
    #[error("Findings payload failed schema validation: {}", .0.join("; "))]
    Schema(Vec<String>),

    #[error("Unknown finding kind: {0}")]
    UnknownKind(String),

    #[error("Failed to decode findings payload: {0}")]
    Decode(String),
}

/// Aggregate outcome of one validation call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    /// At least one rule was provably violated
    Invalid,

    /// Every finding confirms compliance
    Valid,

    /// No violation, but the validator could not confirm compliance either
    Inconclusive,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Invalid => write!(f, "INVALID"),
            Verdict::Valid => write!(f, "VALID"),
            Verdict::Inconclusive => write!(f, "INCONCLUSIVE"),
        }
    }
}

/// Wire shape of a single finding.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawFinding {
    result: String,
    #[serde(default)]
    rule_identifier: Option<String>,
    #[serde(default)]
    explanation: Option<String>,
    #[serde(default)]
    suggested_assignment: Option<BTreeMap<String, JsonValue>>,
}

#[derive(Debug, Deserialize)]
struct RawPayload {
    findings: Vec<RawFinding>,
}

/// Findings for one interaction from one validation call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Feedback {
    interaction_id: InteractionId,
    validated_answer: String,
    findings: Vec<Finding>,
    raw_payload: JsonValue,
    validated_at: DateTime<Utc>,
}

impl Feedback {
    /// Parse a raw validator payload into feedback for `interaction_id`.
    ///
    /// The payload is schema-checked first; any finding whose kind is not
    /// recognised rejects the whole payload.
    pub fn parse(
        interaction_id: InteractionId,
        validated_answer: impl Into<String>,
        payload: JsonValue,
    ) -> Result<Self, FeedbackError> {
        let findings = parse_findings(&payload)?;

        tracing::debug!(
            interaction = %interaction_id,
            findings = findings.len(),
            "Parsed validation findings"
        );

        Ok(Self {
            interaction_id,
            validated_answer: validated_answer.into(),
            findings,
            raw_payload: payload,
            validated_at: Utc::now(),
        })
    }

    pub fn interaction_id(&self) -> InteractionId {
        self.interaction_id
    }

    /// The exact answer text that was checked.
    pub fn validated_answer(&self) -> &str {
        &self.validated_answer
    }

    pub fn validated_at(&self) -> DateTime<Utc> {
        self.validated_at
    }

    /// Findings in the order the validator returned them.
    pub fn findings(&self) -> &[Finding] {
        &self.findings
    }

    /// True iff at least one finding is confirmed-invalid.
    pub fn is_invalid(&self) -> bool {
        self.findings
            .iter()
            .any(|f| f.kind == FindingKind::ConfirmedInvalid)
    }

    /// True when there is no violation but some finding is inconclusive,
    /// or when the validator returned no findings at all.
    pub fn is_inconclusive(&self) -> bool {
        self.verdict() == Verdict::Inconclusive
    }

    /// Whether any finding is of kind confirmed-valid.
    pub fn has_confirmed_valid(&self) -> bool {
        self.findings.iter().any(|f| f.kind.is_confirmed_valid())
    }

    /// Whether any finding is valid only under suggested assignments.
    pub fn has_valid_with_suggestion(&self) -> bool {
        self.findings
            .iter()
            .any(|f| f.kind == FindingKind::ValidWithSuggestion)
    }

    pub fn verdict(&self) -> Verdict {
        if self.is_invalid() {
            Verdict::Invalid
        } else if !self.findings.is_empty() && self.findings.iter().all(|f| f.kind.is_valid()) {
            Verdict::Valid
        } else {
            Verdict::Inconclusive
        }
    }

    /// Confirmed-invalid findings, in service order.
    pub fn invalid_findings(&self) -> impl Iterator<Item = &Finding> {
        self.findings
            .iter()
            .filter(|f| f.kind == FindingKind::ConfirmedInvalid)
    }

    /// Findings the validator could not decide.
    pub fn inconclusive_findings(&self) -> impl Iterator<Item = &Finding> {
        self.findings.iter().filter(|f| f.kind.is_inconclusive())
    }

    /// Rule identifiers of confirmed-invalid findings, in service order.
    ///
    /// The order is passed through untouched; it may carry the service's
    /// relevance ranking.
    pub fn invalid_rules(&self) -> Vec<&str> {
        self.invalid_findings()
            .map(|f| f.rule_identifier.as_str())
            .collect()
    }

    /// Suggested corrections from valid-with-suggestion and
    /// confirmed-invalid findings, in service order.
    pub fn suggestions(&self) -> Vec<String> {
        self.findings
            .iter()
            .filter(|f| f.kind.carries_suggestions())
            .flat_map(Finding::suggestion_texts)
            .collect()
    }

    /// The unprocessed validator payload, for presentation and debugging.
    pub fn raw_findings(&self) -> &JsonValue {
        &self.raw_payload
    }
}

/// Decode and classify a findings payload.
///
/// Pure: the result depends only on `payload`.
pub fn parse_findings(payload: &JsonValue) -> Result<Vec<Finding>, FeedbackError> {
    validate_findings_schema(payload).map_err(FeedbackError::Schema)?;

    let raw: RawPayload = serde_json::from_value(payload.clone())
        .map_err(|e| FeedbackError::Decode(e.to_string()))?;

    raw.findings.into_iter().map(convert_finding).collect()
}

fn convert_finding(raw: RawFinding) -> Result<Finding, FeedbackError> {
    let kind: FindingKind = raw.result.parse()?;

    let suggested_assignment = match raw.suggested_assignment {
        Some(assignment) => Some(
            assignment
                .into_iter()
                .map(|(variable, value)| Ok((variable, scalar_to_string(value)?)))
                .collect::<Result<BTreeMap<_, _>, FeedbackError>>()?,
        ),
        None => None,
    };

    let rule_identifier = raw.rule_identifier.unwrap_or_default();
    if kind == FindingKind::ConfirmedInvalid && rule_identifier.trim().is_empty() {
        return Err(FeedbackError::Decode(
            "confirmed-invalid finding has no ruleIdentifier".to_string(),
        ));
    }

    Ok(Finding {
        rule_identifier,
        kind,
        explanation: raw.explanation.unwrap_or_default(),
        suggested_assignment,
    })
}

fn scalar_to_string(value: JsonValue) -> Result<String, FeedbackError> {
    match value {
        JsonValue::String(s) => Ok(s),
        JsonValue::Bool(b) => Ok(b.to_string()),
        JsonValue::Number(n) => Ok(n.to_string()),
        other => Err(FeedbackError::Decode(format!(
            "suggested assignment values must be scalars, got {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn feedback(payload: JsonValue) -> Feedback {
        Feedback::parse(InteractionId::new(), "answer", payload).unwrap()
    }

    #[test]
    fn test_invalid_finding_marks_feedback_invalid() {
        let fb = feedback(json!({
            "findings": [
                { "result": "VALID", "ruleIdentifier": "R0" },
                {
                    "result": "INVALID",
                    "ruleIdentifier": "R1",
                    "explanation": "Eligibility requires full-time employment status.",
                    "suggestedAssignment": { "isFullTime": true }
                }
            ]
        }));

        assert!(fb.is_invalid());
        assert_eq!(fb.verdict(), Verdict::Invalid);
        assert_eq!(fb.invalid_rules(), vec!["R1"]);
        assert_eq!(fb.suggestions().len(), 1);
        assert!(fb.suggestions()[0].contains("isFullTime"));
        assert!(fb.suggestions()[0].contains("true"));
    }

    #[test]
    fn test_invalid_rules_keep_service_order() {
        let fb = feedback(json!({
            "findings": [
                { "result": "INVALID", "ruleIdentifier": "R9" },
                { "result": "VALID", "ruleIdentifier": "R5" },
                { "result": "INVALID", "ruleIdentifier": "R2" },
                { "result": "INVALID", "ruleIdentifier": "R7" }
            ]
        }));
        assert_eq!(fb.invalid_rules(), vec!["R9", "R2", "R7"]);
    }

    #[test]
    fn test_inconclusive_is_neither_pass_nor_fail() {
        let fb = feedback(json!({
            "findings": [
                { "result": "TOO_COMPLEX" },
                { "result": "NO_TRANSLATIONS" }
            ]
        }));

        assert!(!fb.is_invalid());
        assert!(!fb.has_confirmed_valid());
        assert!(fb.is_inconclusive());
        assert_eq!(fb.inconclusive_findings().count(), 2);
    }

    #[test]
    fn test_empty_findings_are_inconclusive() {
        let fb = feedback(json!({ "findings": [] }));
        assert_eq!(fb.verdict(), Verdict::Inconclusive);
    }

    #[test]
    fn test_valid_with_suggestion_surfaces_suggestions() {
        let fb = feedback(json!({
            "findings": [
                {
                    "result": "SATISFIABLE",
                    "ruleIdentifier": "R3",
                    "suggestedAssignment": { "tenureMonths": 12 }
                }
            ]
        }));

        assert_eq!(fb.verdict(), Verdict::Valid);
        assert!(!fb.has_confirmed_valid());
        assert!(fb.has_valid_with_suggestion());
        assert_eq!(fb.suggestions(), vec!["set `tenureMonths` to `12` (rule R3)".to_string()]);
    }

    #[test]
    fn test_assignments_on_inconclusive_findings_are_ignored() {
        let fb = feedback(json!({
            "findings": [
                { "result": "TRANSLATION_AMBIGUOUS", "suggestedAssignment": { "x": "1" } }
            ]
        }));
        assert!(fb.suggestions().is_empty());
    }

    #[test]
    fn test_unknown_kind_is_malformed() {
        let result = Feedback::parse(
            InteractionId::new(),
            "answer",
            json!({ "findings": [ { "result": "IMPOSSIBLE" } ] }),
        );
        assert!(matches!(result, Err(FeedbackError::UnknownKind(_))));
    }

    #[test]
    fn test_invalid_finding_without_rule_is_malformed() {
        for payload in [
            json!({ "findings": [ { "result": "INVALID", "explanation": "contradiction" } ] }),
            json!({ "findings": [ { "result": "INVALID", "ruleIdentifier": " " } ] }),
        ] {
            let result = Feedback::parse(InteractionId::new(), "answer", payload);
            assert!(matches!(result, Err(FeedbackError::Decode(_))));
        }

        // Kinds that carry no rule may omit it.
        let fb = feedback(json!({ "findings": [ { "result": "NO_TRANSLATIONS" } ] }));
        assert!(fb.invalid_rules().is_empty());
    }

    #[test]
    fn test_schema_violation_is_malformed() {
        let result = Feedback::parse(InteractionId::new(), "answer", json!({ "nope": true }));
        assert!(matches!(result, Err(FeedbackError::Schema(_))));
    }

    #[test]
    fn test_raw_payload_is_retained() {
        let payload = json!({
            "findings": [ { "result": "VALID", "ruleIdentifier": "R1" } ],
            "usage": { "policyUnits": 1 }
        });
        let fb = feedback(payload.clone());
        assert_eq!(fb.raw_findings(), &payload);
    }

    fn arb_finding() -> impl Strategy<Value = JsonValue> {
        (
            prop::sample::select(FindingKind::WIRE_NAMES.to_vec()),
            "[A-Z][0-9]{1,2}",
            prop::option::of(("[a-z]{1,8}", "[a-z0-9]{1,8}")),
        )
            .prop_map(|(result, rule, assignment)| {
                let mut finding = json!({
                    "result": result,
                    "ruleIdentifier": rule,
                    "explanation": "because",
                });
                if let Some((variable, value)) = assignment {
                    let mut map = serde_json::Map::new();
                    map.insert(variable, JsonValue::String(value));
                    finding["suggestedAssignment"] = JsonValue::Object(map);
                }
                finding
            })
    }

    proptest! {
        #[test]
        fn prop_classification_is_pure(findings in prop::collection::vec(arb_finding(), 0..8)) {
            let payload = json!({ "findings": findings });
            let first = feedback(payload.clone());
            let second = feedback(payload);

            prop_assert_eq!(first.is_invalid(), second.is_invalid());
            prop_assert_eq!(first.verdict(), second.verdict());
            prop_assert_eq!(first.invalid_rules(), second.invalid_rules());
            prop_assert_eq!(first.suggestions(), second.suggestions());
        }

        #[test]
        fn prop_invalid_iff_any_invalid_finding(findings in prop::collection::vec(arb_finding(), 0..8)) {
            let expected = findings.iter().any(|f| f["result"] == "INVALID");
            let fb = feedback(json!({ "findings": findings }));
            prop_assert_eq!(fb.is_invalid(), expected);
        }
    }
}
