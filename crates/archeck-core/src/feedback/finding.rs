//! Rule-level findings and their classification.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::FeedbackError;

/// Outcome category of one finding, as reported by the validation service.
///
/// The distinction between "provably false" and "could not decide" is
/// preserved exactly; only [`FindingKind::ConfirmedInvalid`] marks an answer
/// as invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FindingKind {
    /// The answer is provably consistent with the rule
    ConfirmedValid,

    /// The answer provably contradicts the rule
    ConfirmedInvalid,

    /// Consistent under some assumptions; comes with suggested assignments
    ValidWithSuggestion,

    /// The answer could not be translated into policy variables
    NoTranslation,

    /// The answer translated into more than one conflicting reading
    TranslationAmbiguous,

    /// The check exceeded the validator's processing limits
    TooComplex,
}

impl FindingKind {
    /// Wire names used by the validation service.
    pub const WIRE_NAMES: [&'static str; 6] = [
        "VALID",
        "INVALID",
        "SATISFIABLE",
        "NO_TRANSLATIONS",
        "TRANSLATION_AMBIGUOUS",
        "TOO_COMPLEX",
    ];

    /// Whether this kind means the validator could not reach a conclusion.
    pub fn is_inconclusive(self) -> bool {
        matches!(
            self,
            FindingKind::NoTranslation | FindingKind::TranslationAmbiguous | FindingKind::TooComplex
        )
    }

    /// Whether this kind positively confirms compliance without conditions.
    pub fn is_confirmed_valid(self) -> bool {
        self == FindingKind::ConfirmedValid
    }

    /// Whether this kind is consistent with the rule, with or without
    /// suggested assignments.
    pub fn is_valid(self) -> bool {
        matches!(self, FindingKind::ConfirmedValid | FindingKind::ValidWithSuggestion)
    }

    /// Whether suggested assignments on this kind are surfaced as suggestions.
    pub fn carries_suggestions(self) -> bool {
        matches!(self, FindingKind::ValidWithSuggestion | FindingKind::ConfirmedInvalid)
    }

    pub fn wire_name(self) -> &'static str {
        match self {
            FindingKind::ConfirmedValid => "VALID",
            FindingKind::ConfirmedInvalid => "INVALID",
            FindingKind::ValidWithSuggestion => "SATISFIABLE",
            FindingKind::NoTranslation => "NO_TRANSLATIONS",
            FindingKind::TranslationAmbiguous => "TRANSLATION_AMBIGUOUS",
            FindingKind::TooComplex => "TOO_COMPLEX",
        }
    }
}

impl FromStr for FindingKind {
    type Err = FeedbackError;

    /// Parse a wire name. Matching is case-insensitive and accepts `-` in
    /// place of `_`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace('-', "_");
        match normalized.as_str() {
            "VALID" => Ok(FindingKind::ConfirmedValid),
            "INVALID" => Ok(FindingKind::ConfirmedInvalid),
            "SATISFIABLE" => Ok(FindingKind::ValidWithSuggestion),
            "NO_TRANSLATIONS" | "NO_TRANSLATION" => Ok(FindingKind::NoTranslation),
            "TRANSLATION_AMBIGUOUS" => Ok(FindingKind::TranslationAmbiguous),
            "TOO_COMPLEX" => Ok(FindingKind::TooComplex),
            _ => Err(FeedbackError::UnknownKind(s.to_string())),
        }
    }
}

impl fmt::Display for FindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FindingKind::ConfirmedValid => "confirmed-valid",
            FindingKind::ConfirmedInvalid => "confirmed-invalid",
            FindingKind::ValidWithSuggestion => "valid-with-suggestion",
            FindingKind::NoTranslation => "no-translation",
            FindingKind::TranslationAmbiguous => "translation-ambiguous",
            FindingKind::TooComplex => "too-complex",
        };
        f.write_str(name)
    }
}

/// One rule-level outcome from a validation check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    /// Rule in the policy this finding refers to. Empty when the validator
    /// did not tie the finding to a rule.
    pub rule_identifier: String,

    pub kind: FindingKind,

    /// Human-readable rationale
    pub explanation: String,

    /// Proposed policy variable values (variable -> value)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_assignment: Option<BTreeMap<String, String>>,
}

impl Finding {
    pub fn new(
        rule_identifier: impl Into<String>,
        kind: FindingKind,
        explanation: impl Into<String>,
    ) -> Self {
        Self {
            rule_identifier: rule_identifier.into(),
            kind,
            explanation: explanation.into(),
            suggested_assignment: None,
        }
    }

    /// Attach a suggested value for one policy variable.
    pub fn with_suggestion(mut self, variable: impl Into<String>, value: impl Into<String>) -> Self {
        self.suggested_assignment
            .get_or_insert_with(BTreeMap::new)
            .insert(variable.into(), value.into());
        self
    }

    /// Render each suggested assignment as a sentence naming the variable,
    /// its proposed value and the rule, followed by the finding's
    /// explanation when there is one.
    pub fn suggestion_texts(&self) -> Vec<String> {
        let Some(assignment) = &self.suggested_assignment else {
            return Vec::new();
        };

        assignment
            .iter()
            .map(|(variable, value)| {
                let mut text = format!("set `{}` to `{}`", variable, value);
                if !self.rule_identifier.is_empty() {
                    text.push_str(&format!(" (rule {})", self.rule_identifier));
                }
                let explanation = self.explanation.trim();
                if !explanation.is_empty() {
                    text.push_str(": ");
                    text.push_str(explanation);
                }
                text
            })
            .collect()
    }
}
