//! End-to-end session behaviour with deterministic collaborators.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::Arc;

use archeck_core::{FindingKind, Interaction, PolicyRef, Verdict, CORRECTION_PREAMBLE};
use archeck_runtime::{
    Answerer, CollaboratorError, RefinementPolicy, RefinementStatus, ReplayValidator, Session,
    SessionBuilder, SessionError,
};

/// Answers from a script and records every prompt it was given.
#[derive(Default)]
struct ScriptedAnswerer {
    replies: Mutex<VecDeque<Result<String, CollaboratorError>>>,
    prompts: Mutex<Vec<(String, usize)>>,
}

impl ScriptedAnswerer {
    fn new(replies: Vec<Result<String, CollaboratorError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    fn answering(replies: &[&str]) -> Self {
        Self::new(replies.iter().map(|r| Ok(r.to_string())).collect())
    }

    fn prompts(&self) -> Vec<(String, usize)> {
        self.prompts.lock().clone()
    }
}

#[async_trait]
impl Answerer for ScriptedAnswerer {
    async fn generate(
        &self,
        question: &str,
        context: &[Interaction],
    ) -> Result<String, CollaboratorError> {
        self.prompts.lock().push((question.to_string(), context.len()));
        self.replies
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(CollaboratorError::NotConfigured("script exhausted".into())))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

fn session(answerer: Arc<ScriptedAnswerer>, validator: Arc<ReplayValidator>) -> Session {
    SessionBuilder::new()
        .answerer(answerer)
        .validator(validator)
        .policy(PolicyRef::new("loap-policy", "1").with_guardrail("gr-7f3k", "DRAFT"))
        .build()
        .unwrap()
}

fn eligibility_violation() -> Value {
    json!({
        "findings": [
            {
                "result": "INVALID",
                "ruleIdentifier": "A1B2C3-ELIGIBILITY",
                "explanation": "Eligibility requires full-time employment status.",
                "suggestedAssignment": { "isFullTimeEmployee": true }
            }
        ]
    })
}

fn confirmed_valid() -> Value {
    json!({
        "findings": [
            { "result": "VALID", "ruleIdentifier": "D4E5F6-DURATION" }
        ]
    })
}

#[tokio::test]
async fn contractor_eligibility_claim_is_invalid() {
    let validator = Arc::new(ReplayValidator::new(vec![eligibility_violation()]));
    let mut session = session(Arc::new(ScriptedAnswerer::default()), validator.clone());

    let interaction = session
        .add_qa(
            "I am a temporary contractor working in operations. Am I eligible for LOAP?",
            "Yes, temporary contractors are eligible.",
        )
        .unwrap();
    let feedback = session.validate_interaction(&interaction).await.unwrap();

    assert!(feedback.is_invalid());
    assert_eq!(feedback.verdict(), Verdict::Invalid);
    assert_eq!(feedback.invalid_rules(), vec!["A1B2C3-ELIGIBILITY"]);
    let suggestions = feedback.suggestions();
    assert_eq!(
        suggestions,
        vec![
            "set `isFullTimeEmployee` to `true` (rule A1B2C3-ELIGIBILITY): \
             Eligibility requires full-time employment status."
                .to_string()
        ]
    );
    assert!(suggestions.iter().any(|s| s
        .to_lowercase()
        .contains("eligibility requires full-time employment status.")));

    let calls = validator.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].answer, "Yes, temporary contractors are eligible.");
    assert_eq!(calls[0].policy_id, "loap-policy");
}

#[tokio::test]
async fn part_time_answer_is_rewritten_in_place() {
    let answerer = Arc::new(ScriptedAnswerer::answering(&[
        "No. Part-time employees are not eligible for LoAP; it requires full-time employment.",
    ]));
    let validator = Arc::new(ReplayValidator::new(vec![eligibility_violation()]));
    let mut session = session(answerer.clone(), validator.clone());

    let interaction = session
        .add_qa(
            "I am a part-time employee, am I eligible for LoAP?",
            "Yes, part time employees are allowed to use LoAP",
        )
        .unwrap();
    let feedback = session.validate_interaction(&interaction).await.unwrap();
    assert!(feedback.is_invalid());

    let rewritten = session.rewrite_answer(&interaction, &feedback).await.unwrap();

    assert_eq!(rewritten.id(), interaction.id());
    assert_eq!(rewritten.answer(), "Yes, part time employees are allowed to use LoAP");
    assert!(rewritten
        .rewritten_answer()
        .unwrap()
        .contains("Part-time employees are not eligible"));
    assert_eq!(session.history().len(), 1);
    assert_eq!(
        session.history().get(interaction.id()).unwrap().rewritten_answer(),
        rewritten.rewritten_answer()
    );

    // The correction prompt carries the question, the answer and the violation.
    let prompts = answerer.prompts();
    assert_eq!(prompts.len(), 1);
    let (prompt, context) = &prompts[0];
    assert!(prompt.starts_with(CORRECTION_PREAMBLE.trim()));
    assert!(prompt.contains("I am a part-time employee"));
    assert!(prompt.contains("Yes, part time employees are allowed to use LoAP"));
    assert!(prompt.contains("[A1B2C3-ELIGIBILITY] Eligibility requires full-time employment status."));
    assert!(prompt.contains("`isFullTimeEmployee`"));
    assert_eq!(*context, 0);

    // Rewriting does not validate.
    assert_eq!(validator.call_count(), 1);
}

#[tokio::test]
async fn policy_conformant_answer_is_valid() {
    let validator = Arc::new(ReplayValidator::new(vec![confirmed_valid()]));
    let mut session = session(Arc::new(ScriptedAnswerer::default()), validator);

    let interaction = session
        .add_qa(
            "What is the maximum duration of LoAP?",
            "LoAP can last up to 12 weeks.",
        )
        .unwrap();
    let feedback = session.validate_interaction(&interaction).await.unwrap();

    assert!(!feedback.is_invalid());
    assert!(feedback.suggestions().is_empty());
    assert!(feedback.has_confirmed_valid());
    assert_eq!(feedback.verdict(), Verdict::Valid);
}

#[tokio::test]
async fn too_complex_is_neither_invalid_nor_confirmed() {
    let payload = json!({
        "findings": [
            { "result": "TOO_COMPLEX" },
            { "result": "TOO_COMPLEX", "explanation": "Input exceeds the translation limit." }
        ]
    });
    let validator = Arc::new(ReplayValidator::new(vec![payload]));
    let mut session = session(Arc::new(ScriptedAnswerer::default()), validator);

    let interaction = session.add_qa("Q?", "A long and winding answer.").unwrap();
    let feedback = session.validate_interaction(&interaction).await.unwrap();

    assert!(!feedback.is_invalid());
    assert!(!feedback.has_confirmed_valid());
    assert!(feedback.is_inconclusive());
    assert_eq!(feedback.verdict(), Verdict::Inconclusive);
    assert!(feedback
        .findings()
        .iter()
        .all(|f| f.kind == FindingKind::TooComplex));

    let rewrite = session.rewrite_answer(&interaction, &feedback).await;
    assert!(matches!(rewrite, Err(SessionError::InvalidState(_))));
}

#[tokio::test]
async fn failed_answer_leaves_history_untouched() {
    let answerer = Arc::new(ScriptedAnswerer::new(vec![
        Ok("LoAP is unpaid.".to_string()),
        Err(CollaboratorError::Service {
            status: 503,
            message: "overloaded".to_string(),
        }),
    ]));
    let mut session = session(answerer, Arc::new(ReplayValidator::new(vec![])));

    session.ask_question("Is LoAP paid?").await.unwrap();
    let before: Vec<_> = session.history().iter().map(Interaction::id).collect();

    let result = session.ask_question("How long can it last?").await;

    assert!(matches!(
        result,
        Err(SessionError::Upstream(CollaboratorError::Service { status: 503, .. }))
    ));
    let after: Vec<_> = session.history().iter().map(Interaction::id).collect();
    assert_eq!(before, after);
}

#[tokio::test]
async fn validation_does_not_modify_history() {
    let validator =
        Arc::new(ReplayValidator::new(vec![eligibility_violation()]).repeat_last());
    let mut session = session(Arc::new(ScriptedAnswerer::default()), validator.clone());

    let interaction = session.add_qa("Q?", "Yes, everyone is eligible.").unwrap();
    let snapshot: Vec<Interaction> = session.history().iter().cloned().collect();

    let first = session.validate_interaction(&interaction).await.unwrap();
    let second = session.validate_interaction(&interaction).await.unwrap();

    let after: Vec<Interaction> = session.history().iter().cloned().collect();
    assert_eq!(snapshot, after);
    assert_eq!(first.invalid_rules(), second.invalid_rules());
    assert_eq!(first.suggestions(), second.suggestions());
    // Not cached: both calls reached the validator.
    assert_eq!(validator.call_count(), 2);
}

#[tokio::test]
async fn malformed_payload_is_reported() {
    let payload = json!({ "findings": [ { "result": "MAYBE" } ] });
    let mut session = session(
        Arc::new(ScriptedAnswerer::default()),
        Arc::new(ReplayValidator::new(vec![payload])),
    );

    let interaction = session.add_qa("Q?", "A.").unwrap();
    let result = session.validate_interaction(&interaction).await;
    assert!(matches!(result, Err(SessionError::MalformedResponse(_))));
    assert_eq!(session.history().len(), 1);
}

#[tokio::test]
async fn rewritten_answer_is_what_gets_revalidated() {
    let answerer = Arc::new(ScriptedAnswerer::answering(&[
        "No, contractors are not eligible.",
    ]));
    let validator = Arc::new(ReplayValidator::new(vec![
        eligibility_violation(),
        confirmed_valid(),
    ]));
    let mut session = session(answerer, validator.clone());

    let interaction = session
        .add_qa("Are contractors eligible?", "Yes, contractors are eligible.")
        .unwrap();
    let feedback = session.validate_interaction(&interaction).await.unwrap();
    let rewritten = session.rewrite_answer(&interaction, &feedback).await.unwrap();

    let recheck = session.validate_interaction(&rewritten).await.unwrap();
    assert_eq!(recheck.verdict(), Verdict::Valid);
    assert_eq!(recheck.validated_answer(), "No, contractors are not eligible.");
    assert_eq!(validator.calls()[1].answer, "No, contractors are not eligible.");
}

#[tokio::test]
async fn refinement_stops_once_compliant() {
    let answerer = Arc::new(ScriptedAnswerer::answering(&[
        "No, part-time employees are not eligible.",
    ]));
    let validator = Arc::new(ReplayValidator::new(vec![
        eligibility_violation(),
        confirmed_valid(),
    ]));
    let mut session = session(answerer, validator.clone());

    let interaction = session
        .add_qa("Am I eligible as a part-timer?", "Yes.")
        .unwrap();
    let outcome = session
        .refine(&interaction, RefinementPolicy::new(3))
        .await
        .unwrap();

    assert_eq!(outcome.status, RefinementStatus::Compliant);
    assert_eq!(outcome.rewrites(), 1);
    assert_eq!(
        outcome.final_answer(),
        Some("No, part-time employees are not eligible.")
    );
    assert_eq!(validator.call_count(), 2);
    assert_eq!(session.history().len(), 1);
}

#[tokio::test]
async fn refinement_respects_round_budget() {
    let answerer = Arc::new(ScriptedAnswerer::answering(&[
        "Contractors may be eligible.",
        "Contractors are sometimes eligible.",
    ]));
    let validator =
        Arc::new(ReplayValidator::new(vec![eligibility_violation()]).repeat_last());
    let mut session = session(answerer.clone(), validator.clone());

    let interaction = session
        .add_qa("Are contractors eligible?", "Yes.")
        .unwrap();
    let outcome = session
        .refine(&interaction, RefinementPolicy::new(2))
        .await
        .unwrap();

    assert_eq!(outcome.status, RefinementStatus::BudgetExhausted);
    assert_eq!(outcome.rounds.len(), 2);
    assert_eq!(outcome.rewrites(), 2);
    assert!(outcome.final_feedback.is_invalid());

    // Initial check plus one check per rewrite.
    assert_eq!(validator.call_count(), 3);
    assert_eq!(answerer.prompts().len(), 2);

    // The second rewrite lives on a revision of the first interaction.
    let history = session.history();
    assert_eq!(history.len(), 2);
    let revision = history.last().unwrap();
    assert_eq!(revision.revision_of(), Some(interaction.id()));
    assert_eq!(revision.answer(), "Contractors may be eligible.");
    assert_eq!(
        revision.rewritten_answer(),
        Some("Contractors are sometimes eligible.")
    );
}

#[tokio::test]
async fn refinement_stops_when_inconclusive() {
    let validator = Arc::new(ReplayValidator::new(vec![json!({
        "findings": [ { "result": "TRANSLATION_AMBIGUOUS" } ]
    })]));
    let answerer = Arc::new(ScriptedAnswerer::default());
    let mut session = session(answerer.clone(), validator);

    let interaction = session.add_qa("Q?", "A.").unwrap();
    let outcome = session
        .refine(&interaction, RefinementPolicy::default())
        .await
        .unwrap();

    assert_eq!(outcome.status, RefinementStatus::Inconclusive);
    assert_eq!(outcome.rewrites(), 0);
    assert!(answerer.prompts().is_empty());
}

#[tokio::test]
async fn refinement_requires_a_budget() {
    let mut session = session(
        Arc::new(ScriptedAnswerer::default()),
        Arc::new(ReplayValidator::new(vec![])),
    );
    let interaction = session.add_qa("Q?", "A.").unwrap();

    let result = session.refine(&interaction, RefinementPolicy::new(0)).await;
    assert!(matches!(result, Err(SessionError::InvalidInput(_))));
}
