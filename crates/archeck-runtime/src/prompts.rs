//! System prompt for the answering service.

/// Base system prompt for policy questions.
pub const ANSWER_SYSTEM_PROMPT: &str = r#"
You answer employee questions about company policy.

## Answering Rules
1. Answer the question that was asked, directly and in plain language
2. State eligibility, limits and conditions explicitly (who, how long, under what circumstances)
3. Do not invent exceptions or conditions that were not asked about
4. If you do not know, say so instead of guessing
5. Keep the answer to a few sentences

Your answer will be checked against the formal policy.
"#;

/// Build the system prompt, optionally followed by an operator-supplied
/// addendum (for example a short summary of the policy document).
pub fn answer_system_prompt(addendum: Option<&str>) -> String {
    match addendum.map(str::trim).filter(|a| !a.is_empty()) {
        Some(addendum) => format!("{}\n## Policy Context\n{}\n", ANSWER_SYSTEM_PROMPT.trim(), addendum),
        None => ANSWER_SYSTEM_PROMPT.trim().to_string(),
    }
}
