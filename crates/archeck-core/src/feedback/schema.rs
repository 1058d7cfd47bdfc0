//! JSON Schema validation for findings payloads.
//!
//! Payloads are checked against `schema/findings.schema.json` before they
//! are decoded, so structural problems surface as a list of readable errors
//! instead of a single serde message.

use std::sync::OnceLock;

/// Embedded findings schema (loaded at compile time).
const FINDINGS_SCHEMA_JSON: &str = include_str!("../../schema/findings.schema.json");

/// Compiled validator (initialized once, reused).
static COMPILED_SCHEMA: OnceLock<Result<jsonschema::Validator, String>> = OnceLock::new();

fn get_validator() -> Result<&'static jsonschema::Validator, String> {
    let result = COMPILED_SCHEMA.get_or_init(|| {
        let schema_value: serde_json::Value = serde_json::from_str(FINDINGS_SCHEMA_JSON)
            .map_err(|e| format!("Invalid schema JSON: {}", e))?;

        jsonschema::options()
            .build(&schema_value)
            .map_err(|e| format!("Failed to compile schema: {}", e))
    });

    result.as_ref().map_err(Clone::clone)
}

/// Validate a findings payload against the schema.
///
/// Returns every violation found, formatted as `"<message> at <path>"`.
pub fn validate_findings_schema(payload: &serde_json::Value) -> Result<(), Vec<String>> {
    let validator = get_validator().map_err(|e| vec![e])?;

    let errors: Vec<String> = validator
        .iter_errors(payload)
        .map(|e| format!("{} at {}", e, e.instance_path))
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
