//! JSON schema checks for agent-authored payloads.

use anyhow::{Context, Result, anyhow};
use jsonschema::validator_for;
use serde::de::DeserializeOwned;
use serde_json::Value;

pub const SUBTASKS_SCHEMA: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/schemas/subtasks.schema.json"
));

pub const QUESTIONS_SCHEMA: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/schemas/questions.schema.json"
));

/// Validate `value` against `schema`, reporting every violation.
pub fn validate(schema: &str, value: &Value, what: &str) -> Result<()> {
    let schema_value: Value = serde_json::from_str(schema).context("parse embedded schema")?;
    let compiled =
        validator_for(&schema_value).map_err(|err| anyhow!("invalid schema: {}", err))?;
    if !compiled.is_valid(value) {
        let messages = compiled
            .iter_errors(value)
            .map(|err| err.to_string())
            .collect::<Vec<_>>();
        return Err(anyhow!(
            "{what} schema validation failed: {}",
            messages.join("; ")
        ));
    }
    Ok(())
}

/// Parse `raw` JSON, validate it, and deserialize into `T`.
pub fn parse_validated<T: DeserializeOwned>(schema: &str, raw: &str, what: &str) -> Result<T> {
    let value: Value = serde_json::from_str(raw).with_context(|| format!("parse {what} JSON"))?;
    validate(schema, &value, what)?;
    serde_json::from_value(value).with_context(|| format!("deserialize {what}"))
}
