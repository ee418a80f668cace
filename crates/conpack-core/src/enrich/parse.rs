//! Interpretation of enrichment answers.
//!
//! Every answer ends up as exactly one of: a [`RuleDescriptor`], a
//! `not_relevant` failure (the service said the rule is unknown or does not
//! apply), or a `parse_error` failure (the answer is not in the required
//! structure).

use std::collections::HashSet;

use serde_json::{Map, Value};

use crate::model::{FailedRule, FailureReason, RuleDescriptor, RuleParameter};

const DEFAULT_SOURCE_OWNER: &str = "AWS";
const MAX_DETAIL_CHARS: usize = 200;

/// Parse the raw answer text for `rule_identifier`.
///
/// The requested identifier is authoritative: whatever identifier the
/// answer echoes back is ignored.
pub fn parse_answer(rule_identifier: &str, text: &str) -> Result<RuleDescriptor, FailedRule> {
    let fail = |reason: FailureReason, detail: String| FailedRule {
        rule_identifier: rule_identifier.to_string(),
        reason,
        detail,
    };

    let object = extract_object(text).map_err(|detail| fail(FailureReason::ParseError, detail))?;

    if object
        .get("not_applicable")
        .and_then(Value::as_bool)
        .unwrap_or(false)
    {
        let reason = string_field(&object, "reason").unwrap_or("not applicable");
        return Err(fail(FailureReason::NotRelevant, reason.to_string()));
    }
    if let Some(error) = object.get("error") {
        let detail = error.as_str().map_or_else(|| error.to_string(), str::to_string);
        return Err(fail(FailureReason::NotRelevant, detail));
    }

    let display_name = string_field(&object, "display_name")
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| {
            fail(
                FailureReason::ParseError,
                "answer has no display_name".to_string(),
            )
        })?
        .trim()
        .to_string();

    let parameters = match object.get("parameters") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => {
            parse_parameters(items).map_err(|detail| fail(FailureReason::ParseError, detail))?
        }
        Some(other) => {
            return Err(fail(
                FailureReason::ParseError,
                format!("parameters must be a list, got {}", kind(other)),
            ))
        }
    };

    let source_owner = string_field(&object, "source_owner")
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(DEFAULT_SOURCE_OWNER)
        .to_string();
    let source_identifier = string_field(&object, "source_identifier")
        .filter(|s| !s.trim().is_empty())
        .map_or_else(|| display_name.clone(), str::to_string);

    Ok(RuleDescriptor {
        rule_identifier: rule_identifier.to_string(),
        description: string_field(&object, "description")
            .unwrap_or_default()
            .trim()
            .to_string(),
        display_name,
        parameters,
        source_owner,
        source_identifier,
    })
}

/// First JSON object in `text`, tolerating markdown fences and prose around it.
fn extract_object(text: &str) -> Result<Map<String, Value>, String> {
    let text = strip_fences(text.trim());
    let start = text
        .find('{')
        .ok_or_else(|| format!("no JSON object in answer: {}", snippet(text)))?;

    let value = serde_json::Deserializer::from_str(&text[start..])
        .into_iter::<Value>()
        .next()
        .ok_or_else(|| "no JSON value found in answer".to_string())?
        .map_err(|e| format!("invalid JSON: {e}"))?;

    match value {
        Value::Object(map) => Ok(map),
        other => Err(format!("expected a JSON object, got {}", kind(&other))),
    }
}

fn strip_fences(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // drop the info string (```json)
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

fn parse_parameters(items: &[Value]) -> Result<Vec<RuleParameter>, String> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(items.len());

    for (idx, item) in items.iter().enumerate() {
        let obj = item
            .as_object()
            .ok_or_else(|| format!("parameter #{idx} is not an object"))?;
        let name = string_field(obj, "name")
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .ok_or_else(|| format!("parameter #{idx} has no name"))?;

        let default = match obj.get("default") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(v @ (Value::Number(_) | Value::Bool(_))) => Some(v.to_string()),
            Some(other) => {
                return Err(format!(
                    "parameter '{name}' default must be a scalar, got {}",
                    kind(other)
                ))
            }
        };

        if !seen.insert(name.to_string()) {
            continue;
        }
        out.push(RuleParameter {
            name: name.to_string(),
            required: obj.get("required").and_then(Value::as_bool).unwrap_or(false),
            default,
        });
    }
    Ok(out)
}

fn string_field<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    obj.get(key).and_then(Value::as_str)
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn snippet(text: &str) -> String {
    let mut s: String = text.chars().take(MAX_DETAIL_CHARS).collect();
    if text.chars().count() > MAX_DETAIL_CHARS {
        s.push_str("...");
    }
    s
}
