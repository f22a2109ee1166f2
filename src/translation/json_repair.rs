/*!
 * JSON extraction, truncation repair and schema checking for model output.
 *
 * Models wrap JSON in prose or code fences and occasionally stop mid-value
 * when they hit an output limit. Structured results go through three steps:
 * extract the JSON text, repair truncation by closing open strings and
 * containers (dropping a trailing incomplete element if needed), then check
 * the value against the JSON schema's `type`/`required`/`properties`/`items`.
 * A value that still does not fit is rejected, never returned partially.
 */

use log::warn;
use serde_json::Value;

use crate::errors::ProviderError;

/// Extract the JSON part of a potentially wrapped response.
pub fn extract_json(response: &str) -> Option<&str> {
    let trimmed = response.trim();

    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        return Some(trimmed);
    }

    // Look for JSON block in markdown code fence
    if let Some(start) = trimmed.find("```json") {
        let body = &trimmed[start + 7..];
        let end = body.find("```").unwrap_or(body.len());
        return Some(body[..end].trim());
    }

    // Look for JSON block without language specifier
    if let Some(start) = trimmed.find("```") {
        let body = &trimmed[start + 3..];
        let end = body.find("```").unwrap_or(body.len());
        let json = body[..end].trim();
        if json.starts_with('{') || json.starts_with('[') {
            return Some(json);
        }
    }

    // Look for the first opening bracket
    let start = trimmed.find(['{', '['])?;
    Some(&trimmed[start..])
}

/// Scanner state at a position of the input
#[derive(Debug, Clone)]
struct ScanState {
    stack: Vec<char>,
    in_string: bool,
}

/// Close everything left open in `prefix` given its scan state.
fn close_open(prefix: &str, state: &ScanState) -> String {
    let mut repaired = prefix.trim_end().to_string();
    if state.in_string {
        if repaired.ends_with('\\') {
            repaired.pop();
        }
        repaired.push('"');
    }
    while repaired.ends_with(',') || repaired.ends_with(':') {
        repaired.pop();
        repaired = repaired.trim_end().to_string();
    }
    for open in state.stack.iter().rev() {
        repaired.push(if *open == '{' { '}' } else { ']' });
    }
    repaired
}

/// Repair JSON text cut off before its end.
///
/// Returns candidates from most to least complete: the text with all open
/// strings and containers closed, then the text cut back to each preceding
/// element boundary and closed.
fn repair_candidates(text: &str) -> Vec<String> {
    let mut state = ScanState {
        stack: Vec::new(),
        in_string: false,
    };
    let mut escaped = false;
    let mut boundaries: Vec<(usize, ScanState)> = Vec::new();

    for (position, ch) in text.char_indices() {
        if state.in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                state.in_string = false;
            }
            continue;
        }

        match ch {
            '"' => state.in_string = true,
            '{' | '[' => state.stack.push(ch),
            '}' | ']' => {
                state.stack.pop();
                if state.stack.is_empty() {
                    // Anything after the first complete value is noise
                    return vec![text[..=position].to_string()];
                }
            }
            ',' => boundaries.push((position, state.clone())),
            _ => {}
        }
    }

    let mut candidates = vec![close_open(text, &state)];
    for (position, boundary) in boundaries.iter().rev() {
        candidates.push(close_open(&text[..*position], boundary));
    }
    candidates
}

/// Parse JSON text, repairing truncation if needed.
pub fn parse_lenient(response: &str) -> Result<Value, ProviderError> {
    let json = extract_json(response)
        .ok_or_else(|| ProviderError::ParseError("Could not extract JSON from response".to_string()))?;

    if let Ok(value) = serde_json::from_str::<Value>(json) {
        return Ok(value);
    }

    for candidate in repair_candidates(json) {
        if let Ok(value) = serde_json::from_str::<Value>(&candidate) {
            warn!("Repaired malformed JSON response ({} -> {} chars)", json.len(), candidate.len());
            return Ok(value);
        }
    }

    Err(ProviderError::ParseError(format!(
        "Malformed JSON response could not be repaired: {}",
        json.chars().take(200).collect::<String>()
    )))
}

fn type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "null" => value.is_null(),
        _ => true,
    }
}

fn check_schema(value: &Value, schema: &Value, path: &str) -> Result<(), String> {
    if let Some(expected) = schema.get("type").and_then(Value::as_str) {
        if !type_matches(&expected.to_lowercase(), value) {
            return Err(format!("{} is not of type {}", path, expected));
        }
    }

    if let Some(object) = value.as_object() {
        if let Some(required) = schema.get("required").and_then(Value::as_array) {
            for key in required.iter().filter_map(Value::as_str) {
                if !object.contains_key(key) {
                    return Err(format!("{} is missing required field '{}'", path, key));
                }
            }
        }
        if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
            for (key, property_schema) in properties {
                if let Some(property) = object.get(key) {
                    check_schema(property, property_schema, &format!("{}.{}", path, key))?;
                }
            }
        }
    }

    if let (Some(items), Some(item_schema)) = (value.as_array(), schema.get("items")) {
        for (position, item) in items.iter().enumerate() {
            check_schema(item, item_schema, &format!("{}[{}]", path, position))?;
        }
    }

    Ok(())
}

/// Check a value against the subset of JSON schema used by structured prompts.
pub fn validate_against_schema(value: &Value, schema: &Value) -> Result<(), ProviderError> {
    check_schema(value, schema, "$").map_err(|message| ProviderError::ParseError(format!("Schema mismatch: {}", message)))
}

/// Parse, repair and validate a structured response.
pub fn parse_structured(response: &str, schema: &Value) -> Result<Value, ProviderError> {
    let value = parse_lenient(response)?;
    validate_against_schema(&value, schema)?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn terms_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "terms": {"type": "array", "items": {"type": "string"}}
            },
            "required": ["terms"]
        })
    }

    #[test]
    fn test_extractJson_codeFence_shouldReturnBody() {
        let response = "Here you go:\n```json\n{\"terms\": []}\n```\nThanks";
        assert_eq!(extract_json(response), Some("{\"terms\": []}"));
    }

    #[test]
    fn test_extractJson_leadingProse_shouldStartAtBracket() {
        assert_eq!(extract_json("Result: [1, 2]"), Some("[1, 2]"));
        assert_eq!(extract_json("no json here"), None);
    }

    #[test]
    fn test_parseLenient_truncatedString_shouldCloseStringAndContainers() {
        let value = parse_lenient(r#"{"terms": ["Pencey Prep", "Holden Caulf"#).unwrap();
        assert_eq!(value, json!({"terms": ["Pencey Prep", "Holden Caulf"]}));
    }

    #[test]
    fn test_parseLenient_truncatedKey_shouldDropIncompleteMember() {
        let value = parse_lenient(r#"{"a": {"x": 1}, "b": 2, "ke"#).unwrap();
        assert_eq!(value, json!({"a": {"x": 1}, "b": 2}));
    }

    #[test]
    fn test_parseLenient_trailingNoise_shouldKeepFirstValue() {
        let value = parse_lenient(r#"{"terms": ["A"]} and some commentary }"#).unwrap();
        assert_eq!(value, json!({"terms": ["A"]}));
    }

    #[test]
    fn test_parseStructured_missingRequiredField_shouldReject() {
        let result = parse_structured(r#"{"names": ["A"]}"#, &terms_schema());
        assert!(matches!(result, Err(ProviderError::ParseError(msg)) if msg.contains("terms")));
    }

    #[test]
    fn test_parseStructured_wrongItemType_shouldReject() {
        let result = parse_structured(r#"{"terms": [1, 2]}"#, &terms_schema());
        assert!(result.is_err());
    }

    #[test]
    fn test_parseStructured_truncatedBeforeRequiredField_shouldReject() {
        let result = parse_structured(r#"{"note": "partial", "ter"#, &terms_schema());
        assert!(result.is_err());
    }
}
