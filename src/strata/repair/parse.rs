// SPDX-License-Identifier: MIT

//! Direct JSON object parsing from model output

use serde_json::{Deserializer, Map, Value};

use crate::strata::state::json_type_name;

/// Remove a surrounding markdown code fence, if any
///
/// Only the first fenced block is kept; text without a fence is returned
/// trimmed.
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(open) = trimmed.find("```") else {
        return trimmed;
    };
    let after_open = &trimmed[open + 3..];
    // Skip the info string (```json)
    let body_start = after_open.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &after_open[body_start..];
    match body.find("```") {
        Some(close) => body[..close].trim(),
        None => body.trim(),
    }
}

/// The fence-stripped text starting at the first `{`
pub fn object_candidate(text: &str) -> Option<&str> {
    let body = strip_code_fences(text);
    body.find('{').map(|start| &body[start..])
}

/// Parse the first complete JSON value starting at the first `{`
///
/// Trailing prose after the value is ignored. The value must be an object.
pub fn parse_object(text: &str) -> Result<Map<String, Value>, String> {
    let candidate =
        object_candidate(text).ok_or_else(|| "no JSON object found in text".to_string())?;
    parse_candidate(candidate)
}

/// Parse a candidate that already starts at its opening brace
pub(crate) fn parse_candidate(candidate: &str) -> Result<Map<String, Value>, String> {
    let mut stream = Deserializer::from_str(candidate).into_iter::<Value>();
    match stream.next() {
        Some(Ok(Value::Object(map))) => Ok(map),
        Some(Ok(other)) => Err(format!("expected a JSON object, found {}", json_type_name(&other))),
        Some(Err(e)) => Err(e.to_string()),
        None => Err("empty input".to_string()),
    }
}

/// Truncate to at most `max` characters, marking the cut
pub fn sample(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_plain_object() {
        let map = parse_object(r#"{"a": 1, "b": "x"}"#).unwrap();
        assert_eq!(Value::Object(map), json!({"a": 1, "b": "x"}));
    }

    #[test]
    fn test_parse_fenced_object_with_prose() {
        let text = "Here you go:\n```json\n{\"category\": \"bug\"}\n```\nLet me know!";
        let map = parse_object(text).unwrap();
        assert_eq!(map["category"], "bug");
    }

    #[test]
    fn test_trailing_prose_ignored() {
        let map = parse_object(r#"Result: {"ok": true} and that is all {"#).unwrap();
        assert_eq!(map["ok"], true);
    }

    #[test]
    fn test_no_object() {
        assert_eq!(
            parse_object("no json here").unwrap_err(),
            "no JSON object found in text"
        );
    }

    #[test]
    fn test_trailing_comma_is_an_error() {
        let err = parse_object(r#"{"a": 1, "b": 2,}"#).unwrap_err();
        assert!(err.contains("trailing comma"), "{err}");
    }

    #[test]
    fn test_sample_is_char_safe() {
        assert_eq!(sample("héllo", 2), "hé...");
        assert_eq!(sample("short", 500), "short");
    }
}
