// SPDX-License-Identifier: MIT

//! Prompt templates with `{key}` placeholders
//!
//! `{{` and `}}` produce literal braces. Strings are inserted verbatim, any
//! other value as compact JSON.

use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TemplateError {
    #[error("unclosed '{{' at byte {0}")]
    Unclosed(usize),

    #[error("unmatched '}}' at byte {0}")]
    StrayClose(usize),

    #[error("empty placeholder at byte {0}")]
    EmptyPlaceholder(usize),

    #[error("no value for placeholder '{0}'")]
    MissingKey(String),

    /// The placeholder is syntactically fine but not offered by the caller
    #[error("unknown placeholder '{0}'")]
    UnknownPlaceholder(String),
}

enum Piece<'a> {
    Literal(&'a str),
    Brace(char),
    Key(&'a str),
}

fn tokenize(template: &str) -> Result<Vec<Piece<'_>>, TemplateError> {
    let mut pieces = Vec::new();
    let bytes = template.as_bytes();
    let mut literal_start = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'{' | b'}' if bytes.get(i + 1) == Some(&bytes[i]) => {
                pieces.push(Piece::Literal(&template[literal_start..i]));
                pieces.push(Piece::Brace(bytes[i] as char));
                i += 2;
                literal_start = i;
            }
            b'{' => {
                let close = template[i + 1..]
                    .find('}')
                    .map(|offset| i + 1 + offset)
                    .ok_or(TemplateError::Unclosed(i))?;
                let key = template[i + 1..close].trim();
                if key.is_empty() {
                    return Err(TemplateError::EmptyPlaceholder(i));
                }
                if key.contains('{') {
                    return Err(TemplateError::Unclosed(i));
                }
                pieces.push(Piece::Literal(&template[literal_start..i]));
                pieces.push(Piece::Key(key));
                i = close + 1;
                literal_start = i;
            }
            b'}' => return Err(TemplateError::StrayClose(i)),
            _ => i += 1,
        }
    }
    pieces.push(Piece::Literal(&template[literal_start..]));
    Ok(pieces)
}

/// Placeholder names in order of first appearance
pub fn placeholders(template: &str) -> Result<Vec<String>, TemplateError> {
    let mut keys: Vec<String> = Vec::new();
    for piece in tokenize(template)? {
        if let Piece::Key(key) = piece {
            if !keys.iter().any(|k| k == key) {
                keys.push(key.to_string());
            }
        }
    }
    Ok(keys)
}

/// Render a template, looking each placeholder up through `lookup`
pub fn render<'v, F>(template: &str, lookup: F) -> Result<String, TemplateError>
where
    F: Fn(&str) -> Option<&'v Value>,
{
    let mut out = String::with_capacity(template.len());
    for piece in tokenize(template)? {
        match piece {
            Piece::Literal(text) => out.push_str(text),
            Piece::Brace(c) => out.push(c),
            Piece::Key(key) => {
                let value =
                    lookup(key).ok_or_else(|| TemplateError::MissingKey(key.to_string()))?;
                match value {
                    Value::String(s) => out.push_str(s),
                    other => out.push_str(&other.to_string()),
                }
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    #[test]
    fn test_render_strings_and_json() {
        let values: HashMap<&str, Value> =
            HashMap::from([("ticket", json!("Login fails")), ("meta", json!({"p": 1}))]);
        let out = render("Ticket: {ticket} / {meta}", |k| values.get(k)).unwrap();
        assert_eq!(out, "Ticket: Login fails / {\"p\":1}");
    }

    #[test]
    fn test_escaped_braces() {
        let values: HashMap<&str, Value> = HashMap::from([("x", json!("1"))]);
        let out = render("{{\"a\": {x}}}", |k| values.get(k)).unwrap();
        assert_eq!(out, "{\"a\": 1}");
    }

    #[test]
    fn test_missing_key() {
        let err = render("{nope}", |_| None).unwrap_err();
        assert_eq!(err, TemplateError::MissingKey("nope".to_string()));
    }

    #[test]
    fn test_malformed_templates() {
        assert!(matches!(placeholders("{open"), Err(TemplateError::Unclosed(0))));
        assert!(matches!(placeholders("a } b"), Err(TemplateError::StrayClose(2))));
        assert!(matches!(placeholders("{ }"), Err(TemplateError::EmptyPlaceholder(0))));
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(TemplateError::Unclosed(3).to_string(), "unclosed '{' at byte 3");
        assert_eq!(TemplateError::StrayClose(2).to_string(), "unmatched '}' at byte 2");
        assert_eq!(
            TemplateError::MissingKey("ticket".into()).to_string(),
            "no value for placeholder 'ticket'"
        );
    }

    #[test]
    fn test_placeholders_deduplicated() {
        assert_eq!(
            placeholders("{a} and {b} and {a}").unwrap(),
            vec!["a".to_string(), "b".to_string()]
        );
    }
}
