// SPDX-License-Identifier: MIT

//! Incremental structural repair of almost-JSON text
//!
//! Fixes run in a fixed order and accumulate: each one works on the output of
//! the previous. The text is re-parsed only after a fix changed it.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};

use super::parse::{object_candidate, parse_candidate};

static BAREWORD_KEY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"([{,]\s*)([A-Za-z_][A-Za-z0-9_\-]*)(\s*:)").expect("valid bareword key regex")
});

/// One structural fix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructuralFix {
    BalanceDelimiters,
    StripTrailingSeparators,
    QuoteBarewordKeys,
}

impl StructuralFix {
    pub const ORDER: [StructuralFix; 3] = [
        StructuralFix::BalanceDelimiters,
        StructuralFix::StripTrailingSeparators,
        StructuralFix::QuoteBarewordKeys,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            StructuralFix::BalanceDelimiters => "balance_delimiters",
            StructuralFix::StripTrailingSeparators => "strip_trailing_separators",
            StructuralFix::QuoteBarewordKeys => "quote_bareword_keys",
        }
    }

    pub fn apply(&self, text: &str) -> String {
        match self {
            StructuralFix::BalanceDelimiters => balance_delimiters(text),
            StructuralFix::StripTrailingSeparators => strip_trailing_separators(text),
            StructuralFix::QuoteBarewordKeys => quote_bareword_keys(text),
        }
    }
}

/// A record recovered by structural repair and the fixes that were needed
#[derive(Debug, Clone)]
pub struct Repaired {
    pub record: Map<String, Value>,
    pub fixes: Vec<StructuralFix>,
}

impl Repaired {
    pub fn fix_names(&self) -> String {
        self.fixes
            .iter()
            .map(StructuralFix::name)
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Apply the fixes in order, re-parsing after each one that changed the text
pub fn repair(text: &str) -> Result<Repaired, String> {
    let mut current = object_candidate(text)
        .ok_or_else(|| "no JSON object found in text".to_string())?
        .to_string();
    let mut fixes = Vec::new();
    let mut last_error = None;

    for fix in StructuralFix::ORDER {
        let next = fix.apply(&current);
        if next == current {
            continue;
        }
        log::debug!("Structural fix {} changed the text", fix.name());
        current = next;
        fixes.push(fix);
        match parse_candidate(&current) {
            Ok(record) => return Ok(Repaired { record, fixes }),
            Err(e) => last_error = Some(e),
        }
    }

    Err(match last_error {
        Some(e) => format!("still unparseable after structural fixes: {}", e),
        None => "no structural fix applied".to_string(),
    })
}

/// Close open strings and brackets, drop stray closers, cut trailing prose
fn balance_delimiters(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 4);
    let mut stack: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for c in text.chars() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            '{' => {
                stack.push('}');
                out.push(c);
            }
            '[' => {
                stack.push(']');
                out.push(c);
            }
            '}' | ']' => {
                if stack.last() == Some(&c) {
                    stack.pop();
                    out.push(c);
                    if stack.is_empty() {
                        return out;
                    }
                }
                // stray closer: dropped
            }
            _ => out.push(c),
        }
    }

    if in_string {
        if escaped {
            out.pop();
        }
        out.push('"');
    }
    while let Some(closer) = stack.pop() {
        out.push(closer);
    }
    out
}

/// Remove commas that directly precede a closing bracket
fn strip_trailing_separators(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;

    for (i, &c) in chars.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            out.push(c);
            continue;
        }
        if c == '"' {
            in_string = true;
        } else if c == ',' {
            let next = chars[i + 1..].iter().find(|n| !n.is_whitespace());
            if matches!(next, Some('}') | Some(']')) {
                continue;
            }
        }
        out.push(c);
    }
    out
}

/// Quote unquoted object keys, leaving string literals untouched
fn quote_bareword_keys(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 8);
    for (segment, is_string) in split_string_literals(text) {
        if is_string {
            out.push_str(segment);
        } else {
            out.push_str(&BAREWORD_KEY.replace_all(segment, "$1\"$2\"$3"));
        }
    }
    out
}

/// Split text into alternating code and string-literal segments
fn split_string_literals(text: &str) -> Vec<(&str, bool)> {
    let mut segments = Vec::new();
    let mut start = 0;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                segments.push((&text[start..=i], true));
                start = i + 1;
                in_string = false;
            }
        } else if c == '"' {
            if start < i {
                segments.push((&text[start..i], false));
            }
            start = i;
            in_string = true;
        }
    }
    if start < text.len() {
        segments.push((&text[start..], in_string));
    }
    segments
}
