// SPDX-License-Identifier: MIT

//! Re-prompt messages for RETRY mode

use serde_json::Value;

use crate::strata::repair::sample;

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

/// Feedback for a reply that parsed but failed validation
///
/// Carries the attempt counter, every violation, the expected schema and the
/// submission itself so the model can compare.
pub fn build_validation_feedback(
    schema: &Value,
    submission: &Value,
    errors: &[String],
    attempt: usize,
    max_attempts: usize,
) -> String {
    let mut feedback = format!(
        "Attempt {}/{}: the record does not match the schema.\n\nErrors:\n",
        attempt, max_attempts
    );
    for error in errors {
        feedback.push_str("  - ");
        feedback.push_str(error);
        feedback.push('\n');
    }
    feedback.push_str("\nExpected schema:\n");
    feedback.push_str(&pretty(schema));
    feedback.push_str("\n\nYour submission:\n");
    feedback.push_str(&pretty(submission));
    feedback.push_str("\n\nFix every error and reply with the corrected JSON object only.");
    feedback
}

/// Feedback for a reply that was not JSON at all
pub fn build_parse_error_feedback(
    raw_text: &str,
    parse_error: &str,
    attempt: usize,
    max_attempts: usize,
    schema: &Value,
) -> String {
    format!(
        "Attempt {}/{}: your reply could not be parsed as JSON.\n\n\
         Parse error: {}\n\n\
         Your reply (truncated):\n{}\n\n\
         Expected schema:\n{}\n\n\
         Reply with a single JSON object matching the schema above.",
        attempt,
        max_attempts,
        parse_error,
        sample(raw_text, 500),
        pretty(schema)
    )
}
