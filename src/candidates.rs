//! Turning raw provider text into candidate problems.

const FENCE: &str = "```";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FenceState {
    /// Before any fence marker; text here is prose the provider wrapped around the payload.
    Outside,
    /// Just past an opening fence; an optional language tag (`json`) runs to the end of the line.
    AfterOpen,
    /// Inside the fenced body, waiting for the closing marker or end of input.
    Body,
}

/// Extracts the payload from text that may be wrapped in a fenced code block.
///
/// Recognizes a fence opened with a language tag (```` ```json ````) or a bare
/// fence, with or without a closing fence. Text without any fence is returned
/// trimmed as-is.
pub fn strip_code_fence(content: &str) -> &str {
    let mut state = FenceState::Outside;
    let mut rest = content;
    let mut body_start = 0;

    loop {
        match state {
            FenceState::Outside => match rest.find(FENCE) {
                Some(at) => {
                    rest = &rest[at + FENCE.len()..];
                    state = FenceState::AfterOpen;
                }
                None => return content.trim(),
            },
            FenceState::AfterOpen => {
                let tag_len = rest
                    .find(|c: char| !(c.is_ascii_alphanumeric() || c == '-' || c == '_'))
                    .unwrap_or(rest.len());
                rest = &rest[tag_len..];
                body_start = content.len() - rest.len();
                state = FenceState::Body;
            }
            FenceState::Body => {
                let body = &content[body_start..];
                let end = body.find(FENCE).unwrap_or(body.len());
                return body[..end].trim();
            }
        }
    }
}

/// Parses raw provider output into candidate problems.
///
/// The fence is stripped first. A JSON array yields one candidate per element;
/// a single JSON object is accepted as a one-element batch.
///
/// # Errors
/// Returns [`IngestError::MalformedContent`] with a truncated preview when the
/// payload is not a JSON array/object of candidate records.
pub fn parse_candidates(content: &str) -> Result<Vec<RawProblem>, IngestError> {
    let payload = strip_code_fence(content);

    let malformed = |reason: String| IngestError::MalformedContent {
        reason,
        preview: content_preview(payload),
    };

    let value: Value = serde_json::from_str(payload).map_err(|e| malformed(e.to_string()))?;

    let items = match value {
        Value::Array(items) => items,
        object @ Value::Object(_) => vec![object],
        other => {
            return Err(malformed(format!(
                "expected a JSON array of problems, found {}",
                json_type_name(&other)
            )));
        }
    };

    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| {
            serde_json::from_value(item)
                .map_err(|e| malformed(format!("candidate {}: {}", i + 1, e)))
        })
        .collect()
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}


use crate::errors::{IngestError, content_preview};
use crate::problems::RawProblem;
use serde_json::Value;
