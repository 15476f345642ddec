//! Structural checks for stored problem records.
//!
//! The validator judges shape only (fields, id format, answer letter, option
//! count, balanced `$` math delimiters). It never decides whether a problem is
//! mathematically right. Every check runs on every record, so one pass reports
//! every violation in the bank.

/// Fields every stored record must carry.
pub const REQUIRED_FIELDS: [&str; 7] = [
    "id",
    "topic",
    "difficulty",
    "question",
    "answer",
    "options",
    "solution",
];

/// One failed check on one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaViolation {
    /// 1-based position of the record in the bank.
    pub position: usize,
    pub kind: ViolationKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ViolationKind {
    #[error("record is not a JSON object")]
    NotAnObject,

    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    #[error("id {0} must start with 'p'")]
    InvalidId(String),

    #[error("answer {0} must be one of A, B, C or D")]
    InvalidAnswer(String),

    #[error("options must be a list")]
    OptionsNotList,

    #[error("expected exactly 4 options, found {0}")]
    WrongOptionCount(usize),

    #[error("answer '{answer}' has no matching option ({count} options present)")]
    AnswerOutOfRange { answer: String, count: usize },

    #[error("question has {0} '$' delimiters; math markup may be unclosed")]
    UnbalancedMath(usize),
}

impl fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "problem {}: {}", self.position, self.kind)
    }
}

/// Outcome of validating a whole bank.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationReport {
    pub checked: usize,
    pub violations: Vec<SchemaViolation>,
}

impl ValidationReport {
    /// True when every record passed every check.
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }
}

/// Checks a single record.
///
/// # Arguments
/// * `record` - The stored record, as read from the bank.
/// * `position` - Its 1-based position, attached to every violation.
pub fn validate(record: &Value, position: usize) -> Vec<SchemaViolation> {
    let violation = |kind| SchemaViolation { position, kind };

    let Some(fields) = record.as_object() else {
        return vec![violation(ViolationKind::NotAnObject)];
    };

    let mut violations: Vec<SchemaViolation> = REQUIRED_FIELDS
        .iter()
        .filter(|field| !fields.contains_key(**field))
        .map(|field| violation(ViolationKind::MissingField(*field)))
        .collect();

    if let Some(id) = fields.get("id") {
        if !id.as_str().is_some_and(|id| id.starts_with('p')) {
            violations.push(violation(ViolationKind::InvalidId(id.to_string())));
        }
    }

    let answer = fields.get("answer");
    let answer_letter = answer.and_then(Value::as_str).filter(|a| ANSWER_LETTERS.contains(a));
    if let (Some(answer), None) = (answer, answer_letter) {
        violations.push(violation(ViolationKind::InvalidAnswer(answer.to_string())));
    }

    if let Some(options) = fields.get("options") {
        match options.as_array() {
            Some(options) => {
                if options.len() != OPTION_COUNT {
                    violations.push(violation(ViolationKind::WrongOptionCount(options.len())));
                }
                let selected = answer
                    .and_then(Value::as_str)
                    .and_then(|a| letter_offset(a).map(|index| (a, index)));
                if let Some((letter, index)) = selected {
                    if index >= options.len() {
                        violations.push(violation(ViolationKind::AnswerOutOfRange {
                            answer: letter.to_string(),
                            count: options.len(),
                        }));
                    }
                }
            }
            None => violations.push(violation(ViolationKind::OptionsNotList)),
        }
    }

    if let Some(question) = fields.get("question").and_then(Value::as_str) {
        let delimiters = question.matches('$').count();
        if delimiters % 2 != 0 {
            violations.push(violation(ViolationKind::UnbalancedMath(delimiters)));
        }
    }

    violations
}

/// Option index named by a single ASCII letter, case-insensitive (`"c"` -> 2, `"E"` -> 4).
///
/// Letters past `D` still map to an index so that the range check can report
/// them against the options actually present.
fn letter_offset(answer: &str) -> Option<usize> {
    let mut chars = answer.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii_alphabetic() => {
            Some(usize::from(c.to_ascii_uppercase() as u8 - b'A'))
        }
        _ => None,
    }
}

/// Validates every record of the bank, positions counted from 1.
pub fn validate_bank(bank: &ProblemBank) -> ValidationReport {
    let violations = bank
        .records
        .iter()
        .enumerate()
        .flat_map(|(i, record)| validate(record, i + 1))
        .collect();

    ValidationReport {
        checked: bank.len(),
        violations,
    }
}


use crate::problem_bank::ProblemBank;
use crate::problems::{ANSWER_LETTERS, OPTION_COUNT};
use serde_json::Value;
use std::fmt;
use thiserror::Error;
