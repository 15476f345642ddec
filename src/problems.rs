//! The canonical problem record and normalization of raw candidates.

/// Answer letters in option order. After normalization the answer is always the first one.
pub const ANSWER_LETTERS: [&str; 4] = ["A", "B", "C", "D"];

/// Number of options a multiple-choice problem carries.
pub const OPTION_COUNT: usize = 4;

/// A problem record in its canonical stored shape.
///
/// The correct option always sits at `options[0]` and `answer` is always `"A"`.
/// `type`, `answerType` and `answerExpr` are not produced here; the migration
/// pass fills them in for the whole bank.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Problem {
    pub id: String,
    pub topic: String,
    pub difficulty: String,
    pub question: String,
    pub answer: String,
    pub options: Vec<String>,
    pub solution: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// A candidate problem as returned by a content source. Nothing here is trusted:
/// every field may be missing, and scalar values of the wrong type are stringified.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawProblem {
    #[serde(default, deserialize_with = "lenient_text")]
    pub question: Option<String>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub options: Option<Vec<String>>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub answer: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub solution: Option<String>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub tags: Option<Vec<String>>,
}

/// Formats the bank identifier for a sequence number, e.g. `7` -> `"p7"`.
pub fn format_id(sequence: u64) -> String {
    format!("p{}", sequence)
}

/// Maps an answer letter (case-insensitive, surrounding whitespace ignored) to its option index.
///
/// Returns `None` for anything that is not exactly one of `A`-`D`.
pub fn answer_index(answer: &str) -> Option<usize> {
    let trimmed = answer.trim();
    ANSWER_LETTERS
        .iter()
        .position(|letter| letter.eq_ignore_ascii_case(trimmed))
}

/// Canonicalizes a raw candidate into the stored shape.
///
/// The option selected by the candidate's answer letter is moved to the front,
/// the others keep their relative order, and the answer becomes `"A"`.
/// Normalization never fails: a candidate whose answer letter does not point at
/// an existing option keeps its options untouched and is left for the validator.
///
/// # Arguments
/// * `raw` - The untrusted candidate.
/// * `topic` / `difficulty` - Batch-level labels; a generation request covers one pair.
/// * `sequence` - The numeric part of the id allocated for this record.
pub fn normalize(raw: RawProblem, topic: &str, difficulty: &str, sequence: u64) -> Problem {
    let mut options = raw.options.unwrap_or_default();
    let answer = raw.answer.unwrap_or_else(|| ANSWER_LETTERS[0].to_string());

    if let Some(index) = answer_index(&answer).filter(|&i| i < options.len()) {
        let correct = options.remove(index);
        options.insert(0, correct);
    }
    options.truncate(OPTION_COUNT);

    Problem {
        id: format_id(sequence),
        topic: topic.to_string(),
        difficulty: difficulty.to_string(),
        question: raw.question.unwrap_or_default(),
        answer: ANSWER_LETTERS[0].to_string(),
        options,
        solution: raw.solution.unwrap_or_default(),
        tags: raw.tags.unwrap_or_default(),
    }
}

impl From<Problem> for Value {
    fn from(problem: Problem) -> Self {
        json!({
            "id": problem.id,
            "topic": problem.topic,
            "difficulty": problem.difficulty,
            "question": problem.question,
            "answer": problem.answer,
            "options": problem.options,
            "solution": problem.solution,
            "tags": problem.tags,
        })
    }
}

fn value_to_text(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text),
        other => Some(other.to_string()),
    }
}

fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(value_to_text))
}

fn lenient_list<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(Value::Null) => None,
        Some(Value::Array(items)) => Some(
            items
                .into_iter()
                .map(|item| value_to_text(item).unwrap_or_default())
                .collect(),
        ),
        Some(other) => value_to_text(other).map(|text| vec![text]),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(options: &[&str], answer: &str) -> RawProblem {
        RawProblem {
            question: Some("Find $f'(x)$".to_string()),
            options: Some(options.iter().map(|o| o.to_string()).collect()),
            answer: Some(answer.to_string()),
            solution: Some("s".to_string()),
            tags: None,
        }
    }

    #[test]
    fn correct_option_moves_to_front() {
        for (letter, index) in [("A", 0), ("B", 1), ("C", 2), ("D", 3)] {
            let original = ["w", "x", "y", "z"];
            let problem = normalize(raw(&original, letter), "limits", "L1", 1);

            assert_eq!(problem.answer, "A");
            assert_eq!(problem.options[0], original[index]);

            let mut rest: Vec<&str> = original.to_vec();
            rest.remove(index);
            assert_eq!(&problem.options[1..], rest.as_slice());
        }
    }

    #[test]
    fn answer_letter_is_case_insensitive() {
        let problem = normalize(raw(&["w", "x", "y", "z"], " c "), "limits", "L1", 1);
        assert_eq!(problem.options, vec!["y", "w", "x", "z"]);
        assert_eq!(problem.answer, "A");
    }

    #[test]
    fn out_of_range_answer_passes_options_through() {
        let problem = normalize(raw(&["w", "x", "y"], "D"), "limits", "L1", 1);
        assert_eq!(problem.options, vec!["w", "x", "y"]);
        assert_eq!(problem.answer, "A");

        let problem = normalize(raw(&["w", "x", "y", "z"], "E"), "limits", "L1", 1);
        assert_eq!(problem.options, vec!["w", "x", "y", "z"]);
        assert_eq!(problem.answer, "A");
    }

    #[test]
    fn extra_options_are_truncated_after_rotation() {
        let problem = normalize(raw(&["a", "b", "c", "d", "e"], "D"), "limits", "L1", 1);
        assert_eq!(problem.options, vec!["d", "a", "b", "c"]);
    }

    #[test]
    fn missing_fields_get_defaults() {
        let problem = normalize(RawProblem::default(), "integrals", "L2", 42);
        assert_eq!(problem.id, "p42");
        assert_eq!(problem.answer, "A");
        assert!(problem.options.is_empty());
        assert!(problem.tags.is_empty());
        assert_eq!(problem.question, "");
        assert_eq!(problem.solution, "");
    }

    #[test]
    fn single_raw_record_normalizes_into_first_bank_entry() {
        let candidate: RawProblem = serde_json::from_value(json!({
            "question": "$x$",
            "options": ["B", "A", "C", "D"],
            "answer": "B",
            "solution": "s",
            "tags": ["t"]
        }))
        .unwrap();

        let problem = normalize(candidate, "limits", "L1", 1);

        assert_eq!(
            Value::from(problem),
            json!({
                "id": "p1",
                "topic": "limits",
                "difficulty": "L1",
                "question": "$x$",
                "answer": "A",
                "options": ["A", "B", "C", "D"],
                "solution": "s",
                "tags": ["t"]
            })
        );
    }

    #[test]
    fn raw_values_of_the_wrong_type_are_stringified() {
        let candidate: RawProblem = serde_json::from_value(json!({
            "question": "q",
            "options": [1, 2.5, "x", null],
            "answer": "a",
            "tags": "calculus"
        }))
        .unwrap();

        assert_eq!(
            candidate.options,
            Some(vec![
                "1".to_string(),
                "2.5".to_string(),
                "x".to_string(),
                String::new()
            ])
        );
        assert_eq!(candidate.tags, Some(vec!["calculus".to_string()]));
        assert_eq!(candidate.solution, None);
    }

    #[test]
    fn answer_index_accepts_only_four_letters() {
        assert_eq!(answer_index("A"), Some(0));
        assert_eq!(answer_index("d"), Some(3));
        assert_eq!(answer_index("E"), None);
        assert_eq!(answer_index("AB"), None);
        assert_eq!(answer_index(""), None);
    }
}

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Value, json};
