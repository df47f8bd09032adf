//! Shape normalisation of parsed model responses into [`QaRecord`]s.
//!
//! Models asked for "a JSON array of objects" answer in several shapes
//! anyway. This module recognises a closed set of them:
//!
//! | Shape                                   | Result                      |
//! |-----------------------------------------|-----------------------------|
//! | `[{question, answer}, …]`               | monolingual records         |
//! | `[{question_en, answer_en, …_zh?}, …]`  | bilingual records           |
//! | `{questions: [...], answers: [...]}`    | zipped positionally         |
//! | `{qa_pairs: [{q, a} \| {question, answer}]}` | non-empty pairs only  |
//! | `{question, answer}`                    | one record                  |
//!
//! Anything else yields no records. No input makes this panic.

use crate::output::QaRecord;
use serde_json::{Map, Value};

/// The recognised top-level response shapes.
#[derive(Debug)]
enum Shape<'a> {
    RecordArray(&'a [Value]),
    ParallelArrays {
        questions: &'a [Value],
        answers: &'a [Value],
    },
    QaPairs(&'a [Value]),
    Flat {
        question: &'a Value,
        answer: &'a Value,
    },
    Unrecognised,
}

impl<'a> Shape<'a> {
    fn classify(value: &'a Value) -> Self {
        match value {
            Value::Array(items) => Shape::RecordArray(items),
            Value::Object(obj) => {
                if let (Some(Value::Array(q)), Some(Value::Array(a))) =
                    (obj.get("questions"), obj.get("answers"))
                {
                    return Shape::ParallelArrays {
                        questions: q,
                        answers: a,
                    };
                }
                if let Some(Value::Array(pairs)) = obj.get("qa_pairs") {
                    return Shape::QaPairs(pairs);
                }
                match (obj.get("question"), obj.get("answer")) {
                    (Some(question), Some(answer)) => Shape::Flat { question, answer },
                    _ => Shape::Unrecognised,
                }
            }
            _ => Shape::Unrecognised,
        }
    }
}

/// Convert one parsed response into records.
pub fn normalize(value: &Value) -> Vec<QaRecord> {
    match Shape::classify(value) {
        Shape::RecordArray(items) => items.iter().filter_map(array_element).collect(),
        Shape::ParallelArrays { questions, answers } => questions
            .iter()
            .zip(answers)
            .map(|(q, a)| {
                QaRecord::monolingual(unwrap_field(q, "question"), unwrap_field(a, "answer"))
            })
            .collect(),
        Shape::QaPairs(pairs) => pairs.iter().filter_map(qa_pair).collect(),
        Shape::Flat { question, answer } => {
            vec![QaRecord::monolingual(render(question), render(answer))]
        }
        Shape::Unrecognised => Vec::new(),
    }
}

fn array_element(item: &Value) -> Option<QaRecord> {
    let obj = item.as_object()?;
    if let (Some(q), Some(a)) = (obj.get("question"), obj.get("answer")) {
        return Some(QaRecord::monolingual(render(q), render(a)));
    }
    if let (Some(q), Some(a)) = (obj.get("question_en"), obj.get("answer_en")) {
        return Some(QaRecord::bilingual(
            render(q),
            render(a),
            optional(obj, "question_zh"),
            optional(obj, "answer_zh"),
        ));
    }
    None
}

fn qa_pair(item: &Value) -> Option<QaRecord> {
    let obj = item.as_object()?;
    let q = first_non_empty(obj, &["q", "question"])?;
    let a = first_non_empty(obj, &["a", "answer"])?;
    Some(QaRecord::monolingual(q, a))
}

/// First key whose rendered value is non-empty.
fn first_non_empty(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| obj.get(*k).map(render))
        .find(|s| !s.is_empty())
}

/// `{"question": "…"}` → its field; anything else → rendered as-is.
fn unwrap_field(value: &Value, key: &str) -> String {
    match value.as_object().and_then(|o| o.get(key)) {
        Some(inner) => render(inner),
        None => render(value),
    }
}

fn optional(obj: &Map<String, Value>, key: &str) -> String {
    obj.get(key).map(render).unwrap_or_default()
}

/// Strings verbatim, `null` as empty, other scalars as their JSON text.
fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::QaContent;
    use serde_json::json;

    #[test]
    fn test_array_of_pairs() {
        let v = json!([
            {"question": "Q1", "answer": "A1"},
            {"question": "Q2", "answer": "A2"}
        ]);
        let r = normalize(&v);
        assert_eq!(r.len(), 2);
        assert_eq!(r[1], QaRecord::monolingual("Q2", "A2"));
    }

    #[test]
    fn test_array_of_bilingual_defaults_missing_zh() {
        let v = json!([
            {"question_en": "Q", "answer_en": "A", "question_zh": "问", "answer_zh": "答"},
            {"question_en": "Q2", "answer_en": "A2"}
        ]);
        let r = normalize(&v);
        assert_eq!(r.len(), 2);
        assert_eq!(r[0], QaRecord::bilingual("Q", "A", "问", "答"));
        match &r[1].content {
            QaContent::Bilingual { question_zh, answer_zh, .. } => {
                assert_eq!(question_zh, "");
                assert_eq!(answer_zh, "");
            }
            other => panic!("expected bilingual, got {other:?}"),
        }
    }

    #[test]
    fn test_array_skips_unrecognised_elements() {
        let v = json!([{"question": "Q", "answer": "A"}, "stray", 3, {"foo": 1}]);
        assert_eq!(normalize(&v).len(), 1);
    }

    #[test]
    fn test_parallel_arrays_zip_and_unwrap() {
        let v = json!({
            "questions": [{"question": "Q1"}, "Q2", "Q3"],
            "answers": ["A1", {"answer": "A2"}]
        });
        let r = normalize(&v);
        assert_eq!(r.len(), 2);
        assert_eq!(r[0], QaRecord::monolingual("Q1", "A1"));
        assert_eq!(r[1], QaRecord::monolingual("Q2", "A2"));
    }

    #[test]
    fn test_qa_pairs_short_and_long_keys() {
        let v = json!({"qa_pairs": [
            {"q": "Q1", "a": "A1"},
            {"question": "Q2", "answer": "A2"},
            {"q": "", "a": "A3"},
            {"q": "Q4"}
        ]});
        let r = normalize(&v);
        assert_eq!(r.len(), 2);
    }

    #[test]
    fn test_qa_pairs_empty_short_key_falls_back_to_long() {
        let v = json!({"qa_pairs": [
            {"q": "", "question": "Q1", "a": "A1"},
            {"q": "Q2", "a": null, "answer": "A2"},
            {"q": "", "question": "", "a": "A3"}
        ]});
        assert_eq!(
            normalize(&v),
            vec![
                QaRecord::monolingual("Q1", "A1"),
                QaRecord::monolingual("Q2", "A2"),
            ]
        );
    }

    #[test]
    fn test_flat_object() {
        let v = json!({"question": "Q", "answer": 42});
        assert_eq!(normalize(&v), vec![QaRecord::monolingual("Q", "42")]);
    }

    #[test]
    fn test_parallel_arrays_take_precedence() {
        let v = json!({
            "questions": ["Q1"], "answers": ["A1"],
            "qa_pairs": [{"q": "X", "a": "Y"}, {"q": "X2", "a": "Y2"}],
            "question": "Z", "answer": "W"
        });
        assert_eq!(normalize(&v), vec![QaRecord::monolingual("Q1", "A1")]);
    }

    #[test]
    fn test_unrecognised_shapes_are_empty() {
        for v in [
            json!(null),
            json!(true),
            json!(7),
            json!("just a string"),
            json!({}),
            json!({"data": [1, 2]}),
            json!({"questions": "not an array", "answers": []}),
        ] {
            assert!(normalize(&v).is_empty(), "expected empty for {v}");
        }
    }

    #[test]
    fn test_metadata_starts_empty() {
        let r = normalize(&json!([{"question": "Q", "answer": "A"}]));
        assert!(r[0].metadata.is_empty());
    }
}
