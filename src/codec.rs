// Serialized form of the task list
//
// The stored value is a JSON array of `{"id", "text", "completed"}` objects
// with no schema version.

use crate::task::{Task, TaskId};
use eyre::{Context, Result, eyre};
use serde_json::Value;
use std::collections::HashSet;
use tracing::warn;

/// Result of decoding a stored task list
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Decoded {
    pub tasks: Vec<Task>,
    /// Elements dropped because they were malformed, empty or duplicated
    pub skipped: usize,
}

/// Serialize the full collection
pub fn encode(tasks: &[Task]) -> Result<String> {
    serde_json::to_string(tasks).context("Failed to serialize task list")
}

/// Parse a stored collection
///
/// Fails only when the value is not a JSON array at all. Individual elements
/// that do not describe a valid task are skipped with a warning so that one
/// bad entry does not cost the rest of the list.
pub fn decode(raw: &str) -> Result<Decoded> {
    let value: Value = serde_json::from_str(raw).context("Stored task list is not valid JSON")?;
    let items = match value {
        Value::Array(items) => items,
        other => {
            return Err(eyre!(
                "Stored task list is not a JSON array (found {})",
                json_kind(&other)
            ));
        }
    };

    let mut decoded = Decoded::default();
    let mut seen: HashSet<TaskId> = HashSet::with_capacity(items.len());

    for (index, item) in items.into_iter().enumerate() {
        let task: Task = match serde_json::from_value(item) {
            Ok(t) => t,
            Err(e) => {
                warn!(index, error = ?e, "Failed to parse task, skipping");
                decoded.skipped += 1;
                continue;
            }
        };

        if task.text.trim().is_empty() {
            warn!(index, id = task.id, "Task has empty text, skipping");
            decoded.skipped += 1;
            continue;
        }

        if !seen.insert(task.id) {
            warn!(index, id = task.id, "Duplicate task id, skipping");
            decoded.skipped += 1;
            continue;
        }

        decoded.tasks.push(task);
    }

    Ok(decoded)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<Task> {
        vec![
            Task {
                id: 1000,
                text: "buy milk".to_string(),
                completed: true,
            },
            Task {
                id: 1001,
                text: "walk \"the\" dog ✓".to_string(),
                completed: false,
            },
        ]
    }

    #[test]
    fn test_encode_format() {
        let json = encode(&sample()[..1]).unwrap();
        assert_eq!(json, r#"[{"id":1000,"text":"buy milk","completed":true}]"#);
        assert_eq!(encode(&[]).unwrap(), "[]");
    }

    #[test]
    fn test_decode_reproduces_encoded_tasks() {
        let tasks = sample();
        let decoded = decode(&encode(&tasks).unwrap()).unwrap();
        assert_eq!(decoded.tasks, tasks);
        assert_eq!(decoded.skipped, 0);
    }

    #[test]
    fn test_decode_preserves_order() {
        let raw = r#"[
            {"id":30,"text":"c","completed":false},
            {"id":10,"text":"a","completed":false},
            {"id":20,"text":"b","completed":true}
        ]"#;
        let ids: Vec<TaskId> = decode(raw).unwrap().tasks.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![30, 10, 20]);
    }

    #[test]
    fn test_decode_rejects_non_array() {
        assert!(decode(r#"{"id":1}"#).is_err());
        assert!(decode("null").is_err());
        assert!(decode("{malformed json}").is_err());
        assert!(decode("").is_err());
    }

    #[test]
    fn test_decode_skips_malformed_elements() {
        let raw = r#"[
            {"id":1,"text":"valid","completed":false},
            {"id":"two","text":"bad id","completed":false},
            {"text":"missing id","completed":false},
            42,
            {"id":5,"text":"also valid","completed":true}
        ]"#;

        let decoded = decode(raw).unwrap();
        assert_eq!(decoded.tasks.len(), 2);
        assert_eq!(decoded.tasks[0].text, "valid");
        assert_eq!(decoded.tasks[1].text, "also valid");
        assert_eq!(decoded.skipped, 3);
    }

    #[test]
    fn test_decode_skips_blank_text_and_duplicate_ids() {
        let raw = r#"[
            {"id":1,"text":"first","completed":false},
            {"id":2,"text":"   ","completed":false},
            {"id":1,"text":"dup","completed":true}
        ]"#;

        let decoded = decode(raw).unwrap();
        assert_eq!(decoded.tasks.len(), 1);
        assert_eq!(decoded.tasks[0].text, "first");
        assert_eq!(decoded.skipped, 2);
    }

    #[test]
    fn test_decode_ignores_unknown_fields() {
        let raw = r#"[{"id":1,"text":"a","completed":false,"color":"red"}]"#;
        let decoded = decode(raw).unwrap();
        assert_eq!(decoded.tasks, vec![Task::new(1, "a")]);
    }
}
