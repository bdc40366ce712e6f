//! Merging of parallel contributions
//!
//! Results arrive in agent-priority order. Object fields claimed by
//! several agents go to the most confident one (earlier priority wins
//! ties). Text answers are concatenated in priority order; when object
//! contributions are present the text lands under [`TEXT_FIELD`]. Other
//! scalar or array answers are kept under the contributing agent's id.

use crate::types::AgentResult;
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Field holding concatenated text when objects were also contributed
pub const TEXT_FIELD: &str = "text";

const TEXT_SEPARATOR: &str = "\n\n";

/// Merge contributing results, given in priority order
#[must_use]
pub fn merge(results: &[&AgentResult]) -> Value {
    let mut fields = Map::new();
    let mut owners: HashMap<String, f64> = HashMap::new();
    let mut texts: Vec<&str> = Vec::new();
    let mut others = Map::new();

    for result in results.iter().filter(|r| r.contributes()) {
        match &result.payload {
            Value::Object(object) => {
                for (key, value) in object {
                    if value.is_null() {
                        continue;
                    }
                    let wins = owners
                        .get(key)
                        .map_or(true, |held| result.confidence > *held);
                    if wins {
                        owners.insert(key.clone(), result.confidence);
                        fields.insert(key.clone(), value.clone());
                    }
                }
            }
            Value::String(text) => {
                if !text.trim().is_empty() {
                    texts.push(text);
                }
            }
            Value::Null => {}
            other => {
                others.insert(result.agent_id.clone(), other.clone());
            }
        }
    }

    if fields.is_empty() && others.is_empty() {
        return if texts.is_empty() {
            Value::Null
        } else {
            Value::String(texts.join(TEXT_SEPARATOR))
        };
    }

    if !texts.is_empty() {
        let mut joined = Vec::with_capacity(texts.len() + 1);
        if let Some(Value::String(existing)) = fields.get(TEXT_FIELD) {
            joined.push(existing.as_str());
        }
        joined.extend(texts);
        let text = joined.join(TEXT_SEPARATOR);
        fields.insert(TEXT_FIELD.to_string(), Value::String(text));
    }

    for (agent_id, value) in others {
        fields.entry(agent_id).or_insert(value);
    }

    Value::Object(fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn result(agent: &str, payload: Value, confidence: f64) -> AgentResult {
        AgentResult::success(agent, payload).with_confidence(confidence)
    }

    #[test]
    fn test_highest_confidence_wins_conflicts() {
        let a = result("a", json!({"pace": "5:30", "volume": 40}), 0.6);
        let b = result("b", json!({"pace": "5:10", "focus": "tempo"}), 0.9);

        let merged = merge(&[&a, &b]);
        assert_eq!(merged, json!({"pace": "5:10", "volume": 40, "focus": "tempo"}));
    }

    #[test]
    fn test_ties_go_to_priority_order() {
        let a = result("a", json!({"pace": "5:30"}), 0.8);
        let b = result("b", json!({"pace": "5:10"}), 0.8);
        assert_eq!(merge(&[&a, &b]), json!({"pace": "5:30"}));
    }

    #[test]
    fn test_text_concatenated_in_order() {
        let a = result("a", json!("Run easy."), 0.5);
        let b = result("b", json!("Eat carbs."), 0.9);
        assert_eq!(merge(&[&a, &b]), json!("Run easy.\n\nEat carbs."));
    }

    #[test]
    fn test_mixed_payloads() {
        let a = result("a", json!({"plan": "intervals"}), 0.5);
        let b = result("b", json!("Sleep more."), 0.9);
        let c = result("c", json!(42), 0.9);

        assert_eq!(
            merge(&[&a, &b, &c]),
            json!({"plan": "intervals", "text": "Sleep more.", "c": 42})
        );
    }

    #[test]
    fn test_non_contributing_results_ignored() {
        let ok = result("ok", json!("fine"), 0.4);
        let failed = AgentResult::failure("bad", "boom");
        let slow = AgentResult::timed_out("slow", std::time::Duration::from_millis(5));

        assert_eq!(merge(&[&failed, &ok, &slow]), json!("fine"));
        assert_eq!(merge(&[&failed]), Value::Null);
    }
}
