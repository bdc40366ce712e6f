//! Step request construction from run state

use super::definition::InputMapping;
use crate::error::{Error, Result};
use crate::types::Request;
use regex::{Captures, Regex};
use serde_json::{Map, Value};
use std::sync::LazyLock;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{([A-Za-z0-9_.-]+)\}").expect("PLACEHOLDER is a compile-time constant")
});

/// Build the request for a step
///
/// The whole run state is passed as profile facts. A template renders a
/// text prompt; otherwise the selected keys (or all keys) form a structured
/// input. Missing required keys or template placeholders are input errors.
pub fn build_request(run_id: &str, mapping: &InputMapping, state: &Map<String, Value>) -> Result<Request> {
    let missing: Vec<&str> = mapping
        .required
        .iter()
        .filter(|key| state.get(key.as_str()).map_or(true, Value::is_null))
        .map(String::as_str)
        .collect();
    if !missing.is_empty() {
        return Err(Error::InvalidInput(format!(
            "missing required state keys: {}",
            missing.join(", ")
        )));
    }

    let request = match &mapping.template {
        Some(template) => Request::text(run_id, render(template, state)?),
        None => Request::structured(run_id, Value::Object(select(&mapping.keys, state))),
    };

    let request = request.with_profile(state.clone());
    Ok(match &mapping.capability {
        Some(capability) => request.with_capability_hint(capability.as_str()),
        None => request,
    })
}

fn select(keys: &[String], state: &Map<String, Value>) -> Map<String, Value> {
    if keys.is_empty() {
        return state.clone();
    }
    keys.iter()
        .filter_map(|key| state.get(key).map(|v| (key.clone(), v.clone())))
        .collect()
}

/// Render `{key}` placeholders from state
pub fn render(template: &str, state: &Map<String, Value>) -> Result<String> {
    let mut missing = Vec::new();
    let rendered = PLACEHOLDER.replace_all(template, |caps: &Captures<'_>| {
        let key = &caps[1];
        match state.get(key) {
            Some(Value::String(text)) => text.clone(),
            Some(Value::Null) | None => {
                missing.push(key.to_string());
                String::new()
            }
            Some(other) => other.to_string(),
        }
    });

    if !missing.is_empty() {
        return Err(Error::InvalidInput(format!(
            "template placeholders without state: {}",
            missing.join(", ")
        )));
    }
    Ok(rendered.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RequestInput;
    use serde_json::json;

    fn state() -> Map<String, Value> {
        json!({"age": 34, "goal": "5k", "notes": null})
            .as_object()
            .cloned()
            .unwrap()
    }

    #[test]
    fn test_template_rendering() {
        let mapping = InputMapping {
            template: Some("Plan for a {age} year old targeting a {goal}".to_string()),
            capability: Some("training-planning".to_string()),
            ..Default::default()
        };
        let request = build_request("run-1", &mapping, &state()).unwrap();

        assert_eq!(
            request.input,
            RequestInput::Text("Plan for a 34 year old targeting a 5k".to_string())
        );
        assert_eq!(request.session_id, "run-1");
        assert_eq!(request.context.profile["goal"], json!("5k"));
        assert_eq!(
            request.capability_hint.as_ref().map(|c| c.as_str()),
            Some("training-planning")
        );
    }

    #[test]
    fn test_structured_selection() {
        let mapping = InputMapping {
            keys: vec!["goal".to_string(), "unknown".to_string()],
            ..Default::default()
        };
        let request = build_request("run-1", &mapping, &state()).unwrap();
        assert_eq!(request.input, RequestInput::Structured(json!({"goal": "5k"})));

        let all = build_request("run-1", &InputMapping::default(), &Map::new()).unwrap();
        assert_eq!(all.input, RequestInput::Structured(json!({})));
    }

    #[test]
    fn test_missing_required_and_placeholder() {
        let required = InputMapping {
            required: vec!["goal".to_string(), "notes".to_string()],
            ..Default::default()
        };
        let err = build_request("r", &required, &state()).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(msg) if msg.contains("notes")));

        let err = render("Hello {name}", &state()).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(msg) if msg.contains("name")));
    }
}
