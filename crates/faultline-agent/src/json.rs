//! Pulling a JSON object out of free-form model text.

use serde_json::Value;

/// Parse the first balanced `{...}` span in `text`, falling back to parsing
/// the whole trimmed text.
///
/// Braces inside string literals are ignored when balancing.
pub fn extract_json_object(text: &str) -> Option<Value> {
    if let Some(span) = first_balanced_span(text) {
        if let Ok(value) = serde_json::from_str(span) {
            return Some(value);
        }
    }
    serde_json::from_str(text.trim()).ok()
}

fn first_balanced_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Render a JSON value as plain text: strings verbatim, arrays one item per
/// line, anything else in its JSON form.
pub(crate) fn value_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| value_text(Some(item)))
            .collect::<Vec<_>>()
            .join("\n"),
        Some(other) => other.to_string(),
    }
}

/// Coerce a confidence value into `[0, 1]`, using `default` when it is
/// missing or not numeric.
pub(crate) fn coerce_confidence(value: Option<&Value>, default: f64) -> f64 {
    let parsed = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match parsed {
        Some(c) if c.is_finite() => c.clamp(0.0, 1.0),
        _ => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extracts_from_surrounding_prose() {
        let text = "好的，诊断如下：\n```json\n{\"diagnosis\": \"MySQL 未启动\", \"confidence\": 0.9}\n```\n以上。";
        let value = extract_json_object(text).unwrap();
        assert_eq!(value["diagnosis"], "MySQL 未启动");
    }

    #[test]
    fn test_braces_inside_strings() {
        let text = r#"result: {"root_cause": "bad template {name}", "nested": {"a": "}"}} trailing {"#;
        let value = extract_json_object(text).unwrap();
        assert_eq!(value["root_cause"], "bad template {name}");
        assert_eq!(value["nested"]["a"], "}");
    }

    #[test]
    fn test_escaped_quote_in_string() {
        let text = r#"{"solution": "run \"systemctl start mysqld\" {now}"}"#;
        let value = extract_json_object(text).unwrap();
        assert_eq!(value["solution"], "run \"systemctl start mysqld\" {now}");
    }

    #[test]
    fn test_first_object_wins() {
        let value = extract_json_object(r#"{"a": 1} and {"b": 2}"#).unwrap();
        assert_eq!(value, json!({"a": 1}));
    }

    #[test]
    fn test_falls_back_to_whole_text() {
        assert_eq!(extract_json_object(" [1, 2] "), Some(json!([1, 2])));
        assert_eq!(extract_json_object("0.7"), Some(json!(0.7)));
    }

    #[test]
    fn test_unparsable() {
        assert!(extract_json_object("no json here").is_none());
        assert!(extract_json_object("{ unbalanced").is_none());
        assert!(extract_json_object("{not: valid}").is_none());
    }

    #[test]
    fn test_value_text() {
        assert_eq!(value_text(Some(&json!("x"))), "x");
        assert_eq!(value_text(Some(&json!(["1. a", "2. b"]))), "1. a\n2. b");
        assert_eq!(value_text(Some(&json!(42))), "42");
        assert_eq!(value_text(None), "");
    }

    #[test]
    fn test_coerce_confidence() {
        assert_eq!(coerce_confidence(Some(&json!(0.8)), 0.5), 0.8);
        assert_eq!(coerce_confidence(Some(&json!("0.65")), 0.5), 0.65);
        assert_eq!(coerce_confidence(Some(&json!("high")), 0.5), 0.5);
        assert_eq!(coerce_confidence(None, 0.5), 0.5);
        assert_eq!(coerce_confidence(Some(&json!(1.7)), 0.5), 1.0);
        assert_eq!(coerce_confidence(Some(&json!(-2)), 0.5), 0.0);
    }
}
