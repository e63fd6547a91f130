use thiserror::Error;

/// Model output that could not be read as a JSON object.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Malformed model output: {reason}")]
pub struct NormalizeError {
    pub reason: String,
    pub raw: String,
}

/// Strip one leading fence (with its language tag) and one trailing fence.
/// A fence with no newline after it loses only its backticks.
pub fn strip_code_fences(text: &str) -> &str {
    let mut body = text.trim();
    if let Some(rest) = body.strip_prefix("```") {
        body = match rest.find('\n') {
            Some(newline) => &rest[newline + 1..],
            None => rest,
        };
    }
    if let Some(stripped) = body.trim_end().strip_suffix("```") {
        body = stripped;
    }
    body.trim()
}

/// Strip fences then parse strictly. Only a JSON object is accepted.
pub fn parse_model_json(
    text: &str,
) -> Result<serde_json::Map<String, serde_json::Value>, NormalizeError> {
    let body = strip_code_fences(text);
    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(serde_json::Value::Object(map)) => Ok(map),
        Ok(other) => Err(NormalizeError {
            reason: format!("expected a JSON object, got {}", json_kind(&other)),
            raw: text.to_string(),
        }),
        Err(e) => Err(NormalizeError {
            reason: e.to_string(),
            raw: text.to_string(),
        }),
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fence_free_text_is_unchanged() {
        let text = r#"{"urgency_score": 40}"#;
        assert_eq!(strip_code_fences(text), text);
        assert_eq!(strip_code_fences(strip_code_fences(text)), text);
    }

    #[test]
    fn strips_fence_with_language_tag() {
        let text = "```json\n{\"a\": 1}\n```";
        assert_eq!(strip_code_fences(text), "{\"a\": 1}");
    }

    #[test]
    fn strips_bare_fence_and_surrounding_whitespace() {
        let text = "  \n```\n{\"a\": 1}\n```  \n";
        assert_eq!(strip_code_fences(text), "{\"a\": 1}");
    }

    #[test]
    fn only_one_trailing_fence_is_removed() {
        assert_eq!(strip_code_fences("```\nx``````"), "x```");
    }

    #[test]
    fn single_line_fenced_object_parses() {
        assert_eq!(strip_code_fences("```{\"a\": 1}```"), "{\"a\": 1}");
        let map = parse_model_json("```{\"urgency_score\": 92}```").unwrap();
        assert_eq!(map["urgency_score"], 92);
    }

    #[test]
    fn parses_fenced_object() {
        let map = parse_model_json("```json\n{\"urgency_score\": 92}\n```").unwrap();
        assert_eq!(map["urgency_score"], 92);
    }

    #[test]
    fn malformed_output_keeps_raw_text() {
        let err = parse_model_json("Sorry, I cannot help with that.").unwrap_err();
        assert_eq!(err.raw, "Sorry, I cannot help with that.");
        assert!(!err.reason.is_empty());
    }

    #[test]
    fn non_object_json_is_rejected() {
        let err = parse_model_json("[1, 2, 3]").unwrap_err();
        assert!(err.reason.contains("array"));
        assert!(parse_model_json("").is_err());
    }
}
