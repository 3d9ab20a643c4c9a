//! Structured output parsing
//!
//! Personas are instructed to reply with a bare JSON object, but models
//! habitually wrap it in code fences or prose. The parser peels fences,
//! then falls back to the outermost brace pair before giving up.

use serde_json::Value;

/// Parse an assistant reply as a structured JSON object
pub fn parse_structured_output(text: &str) -> Result<Value, String> {
    let trimmed = text.trim();

    // Direct parse first
    if let Ok(value) = serde_json::from_str::<Value>(trimmed)
        && value.is_object()
    {
        return Ok(value);
    }

    // Peel a markdown code fence
    if let Some(inner) = strip_code_fence(trimmed)
        && let Ok(value) = serde_json::from_str::<Value>(inner)
        && value.is_object()
    {
        return Ok(value);
    }

    // Outermost brace pair
    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}'))
        && start < end
        && let Ok(value) = serde_json::from_str::<Value>(&trimmed[start..=end])
        && value.is_object()
    {
        return Ok(value);
    }

    Err("reply is not a JSON object".to_string())
}

fn strip_code_fence(text: &str) -> Option<&str> {
    let rest = text.strip_prefix("```")?;
    // Skip an optional language tag on the fence line
    let rest = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    let end = rest.rfind("```")?;
    Some(rest[..end].trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare_json() {
        let value = parse_structured_output(r#"{"approved": true}"#).unwrap();
        assert_eq!(value["approved"], true);
    }

    #[test]
    fn test_parse_fenced_json() {
        let text = "```json\n{\"approved\": true, \"design\": \"x\"}\n```";
        let value = parse_structured_output(text).unwrap();
        assert_eq!(value["design"], "x");
    }

    #[test]
    fn test_parse_json_with_surrounding_prose() {
        let text = "Here is my final answer:\n{\"passed\": false, \"issues\": []}\nLet me know.";
        let value = parse_structured_output(text).unwrap();
        assert_eq!(value["passed"], false);
    }

    #[test]
    fn test_parse_rejects_non_object() {
        assert!(parse_structured_output("[1, 2, 3]").is_err());
        assert!(parse_structured_output("just some text").is_err());
        assert!(parse_structured_output("42").is_err());
    }

    #[test]
    fn test_parse_rejects_malformed_json() {
        assert!(parse_structured_output("{\"approved\": }").is_err());
    }
}
