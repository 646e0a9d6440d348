//! Tolerant JSON extraction from raw planner output.
//!
//! Planners wrap JSON in prose more often than not. Try the whole text
//! first; failing that, scan for the first balanced object, tracking string
//! and escape state so braces inside strings do not count.

use serde_json::Value;

/// How the object was obtained, reported in advisory metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseMode {
    /// The whole text parsed as a JSON object.
    Full,
    /// A balanced object was carved out of surrounding text.
    Extracted,
    /// Input was empty.
    Empty,
    /// No opening brace at all.
    None,
    /// A balanced candidate was found but did not parse.
    InvalidExtracted,
    /// Never reached balance (unterminated object or string).
    Invalid,
}

impl ParseMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParseMode::Full => "full",
            ParseMode::Extracted => "extracted",
            ParseMode::Empty => "empty",
            ParseMode::None => "none",
            ParseMode::InvalidExtracted => "invalid_extracted",
            ParseMode::Invalid => "invalid",
        }
    }
}

/// Extract the first JSON object from `raw_text`.
pub fn extract_json_object(raw_text: &str) -> (Option<Value>, ParseMode) {
    let text = raw_text.trim();
    if text.is_empty() {
        return (None, ParseMode::Empty);
    }

    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(text) {
        return (Some(Value::Object(map)), ParseMode::Full);
    }

    let Some(start) = text.find('{') else {
        return (None, ParseMode::None);
    };

    let mut in_string = false;
    let mut escaped = false;
    let mut depth = 0usize;
    for (offset, ch) in text[start..].char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    let candidate = &text[start..start + offset + ch.len_utf8()];
                    return match serde_json::from_str::<Value>(candidate) {
                        Ok(Value::Object(map)) => (Some(Value::Object(map)), ParseMode::Extracted),
                        _ => (None, ParseMode::InvalidExtracted),
                    };
                }
            }
            _ => {}
        }
    }
    (None, ParseMode::Invalid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn whole_text_object() {
        let (value, mode) = extract_json_object(r#"{"a": 1}"#);
        assert_eq!(value, Some(json!({"a": 1})));
        assert_eq!(mode, ParseMode::Full);
    }

    #[test]
    fn object_with_surrounding_prose() {
        let (value, mode) =
            extract_json_object(r#"Sure, here is the plan: {"a": {"b": 2}} hope that helps"#);
        assert_eq!(value, Some(json!({"a": {"b": 2}})));
        assert_eq!(mode, ParseMode::Extracted);
    }

    #[test]
    fn braces_inside_strings_do_not_count() {
        let (value, mode) = extract_json_object(r#"noise {"text": "}{ brace soup }{"} tail"#);
        assert_eq!(value, Some(json!({"text": "}{ brace soup }{"})));
        assert_eq!(mode, ParseMode::Extracted);
    }

    #[test]
    fn escaped_quotes_inside_strings() {
        let (value, mode) = extract_json_object(r#"{"text": "he said \"}\" loudly"}"#);
        assert_eq!(value, Some(json!({"text": "he said \"}\" loudly"})));
        assert_eq!(mode, ParseMode::Full);
    }

    #[test]
    fn empty_input() {
        assert_eq!(extract_json_object("   ").1, ParseMode::Empty);
    }

    #[test]
    fn no_brace_at_all() {
        assert_eq!(extract_json_object("this is not valid json").1, ParseMode::None);
    }

    #[test]
    fn unterminated_object() {
        assert_eq!(extract_json_object(r#"{"a": 1"#).1, ParseMode::Invalid);
    }

    #[test]
    fn unterminated_string() {
        assert_eq!(extract_json_object(r#"{"a": "runaway}"#).1, ParseMode::Invalid);
    }

    #[test]
    fn balanced_but_invalid_candidate() {
        assert_eq!(
            extract_json_object("{not json at all}").1,
            ParseMode::InvalidExtracted
        );
    }

    #[test]
    fn top_level_array_is_not_an_object() {
        // An array parses, but only objects are acceptable; scanning finds
        // the first embedded object instead.
        let (value, mode) = extract_json_object(r#"[{"a": 1}]"#);
        assert_eq!(value, Some(json!({"a": 1})));
        assert_eq!(mode, ParseMode::Extracted);
    }
}
