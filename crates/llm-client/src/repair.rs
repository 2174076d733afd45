//! Recovery for almost-JSON model output.
//!
//! Models wrap payloads in markdown fences, prepend prose, truncate the
//! tail of arrays, and leave strings unterminated. The mechanical pass
//! here fixes exactly those shapes; anything beyond it goes back to the
//! model as a repair prompt, and past that the caller degrades.

use serde_json::Value;

/// Parse model output as JSON, applying the mechanical repair ladder on
/// failure. Returns `None` only when the payload is beyond mechanical
/// recovery.
pub fn parse_or_repair(text: &str) -> Option<Value> {
    let stripped = strip_code_fences(text);
    if let Ok(value) = serde_json::from_str::<Value>(stripped.trim()) {
        return Some(value);
    }

    let body = isolate_json(&stripped)?;
    if let Ok(value) = serde_json::from_str::<Value>(&body) {
        return Some(value);
    }

    let repaired = close_open_structures(&trim_trailing_commas(&body));
    serde_json::from_str(&repaired).ok()
}

/// Drop markdown code fences around the payload.
pub fn strip_code_fences(text: &str) -> String {
    let trimmed = text.trim();
    let mut out = trimmed.strip_prefix("```json").unwrap_or(trimmed);
    out = out.strip_prefix("```").unwrap_or(out);
    out = out.strip_suffix("```").unwrap_or(out);
    out.trim().to_string()
}

/// Slice from the first opening bracket; prose before the payload is the
/// most common corruption.
fn isolate_json(text: &str) -> Option<String> {
    let start = text.find(['{', '['])?;
    Some(text[start..].trim().to_string())
}

fn trim_trailing_commas(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_comma: Option<usize> = None;
    let mut in_string = false;
    let mut escaped = false;

    for ch in text.chars() {
        if in_string {
            out.push(ch);
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => {
                in_string = true;
                pending_comma = None;
                out.push(ch);
            }
            ',' => {
                pending_comma = Some(out.len());
                out.push(ch);
            }
            '}' | ']' => {
                if let Some(pos) = pending_comma.take() {
                    out.replace_range(pos..pos + 1, "");
                }
                out.push(ch);
            }
            c if c.is_whitespace() => out.push(c),
            _ => {
                pending_comma = None;
                out.push(ch);
            }
        }
    }
    out
}

/// Close an unterminated trailing string and any unbalanced containers,
/// the classic truncated-response shape.
fn close_open_structures(text: &str) -> String {
    let mut stack: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for ch in text.chars() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                if stack.last() == Some(&ch) {
                    stack.pop();
                }
            }
            _ => {}
        }
    }

    let mut out = text.trim_end().to_string();
    if in_string {
        out.push('"');
    }
    // A dangling comma before the closers re-breaks the parse.
    while out.ends_with(',') {
        out.pop();
    }
    while let Some(closer) = stack.pop() {
        out.push(closer);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passes_valid_json() {
        let v = parse_or_repair(r#"["a", "b"]"#).unwrap();
        assert_eq!(v.as_array().unwrap().len(), 2);
    }

    #[test]
    fn strips_fences() {
        let v = parse_or_repair("```json\n{\"score\": 90}\n```").unwrap();
        assert_eq!(v["score"], 90);
    }

    #[test]
    fn drops_leading_prose() {
        let v = parse_or_repair("Here is the result:\n[\"x\"]").unwrap();
        assert_eq!(v[0], "x");
    }

    #[test]
    fn closes_truncated_array() {
        let v = parse_or_repair(r#"{"issues": ["first", "second"#).unwrap();
        assert_eq!(v["issues"][1], "second");
    }

    #[test]
    fn removes_trailing_commas() {
        let v = parse_or_repair(r#"{"a": 1, "b": [1, 2,],}"#).unwrap();
        assert_eq!(v["b"][1], 2);
    }

    #[test]
    fn gives_up_on_garbage() {
        assert!(parse_or_repair("no json here at all").is_none());
    }
}
