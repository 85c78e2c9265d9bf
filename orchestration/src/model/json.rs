//! Locate and decode JSON inside free-form model output.
//!
//! Models wrap JSON in ```json fences, prepend chatter, or return bare
//! JSON. Anything that cannot be located or decoded yields `None`.

use serde::de::DeserializeOwned;

const JSON_FENCE: &str = "```json";
const FENCE: &str = "```";

/// Return the JSON payload embedded in `text`, if any.
pub fn extract_json(text: &str) -> Option<&str> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Some(start) = trimmed.find(JSON_FENCE) {
        let body_start = start + JSON_FENCE.len();
        let end = trimmed.rfind(FENCE)?;
        if end <= start {
            return None;
        }
        return Some(trimmed[body_start..end].trim());
    }

    if let Some(start) = trimmed.find(FENCE) {
        let body_start = start + FENCE.len();
        let end = trimmed.rfind(FENCE)?;
        if end > body_start {
            return Some(trimmed[body_start..end].trim());
        }
    }

    if serde_json::from_str::<serde_json::Value>(trimmed).is_ok() {
        return Some(trimmed);
    }

    // Leading or trailing prose around a bare object/array.
    let open = trimmed.find(['{', '['])?;
    let close_char = if trimmed[open..].starts_with('{') {
        '}'
    } else {
        ']'
    };
    let close = trimmed.rfind(close_char)?;
    if close <= open {
        return None;
    }
    Some(&trimmed[open..=close])
}

/// Extract and deserialize JSON from model output.
pub fn parse_json<T: DeserializeOwned>(text: &str) -> Option<T> {
    let raw = extract_json(text)?;
    serde_json::from_str(raw).ok()
}
