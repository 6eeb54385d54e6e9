//! Secret redaction for log output

use regex::{Captures, Regex};
use serde_json::Value;
use std::sync::OnceLock;

/// Replacement written in place of a secret value
pub const REDACTED: &str = "********";

const SECRET_WORDS: &[&str] = &["password", "pwd", "key", "secret", "god"];

/// Keys that look secret but only name a credential
const WHITELIST: &[&str] = &["ssh_key", "key_pair", "ssh_key_name"];

const SECRET_LINE_PATTERN: &str = r"(\s*(\S*(password|pwd|key|secret|god)\S*)\s*:\s*)\S+";

fn secret_line() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(SECRET_LINE_PATTERN).ok())
        .as_ref()
}

/// Whether values stored under `key` must never be logged
pub fn is_secret_key(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    !WHITELIST.contains(&key.as_str()) && SECRET_WORDS.iter().any(|word| key.contains(word))
}

/// Mask `key: value` pairs whose key looks like a secret
pub fn redact_secrets(line: &str) -> String {
    let Some(pattern) = secret_line() else {
        return line.to_string();
    };
    pattern
        .replace_all(line, |caps: &Captures| {
            let key = caps.get(2).map_or("", |m| m.as_str());
            if WHITELIST.contains(&key) {
                caps[0].to_string()
            } else {
                format!("{}{}", &caps[1], REDACTED)
            }
        })
        .into_owned()
}

/// Copy of `value` with every secret-keyed entry masked, at any depth
pub fn redact_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, inner)| {
                    let masked = if is_secret_key(key) && !inner.is_null() {
                        Value::String(REDACTED.to_string())
                    } else {
                        redact_value(inner)
                    };
                    (key.clone(), masked)
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(redact_value).collect()),
        other => other.clone(),
    }
}
