use crate::utils::text::truncate_utf8_prefix;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

const KEY_REDACTION: &str = "[REDACTED]";
const INLINE_REDACTION: &str = "***REDACTED***";

const SENSITIVE_KEYS: &[&str] = &[
    "authorization",
    "token",
    "api_token",
    "apitoken",
    "access_token",
    "password",
    "secret",
];

static INLINE_PATTERNS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    vec![
        (
            Regex::new(r"\b(Bearer)\s+([A-Za-z0-9._~+/=-]{6,})").expect("bearer regex"),
            "$1 ***REDACTED***",
        ),
        (
            Regex::new(r"\beyJ[a-zA-Z0-9_-]{10,}\.[a-zA-Z0-9_-]{10,}\.[a-zA-Z0-9_-]{10,}\b")
                .expect("jwt regex"),
            INLINE_REDACTION,
        ),
        (
            Regex::new(r#"(?i)\b(token|api[_-]?token|api[_-]?key|password|secret)\b\s*([:=])\s*([^\s"'`,}]+)"#)
                .expect("pair regex"),
            "$1$2***REDACTED***",
        ),
    ]
});

pub fn is_sensitive_key(key: &str) -> bool {
    let normalized = key.trim().to_lowercase();
    if normalized.is_empty() {
        return false;
    }
    SENSITIVE_KEYS.contains(&normalized.as_str())
        || normalized.contains("token")
        || normalized.contains("secret")
}

pub fn redact_text(value: &str, max_bytes: usize, extra_secrets: &[String]) -> String {
    let mut out = value.to_string();
    for (re, replacement) in INLINE_PATTERNS.iter() {
        if re.is_match(&out) {
            out = re.replace_all(&out, *replacement).to_string();
        }
    }
    for raw in extra_secrets {
        let needle = raw.trim();
        if needle.len() < 6 {
            continue;
        }
        out = out.replace(needle, INLINE_REDACTION);
    }
    if out.len() > max_bytes {
        return format!("{}...", truncate_utf8_prefix(&out, max_bytes));
    }
    out
}

pub fn redact_value(value: &Value, max_bytes: usize, extra_secrets: &[String]) -> Value {
    match value {
        Value::String(text) => Value::String(redact_text(text, max_bytes, extra_secrets)),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| redact_value(item, max_bytes, extra_secrets))
                .collect(),
        ),
        Value::Object(map) => {
            let mut out = serde_json::Map::new();
            for (key, entry) in map {
                if is_sensitive_key(key) {
                    out.insert(key.clone(), Value::String(KEY_REDACTION.to_string()));
                } else {
                    out.insert(key.clone(), redact_value(entry, max_bytes, extra_secrets));
                }
            }
            Value::Object(out)
        }
        _ => value.clone(),
    }
}
