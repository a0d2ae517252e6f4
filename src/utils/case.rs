use serde_json::{Map, Value};

pub fn to_snake_case(key: &str) -> String {
    let chars: Vec<char> = key.trim().chars().collect();
    let mut out = String::with_capacity(chars.len() + 4);
    for (idx, &ch) in chars.iter().enumerate() {
        if ch == '-' || ch == ' ' || ch == '_' {
            if !out.is_empty() && !out.ends_with('_') {
                out.push('_');
            }
            continue;
        }
        if ch.is_uppercase() {
            let prev = idx.checked_sub(1).map(|i| chars[i]);
            let next = chars.get(idx + 1).copied();
            let boundary = match prev {
                Some(p) if p.is_lowercase() || p.is_ascii_digit() => true,
                Some(p) if p.is_uppercase() => next.map(|n| n.is_lowercase()).unwrap_or(false),
                _ => false,
            };
            if boundary && !out.is_empty() && !out.ends_with('_') {
                out.push('_');
            }
            out.extend(ch.to_lowercase());
        } else {
            out.push(ch);
        }
    }
    while out.ends_with('_') {
        out.pop();
    }
    out
}

/// Recursively rewrites object keys to snake_case. Array order is kept and no
/// entry is dropped: when two keys collapse to the same name, the later one
/// keeps its upstream spelling.
pub fn normalize_keys(value: &Value) -> Value {
    match value {
        Value::Array(items) => Value::Array(items.iter().map(normalize_keys).collect()),
        Value::Object(map) => {
            let mut out = Map::new();
            let mut renamed = Vec::new();
            for (key, entry) in map {
                let normalized = to_snake_case(key);
                if normalized == *key || normalized.is_empty() {
                    out.insert(key.clone(), normalize_keys(entry));
                } else {
                    renamed.push((key, normalized, entry));
                }
            }
            for (key, normalized, entry) in renamed {
                let target = if out.contains_key(&normalized) {
                    key.clone()
                } else {
                    normalized
                };
                out.insert(target, normalize_keys(entry));
            }
            Value::Object(out)
        }
        _ => value.clone(),
    }
}
