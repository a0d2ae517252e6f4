use crate::constants::limits::ERROR_BODY_PREVIEW_BYTES;
use crate::errors::ToolError;
use crate::services::executor::UpstreamBody;
use crate::utils::text::{collapse_whitespace, preview};
use serde_json::Value;

/// What the failed call was about, so the message can name it.
#[derive(Debug, Clone, Default)]
pub struct ClassifyContext {
    pub subject: String,
    pub identifier: Option<String>,
    pub srid: Option<String>,
}

impl ClassifyContext {
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            ..Self::default()
        }
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    pub fn with_srid(mut self, srid: impl Into<String>) -> Self {
        self.srid = Some(srid.into());
        self
    }
}

pub fn classify(status: u16, body: &UpstreamBody, ctx: &ClassifyContext) -> ToolError {
    let error = match status {
        401 | 403 => classify_auth(status),
        404 => classify_not_found(ctx),
        400 | 422 => classify_validation(status, body),
        500..=599 => ToolError::upstream(format!(
            "The ISPW service failed to process the request (HTTP {})",
            status
        ))
        .with_hint("The remote service is degraded; retry later."),
        _ => classify_unknown(status, body),
    };
    error.with_status(status)
}

fn classify_auth(status: u16) -> ToolError {
    let message = if status == 401 {
        "Authentication failed: the API token was rejected"
    } else {
        "Permission denied: the API token is not allowed to perform this operation"
    };
    ToolError::authentication(message)
        .with_hint("Verify ISPW_API_TOKEN is valid and has permission for this SRID and operation.")
}

fn classify_not_found(ctx: &ClassifyContext) -> ToolError {
    let subject = if ctx.subject.is_empty() {
        "resource"
    } else {
        ctx.subject.as_str()
    };
    let scope = ctx
        .srid
        .as_ref()
        .map(|srid| format!(" in SRID '{}'", srid))
        .unwrap_or_default();
    let message = match ctx.identifier.as_ref() {
        Some(id) => format!("Resource not found: {} '{}' does not exist{}", subject, id, scope),
        None => format!("Resource not found: the {} request matched nothing{}", subject, scope),
    };
    let error = ToolError::not_found(message)
        .with_hint("Check the identifier spelling and that it exists in the given SRID.");
    match ctx.identifier.as_ref() {
        Some(id) => error.with_details(serde_json::json!({ "identifier": id, "subject": subject })),
        None => error,
    }
}

fn classify_validation(status: u16, body: &UpstreamBody) -> ToolError {
    let messages = upstream_messages(body);
    let message = if messages.is_empty() {
        format!("The ISPW service rejected the request (HTTP {})", status)
    } else {
        format!("The ISPW service rejected the request: {}", messages.join("; "))
    };
    let error = ToolError::validation(message)
        .with_hint("Check the request parameters against the reported field errors.");
    if messages.is_empty() {
        error
    } else {
        error.with_details(serde_json::json!({ "upstream_errors": messages }))
    }
}

fn classify_unknown(status: u16, body: &UpstreamBody) -> ToolError {
    let raw = body.raw_text();
    let mut message = format!("Unexpected response from the ISPW service (HTTP {})", status);
    let excerpt = collapse_whitespace(&raw);
    if !excerpt.is_empty() {
        message.push_str(": ");
        message.push_str(&preview(&excerpt, ERROR_BODY_PREVIEW_BYTES));
    }
    let mut error = ToolError::unknown(message).with_details(serde_json::json!({
        "status": status,
        "body": preview(&raw, ERROR_BODY_PREVIEW_BYTES),
    }));
    if status == 429 {
        error = error.with_hint("Rate limit exceeded; wait before making more requests.");
    }
    error
}

// Field errors in the shapes CES is known to send, in upstream order.
fn upstream_messages(body: &UpstreamBody) -> Vec<String> {
    let Some(json) = body.as_json() else {
        return match body {
            UpstreamBody::Text(text) if !text.trim().is_empty() => {
                vec![preview(&collapse_whitespace(text), ERROR_BODY_PREVIEW_BYTES)]
            }
            _ => Vec::new(),
        };
    };
    let mut out = Vec::new();
    if let Some(msg) = json
        .get("error")
        .and_then(|e| e.get("message"))
        .and_then(Value::as_str)
    {
        out.push(msg.to_string());
    }
    if let Some(msg) = json.get("error").and_then(Value::as_str) {
        out.push(msg.to_string());
    }
    if let Some(msg) = json.get("message").and_then(Value::as_str) {
        out.push(msg.to_string());
    }
    for key in ["errors", "fieldErrors"] {
        match json.get(key) {
            Some(Value::Array(items)) => out.extend(items.iter().map(describe_field_error)),
            Some(Value::Object(map)) => {
                for (field, msg) in map {
                    out.push(format!("{}: {}", field, plain(msg)));
                }
            }
            _ => {}
        }
    }
    out.dedup();
    out
}

fn describe_field_error(item: &Value) -> String {
    let Some(map) = item.as_object() else {
        return plain(item);
    };
    let field = map.get("field").or_else(|| map.get("name")).map(plain);
    let message = map
        .get("message")
        .or_else(|| map.get("defaultMessage"))
        .map(plain)
        .unwrap_or_else(|| item.to_string());
    match field {
        Some(field) => format!("{}: {}", field, message),
        None => message,
    }
}

fn plain(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
