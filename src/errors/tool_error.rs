use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    InputInvalid,
    AuthenticationFailure,
    NotFound,
    ValidationFailure,
    Timeout,
    ConnectionFailure,
    UpstreamFailure,
    UnknownFailure,
}

impl ErrorCategory {
    pub fn code(self) -> &'static str {
        match self {
            ErrorCategory::InputInvalid => "INPUT_INVALID",
            ErrorCategory::AuthenticationFailure => "AUTHENTICATION_FAILURE",
            ErrorCategory::NotFound => "NOT_FOUND",
            ErrorCategory::ValidationFailure => "VALIDATION_FAILURE",
            ErrorCategory::Timeout => "TIMEOUT",
            ErrorCategory::ConnectionFailure => "CONNECTION_FAILURE",
            ErrorCategory::UpstreamFailure => "UPSTREAM_FAILURE",
            ErrorCategory::UnknownFailure => "UNKNOWN_FAILURE",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCategory::InputInvalid => "input_invalid",
            ErrorCategory::AuthenticationFailure => "authentication_failure",
            ErrorCategory::NotFound => "not_found",
            ErrorCategory::ValidationFailure => "validation_failure",
            ErrorCategory::Timeout => "timeout",
            ErrorCategory::ConnectionFailure => "connection_failure",
            ErrorCategory::UpstreamFailure => "upstream_failure",
            ErrorCategory::UnknownFailure => "unknown_failure",
        }
    }

    // Advisory only: nothing inside the crate retries.
    fn is_transient(self) -> bool {
        matches!(
            self,
            ErrorCategory::Timeout
                | ErrorCategory::ConnectionFailure
                | ErrorCategory::UpstreamFailure
        )
    }
}

#[derive(Debug, Clone, Serialize, Error)]
#[error("{message}")]
pub struct ToolError {
    pub category: ErrorCategory,
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    pub retryable: bool,
}

impl ToolError {
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            code: category.code().to_string(),
            message: message.into(),
            hint: None,
            status: None,
            details: None,
            retryable: category.is_transient(),
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn input_invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::InputInvalid, message)
    }

    /// Input rejection that names the offending argument and the rule it broke.
    pub fn invalid_field(field: &str, constraint: &str, message: impl Into<String>) -> Self {
        Self::input_invalid(message).with_details(serde_json::json!({
            "field": field,
            "constraint": constraint,
        }))
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::AuthenticationFailure, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::NotFound, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::ValidationFailure, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::Timeout, message)
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::ConnectionFailure, message)
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::UpstreamFailure, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(ErrorCategory::UnknownFailure, message)
    }

    pub fn field(&self) -> Option<&str> {
        self.details
            .as_ref()
            .and_then(|d| d.get("field"))
            .and_then(|v| v.as_str())
    }

    pub fn constraint(&self) -> Option<&str> {
        self.details
            .as_ref()
            .and_then(|d| d.get("constraint"))
            .and_then(|v| v.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_categories_are_flagged_retryable() {
        assert!(ToolError::timeout("t").retryable);
        assert!(ToolError::connection("c").retryable);
        assert!(ToolError::upstream("u").retryable);
        assert!(!ToolError::not_found("n").retryable);
        assert!(!ToolError::input_invalid("i").retryable);
    }

    #[test]
    fn invalid_field_exposes_field_and_constraint() {
        let err = ToolError::invalid_field("assignment_id", "required", "missing");
        assert_eq!(err.category, ErrorCategory::InputInvalid);
        assert_eq!(err.code, "INPUT_INVALID");
        assert_eq!(err.field(), Some("assignment_id"));
        assert_eq!(err.constraint(), Some("required"));
    }

    #[test]
    fn serializes_category_in_snake_case() {
        let err = ToolError::authentication("denied").with_status(401);
        let value = serde_json::to_value(&err).expect("serialize");
        assert_eq!(value["category"], "authentication_failure");
        assert_eq!(value["status"], 401);
        assert!(value.get("hint").is_none());
    }
}
