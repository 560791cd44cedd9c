//! Closed error taxonomy, substring classifier, and exit-code mapping.
//!
//! Every transport and tool-executor failure collapses into a `ToolError`
//! carrying one of a fixed set of `ToolErrorCode`s. The classifier never
//! invents a new code at the call site — see [`Classifier::classify`].

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Closed set of error codes. Transport-only kinds (`CIRCUIT_OPEN`,
/// `SERIALIZATION_ERROR`) are mapped to `DependencyError`/`InternalError`
/// before they reach a `ToolError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ToolErrorCode {
    Timeout,
    ValidationError,
    NotFound,
    PermissionDenied,
    RateLimit,
    NetworkError,
    InternalError,
    DependencyError,
    InvalidInput,
    ResourceLimit,
    UnknownError,
}

impl ToolErrorCode {
    /// Forced retryable regardless of the `is_retryable` hint.
    pub fn is_force_retryable(self) -> bool {
        matches!(
            self,
            ToolErrorCode::Timeout
                | ToolErrorCode::NetworkError
                | ToolErrorCode::RateLimit
                | ToolErrorCode::DependencyError
        )
    }

    /// Never retried regardless of the `is_retryable` hint.
    pub fn is_never_retryable(self) -> bool {
        matches!(
            self,
            ToolErrorCode::ValidationError
                | ToolErrorCode::NotFound
                | ToolErrorCode::PermissionDenied
                | ToolErrorCode::InvalidInput
        )
    }

    /// Process exit code for a tool call that fails with this code.
    pub fn exit_code(self) -> i32 {
        match self {
            ToolErrorCode::Timeout => 124,
            ToolErrorCode::PermissionDenied => 77,
            ToolErrorCode::NotFound => 127,
            ToolErrorCode::ValidationError | ToolErrorCode::InvalidInput => 22,
            ToolErrorCode::NetworkError => 101,
            ToolErrorCode::InternalError => 70,
            _ => 1,
        }
    }
}

/// A fully-classified tool/transport failure, serialized as the wire
/// `ToolError` JSON shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolError {
    pub tool_call_id: String,
    pub tool_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(rename = "errorCode")]
    pub code: ToolErrorCode,
    #[serde(rename = "errorMessage")]
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    pub attempt_number: u32,
    pub max_attempts: u32,
    pub is_retryable: bool,
    /// Seconds, matching the wire `Retry-After` semantics used by the transport.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
    /// Milliseconds since Unix epoch.
    pub timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, Value>,
}

impl ToolError {
    pub fn new(tool_call_id: impl Into<String>, tool_name: impl Into<String>, code: ToolErrorCode, message: impl Into<String>) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            request_id: None,
            session_id: None,
            code,
            message: message.into(),
            details: None,
            attempt_number: 1,
            max_attempts: 1,
            is_retryable: false,
            retry_after: None,
            timestamp: now_millis(),
            duration: None,
            stack_trace: None,
            metadata: HashMap::new(),
        }
    }

    /// Whether a retry manager should actually retry this error: the
    /// `is_retryable` hint, amended by the code's forced retryable/never
    /// retryable classes, and bounded by `attempt_number < max_attempts`.
    pub fn should_retry(&self) -> bool {
        if self.code.is_never_retryable() {
            return false;
        }
        let retryable = self.is_retryable || self.code.is_force_retryable();
        retryable && self.attempt_number < self.max_attempts
    }

    pub fn exit_code(&self) -> i32 {
        self.code.exit_code()
    }
}

impl std::fmt::Display for ToolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.code, self.message)
    }
}

impl std::error::Error for ToolError {}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// A user-registered classification rule: given the case-folded error
/// string, optionally produce a code. First match wins.
pub type ClassifierRule = Box<dyn Fn(&str) -> Option<ToolErrorCode> + Send + Sync>;

/// Maps opaque errors to a `ToolError`. Rule order: already-a-`ToolError`,
/// then user rules, then the default substring table.
#[derive(Default)]
pub struct Classifier {
    rules: Vec<ClassifierRule>,
}

impl Classifier {
    pub fn new() -> Self {
        Self { rules: Vec::new() }
    }

    /// Register a rule that runs before the default substring table.
    pub fn add_rule(&mut self, rule: ClassifierRule) {
        self.rules.push(rule);
    }

    /// Classify an opaque error message into a fully-populated `ToolError`.
    ///
    /// `attempt_number`/`max_attempts` are supplied by the caller (usually
    /// the retry manager) since the classifier has no attempt-state of its
    /// own.
    pub fn classify(
        &self,
        error_message: &str,
        tool_name: &str,
        tool_call_id: &str,
        attempt_number: u32,
        max_attempts: u32,
    ) -> ToolError {
        let folded = error_message.to_lowercase();

        let (code, retry_after, is_retryable) = self
            .rules
            .iter()
            .find_map(|rule| rule(&folded).map(|code| (code, None, default_retryable(code))))
            .unwrap_or_else(|| classify_default(&folded));

        ToolError {
            tool_call_id: tool_call_id.to_string(),
            tool_name: tool_name.to_string(),
            request_id: None,
            session_id: None,
            code,
            message: error_message.to_string(),
            details: None,
            attempt_number,
            max_attempts,
            is_retryable,
            retry_after,
            timestamp: now_millis(),
            duration: None,
            stack_trace: None,
            metadata: HashMap::new(),
        }
    }

    /// Classify a pre-built `ToolError`, passing it through unchanged.
    pub fn classify_existing(&self, error: ToolError) -> ToolError {
        error
    }
}

fn default_retryable(code: ToolErrorCode) -> bool {
    matches!(
        code,
        ToolErrorCode::Timeout
            | ToolErrorCode::NetworkError
            | ToolErrorCode::RateLimit
            | ToolErrorCode::InternalError
    )
}

/// Default substring rules, case-folded, in priority order.
fn classify_default(folded: &str) -> (ToolErrorCode, Option<u64>, bool) {
    const RULES: &[(&[&str], ToolErrorCode)] = &[
        (&["timeout", "timed out", "deadline exceeded"], ToolErrorCode::Timeout),
        (&["connection", "network", "dial", "eof"], ToolErrorCode::NetworkError),
        (&["rate limit", "too many requests", "throttled"], ToolErrorCode::RateLimit),
        (&["not found", "404"], ToolErrorCode::NotFound),
        (&["unauthorized", "forbidden", "401", "403"], ToolErrorCode::PermissionDenied),
        (&["invalid", "validation", "malformed"], ToolErrorCode::ValidationError),
        (&["internal server", "500", "502", "503"], ToolErrorCode::InternalError),
    ];

    for (patterns, code) in RULES {
        if patterns.iter().any(|pattern| folded.contains(pattern)) {
            let retry_after = matches!(code, ToolErrorCode::RateLimit).then_some(30);
            return (*code, retry_after, default_retryable(*code));
        }
    }

    (ToolErrorCode::UnknownError, None, false)
}
