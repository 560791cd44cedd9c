//! Tool call request/response contracts.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use eventwire_errors::ToolError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub tool_call_id: String,
    pub tool_name: String,
    pub arguments: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallResponse {
    pub tool_call_id: String,
    pub tool_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ToolError>,
    /// Milliseconds.
    pub duration: u64,
    pub attempt_count: u32,
}

impl ToolCallResponse {
    pub fn success(tool_call_id: impl Into<String>, tool_name: impl Into<String>, result: Value, duration: u64, attempt_count: u32) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            result: Some(result),
            error: None,
            duration,
            attempt_count,
        }
    }

    pub fn failure(tool_call_id: impl Into<String>, tool_name: impl Into<String>, error: ToolError, duration: u64, attempt_count: u32) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            tool_name: tool_name.into(),
            result: None,
            error: Some(error),
            duration,
            attempt_count,
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eventwire_errors::ToolErrorCode;

    #[test]
    fn success_response_has_no_error() {
        let response = ToolCallResponse::success("call-1", "fetch", Value::Bool(true), 10, 1);
        assert!(response.is_success());
    }

    #[test]
    fn failure_response_carries_error() {
        let error = ToolError::new("call-1", "fetch", ToolErrorCode::Timeout, "deadline exceeded");
        let response = ToolCallResponse::failure("call-1", "fetch", error, 50, 3);
        assert!(!response.is_success());
        assert_eq!(response.attempt_count, 3);
    }
}
