//! The wire event union. Every variant's `type` tag is bit-exact on the
//! wire — do not rename a variant without a matching `#[serde(rename)]`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use eventwire_errors::ToolErrorCode;

/// Monotonic timestamp, nanoseconds since the Unix epoch.
pub type TimestampNanos = i64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    #[serde(rename = "TEXT_MESSAGE_START")]
    TextMessageStart {
        #[serde(rename = "messageId")]
        message_id: String,
        role: String,
        #[serde(rename = "timestampNanos")]
        timestamp_nanos: TimestampNanos,
    },
    #[serde(rename = "TEXT_MESSAGE_CONTENT")]
    TextMessageContent {
        #[serde(rename = "messageId")]
        message_id: String,
        content: String,
        #[serde(rename = "timestampNanos")]
        timestamp_nanos: TimestampNanos,
    },
    #[serde(rename = "TEXT_MESSAGE_END")]
    TextMessageEnd {
        #[serde(rename = "messageId")]
        message_id: String,
        #[serde(rename = "timestampNanos")]
        timestamp_nanos: TimestampNanos,
    },
    #[serde(rename = "TEXT_MESSAGE_CHUNK")]
    TextMessageChunk {
        #[serde(rename = "messageId")]
        message_id: String,
        content: String,
        #[serde(rename = "timestampNanos")]
        timestamp_nanos: TimestampNanos,
    },
    #[serde(rename = "STATE_SNAPSHOT")]
    StateSnapshot {
        state: Value,
        #[serde(rename = "timestampNanos")]
        timestamp_nanos: TimestampNanos,
    },
    #[serde(rename = "STATE_DELTA")]
    StateDelta {
        patches: Value,
        #[serde(rename = "timestampNanos")]
        timestamp_nanos: TimestampNanos,
    },
    #[serde(rename = "TOOL_CALL_START")]
    ToolCallStart {
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
        #[serde(rename = "toolName")]
        tool_name: String,
        #[serde(rename = "timestampNanos")]
        timestamp_nanos: TimestampNanos,
    },
    #[serde(rename = "TOOL_CALL_ARGS")]
    ToolCallArgs {
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
        arguments: String,
        #[serde(rename = "timestampNanos")]
        timestamp_nanos: TimestampNanos,
    },
    #[serde(rename = "TOOL_CALL_END")]
    ToolCallEnd {
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
        #[serde(rename = "timestampNanos")]
        timestamp_nanos: TimestampNanos,
    },
    #[serde(rename = "TOOL_CALL_RESULT")]
    ToolCallResult {
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<Value>,
        #[serde(rename = "timestampNanos")]
        timestamp_nanos: TimestampNanos,
    },
    #[serde(rename = "TOOL_CALL_REQUESTED")]
    ToolCallRequested {
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
        #[serde(rename = "toolName")]
        tool_name: String,
        arguments: Value,
        #[serde(rename = "timestampNanos")]
        timestamp_nanos: TimestampNanos,
    },
    #[serde(rename = "THINKING_START")]
    ThinkingStart {
        #[serde(rename = "timestampNanos")]
        timestamp_nanos: TimestampNanos,
    },
    #[serde(rename = "THINKING_CONTENT")]
    ThinkingContent {
        content: String,
        #[serde(rename = "timestampNanos")]
        timestamp_nanos: TimestampNanos,
    },
    #[serde(rename = "THINKING_END")]
    ThinkingEnd {
        #[serde(rename = "timestampNanos")]
        timestamp_nanos: TimestampNanos,
    },
    #[serde(rename = "ERROR")]
    Error {
        code: ToolErrorCode,
        message: String,
        #[serde(rename = "requestId", skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
        #[serde(rename = "timestampNanos")]
        timestamp_nanos: TimestampNanos,
    },
}

impl Event {
    /// The bit-exact wire type string for this variant, independent of
    /// whatever serde tag name ends up on the wire (used for SSE `id:` and
    /// `event:` lines, which are synthesised outside of full-event JSON).
    pub fn type_name(&self) -> &'static str {
        match self {
            Event::TextMessageStart { .. } => "TEXT_MESSAGE_START",
            Event::TextMessageContent { .. } => "TEXT_MESSAGE_CONTENT",
            Event::TextMessageEnd { .. } => "TEXT_MESSAGE_END",
            Event::TextMessageChunk { .. } => "TEXT_MESSAGE_CHUNK",
            Event::StateSnapshot { .. } => "STATE_SNAPSHOT",
            Event::StateDelta { .. } => "STATE_DELTA",
            Event::ToolCallStart { .. } => "TOOL_CALL_START",
            Event::ToolCallArgs { .. } => "TOOL_CALL_ARGS",
            Event::ToolCallEnd { .. } => "TOOL_CALL_END",
            Event::ToolCallResult { .. } => "TOOL_CALL_RESULT",
            Event::ToolCallRequested { .. } => "TOOL_CALL_REQUESTED",
            Event::ThinkingStart { .. } => "THINKING_START",
            Event::ThinkingContent { .. } => "THINKING_CONTENT",
            Event::ThinkingEnd { .. } => "THINKING_END",
            Event::Error { .. } => "ERROR",
        }
    }

    pub fn timestamp_nanos(&self) -> TimestampNanos {
        match self {
            Event::TextMessageStart { timestamp_nanos, .. }
            | Event::TextMessageContent { timestamp_nanos, .. }
            | Event::TextMessageEnd { timestamp_nanos, .. }
            | Event::TextMessageChunk { timestamp_nanos, .. }
            | Event::StateSnapshot { timestamp_nanos, .. }
            | Event::StateDelta { timestamp_nanos, .. }
            | Event::ToolCallStart { timestamp_nanos, .. }
            | Event::ToolCallArgs { timestamp_nanos, .. }
            | Event::ToolCallEnd { timestamp_nanos, .. }
            | Event::ToolCallResult { timestamp_nanos, .. }
            | Event::ToolCallRequested { timestamp_nanos, .. }
            | Event::ThinkingStart { timestamp_nanos }
            | Event::ThinkingContent { timestamp_nanos, .. }
            | Event::ThinkingEnd { timestamp_nanos }
            | Event::Error { timestamp_nanos, .. } => *timestamp_nanos,
        }
    }

    /// Timestamp truncated to milliseconds, the wire unit per the external
    /// interfaces contract.
    pub fn timestamp_millis(&self) -> i64 {
        self.timestamp_nanos() / 1_000_000
    }
}
