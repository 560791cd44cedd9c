//! Accumulates fragmented `ToolCallArgs` deltas per `toolCallId`, finalized
//! into a single JSON value once `ToolCallEnd` is observed.

use std::collections::HashMap;

use serde_json::Value;

#[derive(Default)]
pub struct ToolCallAccumulator {
    buffers: HashMap<String, String>,
}

impl ToolCallAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_args(&mut self, tool_call_id: &str, fragment: &str) {
        self.buffers.entry(tool_call_id.to_string()).or_default().push_str(fragment);
    }

    /// Parses and removes the accumulated buffer for `tool_call_id`. An
    /// empty buffer finalizes to an empty JSON object, matching how most
    /// providers represent a no-argument call.
    pub fn finalize(&mut self, tool_call_id: &str) -> Result<Value, serde_json::Error> {
        let raw = self.buffers.remove(tool_call_id).unwrap_or_default();
        if raw.trim().is_empty() {
            return Ok(Value::Object(Default::default()));
        }
        serde_json::from_str(&raw)
    }

    pub fn pending(&self, tool_call_id: &str) -> Option<&str> {
        self.buffers.get(tool_call_id).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accumulates_fragments_in_order() {
        let mut accumulator = ToolCallAccumulator::new();
        accumulator.push_args("call-1", r#"{"a":"#);
        accumulator.push_args("call-1", "1}");
        assert_eq!(accumulator.finalize("call-1").unwrap(), json!({"a": 1}));
    }

    #[test]
    fn empty_buffer_finalizes_to_empty_object() {
        let mut accumulator = ToolCallAccumulator::new();
        assert_eq!(accumulator.finalize("call-1").unwrap(), json!({}));
    }

    #[test]
    fn finalize_clears_the_buffer() {
        let mut accumulator = ToolCallAccumulator::new();
        accumulator.push_args("call-1", "{}");
        accumulator.finalize("call-1").unwrap();
        assert_eq!(accumulator.pending("call-1"), None);
    }
}
