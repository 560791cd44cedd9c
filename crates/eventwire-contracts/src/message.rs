//! `MessageState`: the renderer's reconstruction of one streamed message.

use serde::{Deserialize, Serialize};

/// Default cap on a single message's accumulated content buffer.
pub const DEFAULT_MAX_BUFFER_SIZE: usize = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageState {
    pub id: String,
    pub role: String,
    pub content: String,
    /// Nanoseconds since epoch.
    pub start_time: i64,
    /// Nanoseconds since epoch; absent until `TextMessageEnd`.
    pub end_time: Option<i64>,
    pub is_complete: bool,
}

impl MessageState {
    pub fn new(id: impl Into<String>, role: impl Into<String>, start_time: i64) -> Self {
        Self {
            id: id.into(),
            role: role.into(),
            content: String::new(),
            start_time,
            end_time: None,
            is_complete: false,
        }
    }

    /// Append `delta` to the content buffer. Rejects the mutation once the
    /// message is already complete, or if it would push the buffer past
    /// `max_buffer_size`: the buffer is mutated only while `is_complete` is
    /// `false`.
    pub fn append(&mut self, delta: &str, max_buffer_size: usize) -> Result<(), AppendError> {
        if self.is_complete {
            return Err(AppendError::AlreadyComplete { message_id: self.id.clone() });
        }
        if self.content.len() + delta.len() > max_buffer_size {
            return Err(AppendError::Overflow {
                message_id: self.id.clone(),
                attempted_size: self.content.len() + delta.len(),
                max_buffer_size,
            });
        }
        self.content.push_str(delta);
        Ok(())
    }

    pub fn complete(&mut self, end_time: i64) {
        self.end_time = Some(end_time);
        self.is_complete = true;
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum AppendError {
    #[error("message {message_id} buffer overflow: {attempted_size} bytes exceeds max {max_buffer_size}")]
    Overflow { message_id: String, attempted_size: usize, max_buffer_size: usize },
    #[error("message {message_id} is already complete")]
    AlreadyComplete { message_id: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_within_limit_succeeds() {
        let mut message = MessageState::new("m1", "assistant", 0);
        message.append("hello", 10).unwrap();
        assert_eq!(message.content, "hello");
    }

    #[test]
    fn append_past_limit_fails() {
        let mut message = MessageState::new("m1", "assistant", 0);
        message.append("hello", 10).unwrap();
        let err = message.append("world!!", 10).unwrap_err();
        assert!(matches!(err, AppendError::Overflow { max_buffer_size: 10, .. }));
    }

    #[test]
    fn complete_sets_end_time_and_flag() {
        let mut message = MessageState::new("m1", "assistant", 0);
        message.complete(100);
        assert!(message.is_complete);
        assert_eq!(message.end_time, Some(100));
    }

    #[test]
    fn append_after_complete_is_rejected() {
        let mut message = MessageState::new("m1", "assistant", 0);
        message.append("hello", 100).unwrap();
        message.complete(100);
        let err = message.append(" world", 100).unwrap_err();
        assert!(matches!(err, AppendError::AlreadyComplete { .. }));
        assert_eq!(message.content, "hello");
    }
}
