//! The UI stream renderer: a state machine over the event union.

use std::collections::HashMap;
use std::time::Duration;

use eventwire_contracts::{AppendError, ApplicationState, Event, MessageState, DEFAULT_MAX_BUFFER_SIZE};
use parking_lot::RwLock;
use serde_json::Value;

use crate::accumulator::ToolCallAccumulator;
use crate::buffer::{BufferMode, StreamingBuffer};
use crate::patch::{apply_patch, PatchError};

/// Pretty-mode text deltas under this size are held back rather than
/// flushed immediately.
const TEXT_CHUNK_THRESHOLD: usize = 32;
/// Pretty-mode text deltas are flushed at least this often regardless of
/// size, so a slow trickle of small deltas doesn't stall display.
const TEXT_FLUSH_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Pretty,
    Json,
}

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("message {message_id} content buffer overflow")]
    BufferOverflow { message_id: String },
    #[error("message {message_id} received content after it was already complete")]
    MessageAlreadyComplete { message_id: String },
    #[error("state delta failed at stage {stage}: {source}")]
    PatchFailed { stage: &'static str, #[source] source: PatchError },
}

struct RendererInner {
    messages: HashMap<String, MessageState>,
    state: ApplicationState,
}

/// Serialisable under a single write lock; reads return defensive copies.
pub struct StreamRenderer {
    inner: RwLock<RendererInner>,
    accumulator: RwLock<ToolCallAccumulator>,
    /// Pretty-mode text-delta coalescing buffers, one per in-flight
    /// `message_id`. Presentation only: `inner.messages` always holds the
    /// full uncoalesced content regardless of flush timing.
    text_buffers: RwLock<HashMap<String, StreamingBuffer>>,
    mode: OutputMode,
    quiet: bool,
    max_buffer_size: usize,
}

impl StreamRenderer {
    pub fn new(mode: OutputMode, quiet: bool) -> Self {
        Self::with_buffer_size(mode, quiet, DEFAULT_MAX_BUFFER_SIZE)
    }

    pub fn with_buffer_size(mode: OutputMode, quiet: bool, max_buffer_size: usize) -> Self {
        Self {
            inner: RwLock::new(RendererInner {
                messages: HashMap::new(),
                state: ApplicationState::empty(),
            }),
            accumulator: RwLock::new(ToolCallAccumulator::new()),
            text_buffers: RwLock::new(HashMap::new()),
            mode,
            quiet,
            max_buffer_size,
        }
    }

    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    /// `GetState()`: a defensive copy.
    pub fn get_state(&self) -> Value {
        self.inner.read().state.snapshot()
    }

    /// `GetMessage(id)`: a stable snapshot of the current buffer.
    pub fn get_message(&self, id: &str) -> Option<MessageState> {
        self.inner.read().messages.get(id).cloned()
    }

    /// Applies one event to renderer state, returning the text to emit
    /// (or `None` under `Quiet`).
    pub fn process_event(&self, event: &Event, now_nanos: i64) -> Result<Option<String>, RenderError> {
        if self.quiet {
            self.apply(event, now_nanos)?;
            return Ok(None);
        }

        self.apply(event, now_nanos)?;
        let rendered = match self.mode {
            OutputMode::Json => Some(serde_json::to_string(event).unwrap_or_default()),
            OutputMode::Pretty => self.render_pretty(event),
        };
        Ok(rendered)
    }

    fn apply(&self, event: &Event, now_nanos: i64) -> Result<(), RenderError> {
        match event {
            Event::TextMessageStart { message_id, role, .. } => {
                let mut inner = self.inner.write();
                inner.messages.insert(message_id.clone(), MessageState::new(message_id.clone(), role.clone(), now_nanos));
            }
            Event::TextMessageContent { message_id, content, .. } | Event::TextMessageChunk { message_id, content, .. } => {
                let mut inner = self.inner.write();
                let message = inner
                    .messages
                    .entry(message_id.clone())
                    .or_insert_with(|| MessageState::new(message_id.clone(), "assistant", now_nanos));
                message.append(content, self.max_buffer_size).map_err(|error| match error {
                    AppendError::Overflow { message_id, .. } => RenderError::BufferOverflow { message_id },
                    AppendError::AlreadyComplete { message_id } => RenderError::MessageAlreadyComplete { message_id },
                })?;
            }
            Event::TextMessageEnd { message_id, .. } => {
                let mut inner = self.inner.write();
                if let Some(message) = inner.messages.get_mut(message_id) {
                    message.complete(now_nanos);
                }
            }
            Event::StateSnapshot { state, .. } => {
                self.inner.write().state.replace(state.clone());
            }
            Event::StateDelta { patches, .. } => {
                let mut inner = self.inner.write();
                let current = inner.state.snapshot();
                let next = apply_patch(&current, patches).map_err(|source| RenderError::PatchFailed { stage: "apply_patch", source })?;
                inner.state.replace(next);
            }
            Event::ToolCallArgs { tool_call_id, arguments, .. } => {
                self.accumulator.write().push_args(tool_call_id, arguments);
            }
            Event::ThinkingStart { .. } | Event::ThinkingContent { .. } | Event::ThinkingEnd { .. } => {}
            Event::ToolCallStart { .. } | Event::ToolCallEnd { .. } | Event::ToolCallResult { .. } | Event::ToolCallRequested { .. } | Event::Error { .. } => {}
        }
        Ok(())
    }

    /// Renders one event for `Pretty` mode. `TextMessageContent`/`Chunk`
    /// deltas are coalesced through a per-`message_id` [`StreamingBuffer`]
    /// and may return `None` if the delta was held back rather than shown.
    fn render_pretty(&self, event: &Event) -> Option<String> {
        match event {
            Event::TextMessageStart { role, message_id, .. } => {
                self.text_buffers
                    .write()
                    .insert(message_id.clone(), StreamingBuffer::new(BufferMode::Accumulate, TEXT_CHUNK_THRESHOLD, TEXT_FLUSH_INTERVAL));
                Some(format!("[{role}] "))
            }
            Event::TextMessageContent { message_id, content, .. } | Event::TextMessageChunk { message_id, content, .. } => {
                let mut buffers = self.text_buffers.write();
                let buffer = buffers
                    .entry(message_id.clone())
                    .or_insert_with(|| StreamingBuffer::new(BufferMode::Accumulate, TEXT_CHUNK_THRESHOLD, TEXT_FLUSH_INTERVAL));
                buffer.push(content)
            }
            Event::TextMessageEnd { message_id, .. } => {
                let flushed = self.text_buffers.write().remove(message_id).and_then(|mut buffer| buffer.flush());
                Some(format!("{}\n", flushed.unwrap_or_default()))
            }
            Event::ToolCallStart { tool_name, tool_call_id, .. } => Some(format!("\n> {tool_name} ({tool_call_id})\n")),
            Event::ToolCallArgs { .. } => Some(String::new()),
            Event::ToolCallEnd { .. } => Some(String::new()),
            Event::ToolCallResult { tool_call_id, result, error, .. } => Some(match error {
                Some(err) => format!("✗ {tool_call_id} failed: {err}\n"),
                None => format!("✓ {tool_call_id}: {}\n", result.clone().unwrap_or(Value::Null)),
            }),
            Event::ToolCallRequested { tool_name, .. } => Some(format!("\n? requesting {tool_name}\n")),
            Event::ThinkingStart { .. } => Some("(thinking... ".to_string()),
            Event::ThinkingContent { content, .. } => Some(content.clone()),
            Event::ThinkingEnd { .. } => Some(")\n".to_string()),
            Event::StateSnapshot { .. } => Some("[state reset]\n".to_string()),
            Event::StateDelta { .. } => Some("[state updated]\n".to_string()),
            Event::Error { message, .. } => Some(format!("\n!! error: {message}\n")),
        }
    }

    /// Finalizes an accumulated tool call's arguments once `ToolCallEnd`
    /// has been observed.
    pub fn finalize_tool_call_args(&self, tool_call_id: &str) -> Result<Value, serde_json::Error> {
        self.accumulator.write().finalize(tool_call_id)
    }
}
