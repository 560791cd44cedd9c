//! Stream integration glue: routes transport-layer events into the
//! renderer and tool handler, and computes the process exit code.

use std::sync::Arc;

use eventwire_contracts::{Event, MessageState, ToolCallRequest, ToolCallResponse};
use eventwire_errors::Classifier;
use eventwire_render::{OutputMode, RenderError, StreamRenderer};
use eventwire_retry::RetryManager;
use eventwire_tools::{ToolCallHandler, ToolCallHandlerConfig, ToolCallMetrics, ToolExecutor, ToolHandlerError};
use serde_json::Value;

use crate::bus::{EventBus, StreamUpdate};
use crate::codec::CodecRegistry;

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("renderer rejected event: {0}")]
    Render(#[from] RenderError),
}

fn now_nanos() -> i64 {
    chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
}

/// The process exit code for a completed tool call. `0` for a successful
/// call.
pub fn exit_code_for_response(response: &ToolCallResponse) -> i32 {
    response.error.as_ref().map(|e| e.exit_code()).unwrap_or(0)
}

fn to_result_event(response: ToolCallResponse) -> Event {
    Event::ToolCallResult {
        tool_call_id: response.tool_call_id,
        result: response.result,
        error: response.error.map(|e| serde_json::to_value(e).unwrap_or(Value::Null)),
        timestamp_nanos: now_nanos(),
    }
}

/// Wires a `StreamRenderer` and a `ToolCallHandler` together: every ingested
/// event updates the renderer and is republished on the bus; a
/// `ToolCallRequested` is additionally forwarded to the handler, and its
/// eventual `ToolCallResult` is fed back through the same path.
pub struct EventWireSystem<E: ToolExecutor + 'static> {
    renderer: Arc<StreamRenderer>,
    tool_handler: Arc<ToolCallHandler<E>>,
    bus: Arc<EventBus>,
    codecs: CodecRegistry,
}

impl<E: ToolExecutor + 'static> EventWireSystem<E> {
    pub fn new(executor: E, retry_manager: Arc<RetryManager>, classifier: Arc<Classifier>, tool_config: ToolCallHandlerConfig, mode: OutputMode, quiet: bool) -> Self {
        Self {
            renderer: Arc::new(StreamRenderer::new(mode, quiet)),
            tool_handler: Arc::new(ToolCallHandler::new(executor, retry_manager, classifier, tool_config)),
            bus: Arc::new(EventBus::new()),
            codecs: CodecRegistry::new(),
        }
    }

    /// Negotiates `accept` against the supported media types and encodes
    /// `event` with the matching codec from the format registry.
    pub fn encode_event(&self, event: &Event, accept: Option<&str>) -> (String, Value) {
        self.codecs.encode(event, accept)
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<StreamUpdate> {
        self.bus.subscribe()
    }

    pub fn get_state(&self) -> Value {
        self.renderer.get_state()
    }

    pub fn get_message(&self, id: &str) -> Option<MessageState> {
        self.renderer.get_message(id)
    }

    pub fn tool_metrics(&self) -> ToolCallMetrics {
        self.tool_handler.metrics()
    }

    pub fn cancel_tool_call(&self, tool_call_id: &str) -> Result<(), ToolHandlerError> {
        self.tool_handler.cancel_tool_call(tool_call_id)
    }

    /// Feeds one upstream event into the renderer and publishes the
    /// result. `ToolCallRequested` additionally spawns the tool call so
    /// unrelated events on the same stream keep flowing while it retries;
    /// its eventual `ToolCallResult` is ingested the same way a
    /// server-sent one would be.
    pub fn ingest(&self, event: Event) -> Result<(), IngestError> {
        self.apply_and_publish(event.clone())?;

        if let Event::ToolCallRequested { tool_call_id, tool_name, arguments, .. } = event {
            let renderer = self.renderer.clone();
            let bus = self.bus.clone();
            let tool_handler = self.tool_handler.clone();
            tokio::spawn(async move {
                let request = ToolCallRequest { tool_call_id, tool_name, arguments };
                let response = tool_handler.handle_tool_call(request).await;
                let result_event = to_result_event(response);
                match renderer.process_event(&result_event, now_nanos()) {
                    Ok(rendered) => {
                        bus.publish(StreamUpdate { event: result_event, rendered });
                    }
                    Err(error) => {
                        tracing::warn!(%error, "failed to apply synthesized tool call result");
                    }
                }
            });
        }

        Ok(())
    }

    fn apply_and_publish(&self, event: Event) -> Result<(), IngestError> {
        let rendered = self.renderer.process_event(&event, now_nanos())?;
        self.bus.publish(StreamUpdate { event, rendered });
        Ok(())
    }
}
