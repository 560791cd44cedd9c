//! The collaborator a `ToolCallHandler` drives: an opaque async action
//! keyed by `toolCallId`. Concrete tool implementations (provider/tool
//! adapters) are external collaborators, not part of this crate.

use async_trait::async_trait;
use eventwire_contracts::ToolCallRequest;
use serde_json::Value;

use crate::cancel::CancelHandle;

#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Executes one attempt. Returns an opaque error message on failure —
    /// classification into a `ToolError` happens in the handler so the
    /// executor stays free of the error taxonomy.
    async fn execute(&self, request: &ToolCallRequest, cancel: &CancelHandle) -> Result<Value, String>;
}
