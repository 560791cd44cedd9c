//! Single-flight, idempotent, cancelable tool call execution.

mod cancel;
mod executor;
mod handler;
mod metrics;

pub use cancel::CancelHandle;
pub use executor::ToolExecutor;
pub use handler::{ToolCallHandler, ToolCallHandlerConfig, ToolHandlerError};
pub use metrics::{ToolCallMetrics, ToolCallMetricsCollector};
