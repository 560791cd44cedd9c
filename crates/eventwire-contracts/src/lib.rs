//! Wire data model shared across the EventWire crates: the event union,
//! message/application state, and tool call request/response shapes.

mod event;
mod message;
mod registry;
mod state;
mod tool;

pub use event::{Event, TimestampNanos};
pub use message::{AppendError, MessageState, DEFAULT_MAX_BUFFER_SIZE};
pub use registry::{canonical_mime, EntryKind, RegistryConfig, RegistryEntry};
pub use state::ApplicationState;
pub use tool::{ToolCallRequest, ToolCallResponse};
