//! UI stream renderer: reconstructs messages and application state from
//! the wire event union and renders them for Pretty/JSON/Quiet output.

mod accumulator;
mod buffer;
mod patch;
mod renderer;

pub use accumulator::ToolCallAccumulator;
pub use buffer::{BufferMode, StreamingBuffer};
pub use patch::{apply_patch, PatchError};
pub use renderer::{OutputMode, RenderError, StreamRenderer};
