//! Integration glue: wires the event transport, tool call handler and
//! stream renderer into one system, with a broadcast bus for observers.

mod bus;
mod codec;
mod integration;

pub use bus::{EventBus, StreamUpdate};
pub use codec::{CodecRegistry, AG_UI_MEDIA_TYPE};
pub use integration::{exit_code_for_response, EventWireSystem, IngestError};
