//! Resolves a negotiated `Accept` type to a JSON encoding of an `Event`,
//! backed by the concurrent format registry so encoders participate in the
//! same LRU/TTL lifecycle as any other registry entry.

use std::sync::Arc;

use eventwire_contracts::{Event, RegistryConfig};
use eventwire_registry::FormatRegistry;
use eventwire_transport::{negotiate, DEFAULT_MEDIA_TYPE};
use serde_json::{json, Value};

pub const AG_UI_MEDIA_TYPE: &str = "application/vnd.ag-ui+json";

type Encoder = Arc<dyn Fn(&Event) -> Value + Send + Sync>;

const SUPPORTED_MEDIA_TYPES: [&str; 2] = [DEFAULT_MEDIA_TYPE, AG_UI_MEDIA_TYPE];

/// A tiny format registry specialised to JSON encoders: `application/json`
/// encodes the event as-is, `application/vnd.ag-ui+json` wraps it in an
/// envelope carrying the wire type tag alongside the event body.
pub struct CodecRegistry {
    formats: FormatRegistry<Encoder>,
}

impl CodecRegistry {
    pub fn new() -> Self {
        let formats: FormatRegistry<Encoder> = FormatRegistry::new(RegistryConfig::default());
        formats
            .set_format(DEFAULT_MEDIA_TYPE, Arc::new(|event: &Event| serde_json::to_value(event).unwrap_or(Value::Null)))
            .expect("newly constructed registry is open");
        formats
            .set_format(AG_UI_MEDIA_TYPE, Arc::new(|event: &Event| json!({ "type": event.type_name(), "event": event })))
            .expect("newly constructed registry is open");
        Self { formats }
    }

    /// Negotiates a MIME type from `accept` against the supported set and
    /// encodes `event` with the matching codec. Falls back to the default
    /// JSON shape if the negotiated type's codec was since evicted.
    pub fn encode(&self, event: &Event, accept: Option<&str>) -> (String, Value) {
        let mime = negotiate(accept, &SUPPORTED_MEDIA_TYPES);
        let encoder = self
            .formats
            .get_format(&mime)
            .or_else(|| self.formats.get_format(DEFAULT_MEDIA_TYPE))
            .expect("default codec is registered for the lifetime of the registry");
        (mime, encoder(event))
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eventwire_contracts::Event;
    use serde_json::json;

    fn sample() -> Event {
        Event::ThinkingStart { timestamp_nanos: 0 }
    }

    #[test]
    fn default_accept_encodes_event_as_is() {
        let codecs = CodecRegistry::new();
        let (mime, value) = codecs.encode(&sample(), None);
        assert_eq!(mime, DEFAULT_MEDIA_TYPE);
        assert_eq!(value["type"], json!("THINKING_START"));
        assert!(value.get("event").is_none());
    }

    #[test]
    fn ag_ui_accept_wraps_event_in_envelope() {
        let codecs = CodecRegistry::new();
        let (mime, value) = codecs.encode(&sample(), Some(AG_UI_MEDIA_TYPE));
        assert_eq!(mime, AG_UI_MEDIA_TYPE);
        assert_eq!(value["type"], json!("THINKING_START"));
        assert_eq!(value["event"]["type"], json!("THINKING_START"));
    }

    #[test]
    fn unknown_accept_falls_back_to_default() {
        let codecs = CodecRegistry::new();
        let (mime, _) = codecs.encode(&sample(), Some("text/html"));
        assert_eq!(mime, DEFAULT_MEDIA_TYPE);
    }
}
