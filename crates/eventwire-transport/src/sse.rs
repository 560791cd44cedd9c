//! Server-sent-event framing: encode an `Event` into `event:`/`id:`/`data:`
//! lines, and decode the inverse.

use eventwire_contracts::Event;

/// Replaces the internal `timestampNanos` field with a wire `timestamp`
/// field in whole milliseconds.
fn truncate_timestamp_to_millis(mut value: serde_json::Value) -> serde_json::Value {
    if let serde_json::Value::Object(map) = &mut value {
        if let Some(nanos) = map.remove("timestampNanos").and_then(|v| v.as_i64()) {
            map.insert("timestamp".to_string(), serde_json::Value::from(nanos / 1_000_000));
        }
    }
    value
}

/// Inverse of [`truncate_timestamp_to_millis`]: restores a `timestampNanos`
/// field (scaled back up) so the payload deserializes into an `Event`.
/// Sub-millisecond precision lost on encode is not recoverable.
fn restore_timestamp_from_millis(mut value: serde_json::Value) -> serde_json::Value {
    if let serde_json::Value::Object(map) = &mut value {
        if let Some(millis) = map.remove("timestamp").and_then(|v| v.as_i64()) {
            map.insert("timestampNanos".to_string(), serde_json::Value::from(millis * 1_000_000));
        }
    }
    value
}

/// Escapes newlines inside a JSON payload so the record stays one line per
/// field: `\n -> "\\n"`, `\r -> "\\r"`.
fn escape_payload(payload: &str) -> String {
    payload.replace('\\', "\\\\").replace('\n', "\\n").replace('\r', "\\r")
}

fn unescape_payload(payload: &str) -> String {
    let mut result = String::with_capacity(payload.len());
    let mut chars = payload.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.peek() {
                Some('n') => {
                    result.push('\n');
                    chars.next();
                }
                Some('r') => {
                    result.push('\r');
                    chars.next();
                }
                Some('\\') => {
                    result.push('\\');
                    chars.next();
                }
                _ => result.push('\\'),
            }
        } else {
            result.push(c);
        }
    }
    result
}

/// Encodes one event as a complete SSE frame, terminated by a blank line.
pub fn encode_frame(event: &Event, explicit_id: Option<&str>) -> Result<String, serde_json::Error> {
    let wire_value = truncate_timestamp_to_millis(serde_json::to_value(event)?);
    let payload = serde_json::to_string(&wire_value)?;
    let id = explicit_id
        .map(str::to_string)
        .unwrap_or_else(|| format!("{}_{}", event.type_name(), event.timestamp_nanos()));

    Ok(format!(
        "event: {}\nid: {}\ndata: {}\n\n",
        event.type_name(),
        id,
        escape_payload(&payload)
    ))
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecodedFrame {
    pub event_type: String,
    pub id: String,
    pub event: Event,
}

#[derive(Debug, thiserror::Error)]
pub enum SseDecodeError {
    #[error("frame missing required field: {0}")]
    MissingField(&'static str),
    #[error("failed to parse data payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),
}

/// Decodes one frame's worth of lines (already split on the blank-line
/// terminator) back into an `Event`.
pub fn decode_frame(frame: &str) -> Result<DecodedFrame, SseDecodeError> {
    let mut event_type = None;
    let mut id = None;
    let mut data = None;

    for line in frame.lines() {
        if let Some(value) = line.strip_prefix("event: ") {
            event_type = Some(value.to_string());
        } else if let Some(value) = line.strip_prefix("id: ") {
            id = Some(value.to_string());
        } else if let Some(value) = line.strip_prefix("data: ") {
            data = Some(value.to_string());
        }
    }

    let event_type = event_type.ok_or(SseDecodeError::MissingField("event"))?;
    let id = id.ok_or(SseDecodeError::MissingField("id"))?;
    let data = data.ok_or(SseDecodeError::MissingField("data"))?;

    let unescaped = unescape_payload(&data);
    let value: serde_json::Value = serde_json::from_str(&unescaped)?;
    let event: Event = serde_json::from_value(restore_timestamp_from_millis(value))?;

    Ok(DecodedFrame { event_type, id, event })
}

/// Encodes `event` and writes it to `writer`, flushing once the frame is
/// fully written. `writer` is any `AsyncWrite` sink that supports an
/// explicit flush (a TCP stream, a buffered file, an in-memory `Vec<u8>`).
pub async fn write_frame<W>(writer: &mut W, event: &Event, explicit_id: Option<&str>) -> std::io::Result<()>
where
    W: tokio::io::AsyncWrite + Unpin,
{
    use tokio::io::AsyncWriteExt;

    let frame = encode_frame(event, explicit_id).map_err(std::io::Error::other)?;
    writer.write_all(frame.as_bytes()).await?;
    writer.flush().await
}

/// Splits a raw SSE byte stream buffer into complete frames (ending in a
/// blank line) and the unconsumed remainder.
pub fn split_frames(buffer: &str) -> (Vec<&str>, &str) {
    let mut frames = Vec::new();
    let mut rest = buffer;
    while let Some(pos) = rest.find("\n\n") {
        frames.push(&rest[..pos]);
        rest = &rest[pos + 2..];
    }
    (frames, rest)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event() -> Event {
        Event::ToolCallStart {
            tool_call_id: "call-1".into(),
            tool_name: "fetch".into(),
            timestamp_nanos: 2_000_000,
        }
    }

    #[test]
    fn frame_round_trips() {
        let event = sample_event();
        let frame = encode_frame(&event, None).unwrap();
        let (frames, rest) = split_frames(&frame);
        assert_eq!(frames.len(), 1);
        assert_eq!(rest, "");
        let decoded = decode_frame(frames[0]).unwrap();
        assert_eq!(decoded.event, event);
        assert_eq!(decoded.event_type, "TOOL_CALL_START");
    }

    #[test]
    fn data_payload_carries_millisecond_timestamp() {
        let event = sample_event();
        let frame = encode_frame(&event, None).unwrap();
        assert!(frame.contains("\"timestamp\":2"));
        assert!(!frame.contains("timestampNanos"));
    }

    #[test]
    fn escapes_newlines_in_payload() {
        let event = Event::ThinkingContent {
            content: "line one\nline two\r\n".into(),
            timestamp_nanos: 0,
        };
        let frame = encode_frame(&event, None).unwrap();
        assert_eq!(frame.matches('\n').count(), 4);
        let (frames, _) = split_frames(&frame);
        let decoded = decode_frame(frames[0]).unwrap();
        assert_eq!(decoded.event, event);
    }

    #[test]
    fn synthesises_id_when_absent() {
        let event = sample_event();
        let frame = encode_frame(&event, None).unwrap();
        assert!(frame.contains("id: TOOL_CALL_START_2000000"));
    }

    #[test]
    fn explicit_id_is_preserved() {
        let event = sample_event();
        let frame = encode_frame(&event, Some("custom-id")).unwrap();
        assert!(frame.contains("id: custom-id"));
    }

    #[tokio::test]
    async fn write_frame_flushes_and_matches_encode_frame() {
        let event = sample_event();
        let mut buffer: Vec<u8> = Vec::new();
        write_frame(&mut buffer, &event, None).await.unwrap();

        let expected = encode_frame(&event, None).unwrap();
        assert_eq!(buffer, expected.as_bytes());
    }

    #[test]
    fn split_frames_leaves_partial_remainder() {
        let event = sample_event();
        let frame = encode_frame(&event, None).unwrap();
        let mut buffer = frame.clone();
        buffer.push_str("event: PARTIAL");
        let (frames, rest) = split_frames(&buffer);
        assert_eq!(frames.len(), 1);
        assert_eq!(rest, "event: PARTIAL");
    }
}
