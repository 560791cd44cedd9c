//! HTTP event transport: delivery with retries, backpressure, circuit
//! breaking and observability, plus SSE framing and content negotiation.

mod circuit_breaker;
mod client;
mod content_negotiation;
mod metrics;
mod sse;

pub use circuit_breaker::{CircuitBreaker, CircuitState};
pub use client::{
    EventValidator, HttpTransport, NotAcceptableBody, RequestMiddleware, ResponseMiddleware, TransportConfig,
    TransportError, TransportErrorCode,
};
pub use content_negotiation::{negotiate, DEFAULT_MEDIA_TYPE};
pub use metrics::{MetricsCollector, TransportMetrics};
pub use sse::{decode_frame, encode_frame, split_frames, DecodedFrame, SseDecodeError};
