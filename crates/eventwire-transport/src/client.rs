//! HTTP event transport: `SendEvent`/`SendBatch`/`Ping` with retries,
//! circuit breaking and middleware.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use eventwire_contracts::Event;
use reqwest::Client;
use serde::Serialize;

use crate::circuit_breaker::CircuitBreaker;
use crate::metrics::{MetricsCollector, TransportMetrics};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorCode {
    InternalError,
    ValidationError,
    ResourceLimit,
    InvalidInput,
    NetworkError,
    CircuitOpen,
    SerializationError,
    ClientError,
    ServerError,
}

impl TransportErrorCode {
    /// Maps transport-only kinds onto the closed `ToolErrorCode` set:
    /// `CIRCUIT_OPEN -> DEPENDENCY_ERROR`, `SERIALIZATION_ERROR ->
    /// INTERNAL_ERROR`.
    pub fn to_tool_error_code(self) -> eventwire_errors::ToolErrorCode {
        use eventwire_errors::ToolErrorCode as T;
        match self {
            TransportErrorCode::InternalError => T::InternalError,
            TransportErrorCode::ValidationError => T::ValidationError,
            TransportErrorCode::ResourceLimit => T::ResourceLimit,
            TransportErrorCode::InvalidInput => T::InvalidInput,
            TransportErrorCode::NetworkError => T::NetworkError,
            TransportErrorCode::CircuitOpen => T::DependencyError,
            TransportErrorCode::SerializationError => T::InternalError,
            TransportErrorCode::ClientError => T::InvalidInput,
            TransportErrorCode::ServerError => T::InternalError,
        }
    }

    /// Whether a failure of this kind should consume a retry attempt.
    /// Circuit-open fails fast without consuming a retry slot.
    pub fn is_retryable(self) -> bool {
        matches!(self, TransportErrorCode::NetworkError | TransportErrorCode::ServerError)
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("{code:?}: {message}")]
pub struct TransportError {
    pub code: TransportErrorCode,
    pub message: String,
}

impl TransportError {
    pub fn new(code: TransportErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }
}

pub type RequestMiddleware = Arc<dyn Fn(&mut HashMap<String, String>) -> Result<(), TransportError> + Send + Sync>;
pub type ResponseMiddleware = Arc<dyn Fn(u16, &[u8]) -> Result<(), TransportError> + Send + Sync>;
pub type EventValidator = Arc<dyn Fn(&Event) -> Result<(), String> + Send + Sync>;

#[derive(Clone)]
pub struct TransportConfig {
    pub base_url: String,
    pub request_timeout: Duration,
    pub max_event_size: usize,
    pub max_batch_size: usize,
    pub enable_validation: bool,
    pub validator: Option<EventValidator>,
    pub max_retries: u32,
    pub retry_backoff: Duration,
    pub auth_token: Option<String>,
    pub headers: HashMap<String, String>,
    pub enable_circuit_breaker: bool,
    pub circuit_breaker_threshold: u32,
    pub circuit_breaker_timeout: Duration,
    pub enable_compression: bool,
    pub request_middleware: Vec<RequestMiddleware>,
    pub response_middleware: Vec<ResponseMiddleware>,
    pub enable_metrics: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            request_timeout: Duration::from_secs(30),
            max_event_size: 10 * 1024 * 1024,
            max_batch_size: 100,
            enable_validation: true,
            validator: None,
            max_retries: 3,
            retry_backoff: Duration::from_secs(1),
            auth_token: None,
            headers: HashMap::new(),
            enable_circuit_breaker: true,
            circuit_breaker_threshold: 5,
            circuit_breaker_timeout: Duration::from_secs(30),
            enable_compression: false,
            request_middleware: Vec::new(),
            response_middleware: Vec::new(),
            enable_metrics: true,
        }
    }
}

pub struct HttpTransport {
    config: TransportConfig,
    client: Client,
    breaker: CircuitBreaker,
    metrics: MetricsCollector,
    connected: AtomicBool,
    active_requests: AtomicU64,
    start_time: std::sync::Mutex<Option<Instant>>,
}

impl HttpTransport {
    pub fn new(config: TransportConfig) -> Result<Self, TransportError> {
        let mut builder = Client::builder().timeout(config.request_timeout);
        if config.enable_compression {
            builder = builder.gzip(true);
        }
        let client = builder
            .build()
            .map_err(|e| TransportError::new(TransportErrorCode::InternalError, e.to_string()))?;

        Ok(Self {
            breaker: CircuitBreaker::new(config.circuit_breaker_threshold, config.circuit_breaker_timeout),
            metrics: MetricsCollector::new(),
            connected: AtomicBool::new(false),
            active_requests: AtomicU64::new(0),
            start_time: std::sync::Mutex::new(None),
            client,
            config,
        })
    }

    /// `Start(ctx)`: probes `/health`; a failure only logs, since the
    /// server may come up later.
    pub async fn start(&self) {
        *self.start_time.lock().unwrap() = Some(Instant::now());
        match self.client.get(format!("{}/health", self.config.base_url)).send().await {
            Ok(response) if response.status().is_success() => {
                tracing::info!("transport started, health check ok");
            }
            Ok(response) => {
                tracing::warn!(status = %response.status(), "health check returned non-2xx at start");
            }
            Err(error) => {
                tracing::warn!(%error, "health check failed at start, server may come up later");
            }
        }
        self.connected.store(true, Ordering::Release);
    }

    /// `Stop()`: waits for in-flight requests to drain before flipping
    /// `connected` off.
    pub async fn stop(&self) {
        while self.active_requests.load(Ordering::Acquire) > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.connected.store(false, Ordering::Release);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub fn uptime(&self) -> Option<Duration> {
        self.start_time.lock().unwrap().map(|t| t.elapsed())
    }

    pub fn metrics(&self) -> TransportMetrics {
        self.metrics.snapshot()
    }

    pub async fn ping(&self) -> Result<(), TransportError> {
        let response = self
            .client
            .get(format!("{}/health", self.config.base_url))
            .send()
            .await
            .map_err(|e| TransportError::new(TransportErrorCode::NetworkError, e.to_string()))?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(TransportError::new(TransportErrorCode::ServerError, format!("health check returned {}", response.status())))
        }
    }

    fn validate_event(&self, event: &Event) -> Result<(), TransportError> {
        if !self.config.enable_validation {
            return Ok(());
        }
        if let Some(validator) = &self.config.validator {
            validator(event).map_err(|message| TransportError::new(TransportErrorCode::ValidationError, message))?;
        }
        Ok(())
    }

    pub async fn send_event(&self, event: &Event) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::new(TransportErrorCode::InternalError, "transport not connected"));
        }
        self.validate_event(event)?;

        let payload = Bytes::from(
            serde_json::to_vec(event)
                .map_err(|e| TransportError::new(TransportErrorCode::SerializationError, e.to_string()))?,
        );
        if payload.len() > self.config.max_event_size {
            return Err(TransportError::new(TransportErrorCode::ResourceLimit, format!("event of {} bytes exceeds max {}", payload.len(), self.config.max_event_size)));
        }

        self.send_with_retry("/events", payload).await
    }

    pub async fn send_batch(&self, events: &[Event]) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::new(TransportErrorCode::InternalError, "transport not connected"));
        }
        if events.is_empty() {
            return Err(TransportError::new(TransportErrorCode::InvalidInput, "batch must not be empty"));
        }
        if events.len() > self.config.max_batch_size {
            return Err(TransportError::new(TransportErrorCode::ResourceLimit, format!("batch of {} events exceeds max {}", events.len(), self.config.max_batch_size)));
        }

        let mut total_bytes = 0usize;
        for event in events {
            self.validate_event(event)?;
            total_bytes += serde_json::to_vec(event)
                .map_err(|e| TransportError::new(TransportErrorCode::SerializationError, e.to_string()))?
                .len();
        }
        if total_bytes > self.config.max_event_size {
            return Err(TransportError::new(TransportErrorCode::ResourceLimit, format!("batch of {total_bytes} bytes exceeds max event size {}", self.config.max_event_size)));
        }

        let payload = Bytes::from(
            serde_json::to_vec(events)
                .map_err(|e| TransportError::new(TransportErrorCode::SerializationError, e.to_string()))?,
        );
        self.send_with_retry("/batch", payload).await
    }

    async fn send_with_retry(&self, path: &str, payload: Bytes) -> Result<(), TransportError> {
        let mut attempt = 0u32;
        loop {
            if attempt > 0 {
                let delay = self.config.retry_backoff.mul_f64(2f64.powi(attempt as i32 - 1));
                tokio::time::sleep(delay).await;
            }

            match self.attempt_request(path, payload.clone()).await {
                Ok(()) => return Ok(()),
                Err(error) if error.code.is_retryable() && attempt < self.config.max_retries => {
                    attempt += 1;
                    tracing::debug!(attempt, %error, "retrying transport request");
                    continue;
                }
                Err(error) => return Err(error),
            }
        }
    }

    async fn attempt_request(&self, path: &str, payload: Bytes) -> Result<(), TransportError> {
        if self.config.enable_circuit_breaker && !self.breaker.should_allow() {
            return Err(TransportError::new(TransportErrorCode::CircuitOpen, "circuit breaker open"));
        }

        let mut headers = self.config.headers.clone();
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        if let Some(token) = &self.config.auth_token {
            headers.insert("Authorization".to_string(), format!("Bearer {token}"));
        }
        for middleware in &self.config.request_middleware {
            middleware(&mut headers)?;
        }

        self.active_requests.fetch_add(1, Ordering::AcqRel);
        self.metrics.record_request_start();
        let started = Instant::now();

        let mut request = self.client.post(format!("{}{path}", self.config.base_url)).body(payload.clone());
        for (key, value) in &headers {
            request = request.header(key, value);
        }

        let result = request.send().await;
        self.active_requests.fetch_sub(1, Ordering::AcqRel);
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

        let response = match result {
            Ok(response) => response,
            Err(error) => {
                if self.config.enable_circuit_breaker {
                    self.breaker.record_failure();
                }
                self.metrics.record_failure(elapsed_ms, "NETWORK_ERROR");
                return Err(TransportError::new(TransportErrorCode::NetworkError, error.to_string()));
            }
        };

        let status = response.status();
        let bytes_received = response.content_length().unwrap_or(0);
        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError::new(TransportErrorCode::NetworkError, e.to_string()))?;
        for middleware in &self.config.response_middleware {
            middleware(status.as_u16(), &body)?;
        }

        if status.is_success() {
            if self.config.enable_circuit_breaker {
                self.breaker.record_success();
            }
            self.metrics.record_success(elapsed_ms, payload.len() as u64, bytes_received);
            Ok(())
        } else if status.is_server_error() {
            if self.config.enable_circuit_breaker {
                self.breaker.record_failure();
            }
            self.metrics.record_failure(elapsed_ms, "SERVER_ERROR");
            Err(TransportError::new(TransportErrorCode::ServerError, format!("server returned {status}")))
        } else {
            self.metrics.record_failure(elapsed_ms, "CLIENT_ERROR");
            Err(TransportError::new(TransportErrorCode::ClientError, format!("client error {status}")))
        }
    }
}

#[derive(Serialize)]
pub struct NotAcceptableBody {
    pub error: &'static str,
    pub supported_types: Vec<&'static str>,
}

impl Default for NotAcceptableBody {
    fn default() -> Self {
        Self {
            error: "Not Acceptable",
            supported_types: vec!["application/json", "application/vnd.ag-ui+json"],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_error_codes_map_to_closed_tool_error_set() {
        assert_eq!(TransportErrorCode::CircuitOpen.to_tool_error_code(), eventwire_errors::ToolErrorCode::DependencyError);
        assert_eq!(TransportErrorCode::SerializationError.to_tool_error_code(), eventwire_errors::ToolErrorCode::InternalError);
    }

    #[test]
    fn circuit_open_is_not_retryable_and_does_not_consume_a_slot() {
        assert!(!TransportErrorCode::CircuitOpen.is_retryable());
        assert!(TransportErrorCode::ServerError.is_retryable());
        assert!(!TransportErrorCode::ClientError.is_retryable());
    }

    #[tokio::test]
    async fn send_event_rejects_when_not_connected() {
        let transport = HttpTransport::new(TransportConfig { base_url: "http://localhost:1".into(), ..Default::default() }).unwrap();
        let event = Event::ThinkingStart { timestamp_nanos: 0 };
        let err = transport.send_event(&event).await.unwrap_err();
        assert_eq!(err.code, TransportErrorCode::InternalError);
    }

    #[tokio::test]
    async fn send_batch_rejects_empty_batch() {
        let transport = HttpTransport::new(TransportConfig { base_url: "http://localhost:1".into(), ..Default::default() }).unwrap();
        transport.start().await;
        let err = transport.send_batch(&[]).await.unwrap_err();
        assert_eq!(err.code, TransportErrorCode::InvalidInput);
    }

    #[tokio::test]
    async fn send_batch_rejects_over_max_size() {
        let transport = HttpTransport::new(TransportConfig {
            base_url: "http://localhost:1".into(),
            max_batch_size: 1,
            ..Default::default()
        })
        .unwrap();
        transport.start().await;
        let events = vec![
            Event::ThinkingStart { timestamp_nanos: 0 },
            Event::ThinkingEnd { timestamp_nanos: 1 },
        ];
        let err = transport.send_batch(&events).await.unwrap_err();
        assert_eq!(err.code, TransportErrorCode::ResourceLimit);
    }
}
