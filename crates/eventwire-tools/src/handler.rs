//! Single-flight, idempotent, cancelable tool call handler.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use eventwire_contracts::{ToolCallRequest, ToolCallResponse};
use eventwire_errors::Classifier;
use eventwire_retry::{RetryDecision, RetryManager};
use tokio::sync::{Mutex, Notify};

use crate::cancel::CancelHandle;
use crate::executor::ToolExecutor;
use crate::metrics::{ToolCallMetrics, ToolCallMetricsCollector};

#[derive(Debug, thiserror::Error)]
pub enum ToolHandlerError {
    #[error("unknown toolCallId")]
    NotFound,
}

struct CallState {
    response: Mutex<Option<ToolCallResponse>>,
    done_notify: Notify,
    done: AtomicBool,
    cancel: CancelHandle,
}

impl CallState {
    fn new() -> Self {
        Self {
            response: Mutex::new(None),
            done_notify: Notify::new(),
            done: AtomicBool::new(false),
            cancel: CancelHandle::new(),
        }
    }

    async fn finish(&self, response: ToolCallResponse) {
        *self.response.lock().await = Some(response);
        self.done.store(true, Ordering::Release);
        self.done_notify.notify_waiters();
    }

    async fn wait(&self) -> ToolCallResponse {
        loop {
            if self.done.load(Ordering::Acquire) {
                return self.response.lock().await.clone().expect("done implies response set");
            }
            self.done_notify.notified().await;
        }
    }
}

pub struct ToolCallHandlerConfig {
    pub per_attempt_timeout: Option<Duration>,
}

impl Default for ToolCallHandlerConfig {
    fn default() -> Self {
        Self { per_attempt_timeout: None }
    }
}

pub struct ToolCallHandler<E> {
    executor: E,
    retry_manager: Arc<RetryManager>,
    classifier: Arc<Classifier>,
    config: ToolCallHandlerConfig,
    active_calls: DashMap<String, Arc<CallState>>,
    metrics: ToolCallMetricsCollector,
}

impl<E: ToolExecutor> ToolCallHandler<E> {
    pub fn new(executor: E, retry_manager: Arc<RetryManager>, classifier: Arc<Classifier>, config: ToolCallHandlerConfig) -> Self {
        Self {
            executor,
            retry_manager,
            classifier,
            config,
            active_calls: DashMap::new(),
            metrics: ToolCallMetricsCollector::new(),
        }
    }

    pub fn metrics(&self) -> ToolCallMetrics {
        self.metrics.snapshot()
    }

    pub async fn handle_tool_call(&self, request: ToolCallRequest) -> ToolCallResponse {
        let tool_call_id = request.tool_call_id.clone();

        let state = match self.active_calls.entry(tool_call_id.clone()) {
            Entry::Occupied(occupied) => {
                let state = occupied.get().clone();
                drop(occupied);
                return state.wait().await;
            }
            Entry::Vacant(vacant) => {
                let state = Arc::new(CallState::new());
                vacant.insert(state.clone());
                state
            }
        };

        let response = self.run_attempts(request, &state).await;
        state.finish(response.clone()).await;
        response
    }

    async fn run_attempts(&self, request: ToolCallRequest, state: &CallState) -> ToolCallResponse {
        let started = Instant::now();
        let mut attempt_count: u32 = 1;

        loop {
            let exec_result = match self.config.per_attempt_timeout {
                Some(timeout) => match tokio::time::timeout(timeout, self.executor.execute(&request, &state.cancel)).await {
                    Ok(result) => result,
                    Err(_) => Err("deadline exceeded".to_string()),
                },
                None => self.executor.execute(&request, &state.cancel).await,
            };

            match exec_result {
                Ok(value) => {
                    let duration = started.elapsed().as_millis() as u64;
                    self.metrics.record_call(true, attempt_count);
                    self.retry_manager.record_success(&request.tool_call_id);
                    return ToolCallResponse::success(request.tool_call_id, request.tool_name, value, duration, attempt_count);
                }
                Err(message) => {
                    let raw_error = self.classifier.classify(&message, &request.tool_name, &request.tool_call_id, attempt_count, attempt_count);
                    let cancelled = state.cancel.is_cancelled();
                    match self.retry_manager.should_retry(&request.tool_call_id, raw_error, cancelled) {
                        RetryDecision::Retry { delay, .. } => {
                            tokio::select! {
                                _ = tokio::time::sleep(delay) => {}
                                _ = state.cancel.cancelled() => {}
                            }
                            if state.cancel.is_cancelled() {
                                let duration = started.elapsed().as_millis() as u64;
                                self.metrics.record_call(false, attempt_count);
                                let error = self.classifier.classify("cancelled", &request.tool_name, &request.tool_call_id, attempt_count, attempt_count);
                                return ToolCallResponse::failure(request.tool_call_id, request.tool_name, error, duration, attempt_count);
                            }
                            attempt_count += 1;
                            continue;
                        }
                        RetryDecision::Terminal(error) | RetryDecision::Cancelled(error) => {
                            let duration = started.elapsed().as_millis() as u64;
                            self.metrics.record_call(false, error.attempt_number);
                            return ToolCallResponse::failure(request.tool_call_id, request.tool_name, error, duration, attempt_count);
                        }
                    }
                }
            }
        }
    }

    /// `CancelToolCall(id)`.
    pub fn cancel_tool_call(&self, tool_call_id: &str) -> Result<(), ToolHandlerError> {
        match self.active_calls.get(tool_call_id) {
            Some(state) => {
                state.cancel.cancel();
                Ok(())
            }
            None => Err(ToolHandlerError::NotFound),
        }
    }

    /// Clears metrics and the active-call table. Any in-flight call keeps
    /// running but its state is orphaned — callers lose the ability to
    /// dedupe or cancel it through this handler.
    pub fn reset(&self) {
        self.metrics.reset();
        self.active_calls.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use eventwire_retry::RetryConfig;
    use serde_json::{json, Value};
    use std::sync::atomic::AtomicU32;
    use std::sync::Mutex as StdMutex;

    struct FlakyExecutor {
        failures_remaining: AtomicU32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl ToolExecutor for FlakyExecutor {
        async fn execute(&self, _request: &ToolCallRequest, _cancel: &CancelHandle) -> Result<Value, String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failures_remaining.load(Ordering::SeqCst) > 0 {
                self.failures_remaining.fetch_sub(1, Ordering::SeqCst);
                Err("network error".to_string())
            } else {
                Ok(json!({"ok": true}))
            }
        }
    }

    struct SlowExecutor {
        delay: Duration,
        calls: AtomicU32,
    }

    #[async_trait]
    impl ToolExecutor for SlowExecutor {
        async fn execute(&self, _request: &ToolCallRequest, _cancel: &CancelHandle) -> Result<Value, String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok(json!({"ok": true}))
        }
    }

    struct ValidationFailingExecutor;

    #[async_trait]
    impl ToolExecutor for ValidationFailingExecutor {
        async fn execute(&self, _request: &ToolCallRequest, _cancel: &CancelHandle) -> Result<Value, String> {
            Err("validation failed: invalid input".to_string())
        }
    }

    fn retry_manager(max_retries: u32) -> Arc<RetryManager> {
        Arc::new(RetryManager::new(RetryConfig {
            max_retries,
            initial_delay: Duration::from_millis(1),
            jitter_factor: 0.0,
            backoff_multiplier: 1.0,
            ..RetryConfig::default()
        }))
    }

    fn request(id: &str) -> ToolCallRequest {
        ToolCallRequest {
            tool_call_id: id.to_string(),
            tool_name: "fetch".to_string(),
            arguments: Value::Null,
        }
    }

    #[tokio::test]
    async fn succeeds_after_two_failures() {
        let executor = FlakyExecutor { failures_remaining: AtomicU32::new(2), calls: AtomicU32::new(0) };
        let handler = ToolCallHandler::new(executor, retry_manager(3), Arc::new(Classifier::new()), ToolCallHandlerConfig::default());
        let response = handler.handle_tool_call(request("call-1")).await;
        assert!(response.is_success());
        assert_eq!(response.attempt_count, 3);
        let metrics = handler.metrics();
        assert_eq!(metrics.successful_calls, 1);
        assert_eq!(metrics.retried_calls, 1);
    }

    #[tokio::test]
    async fn validation_failure_does_not_retry() {
        let handler = ToolCallHandler::new(ValidationFailingExecutor, retry_manager(3), Arc::new(Classifier::new()), ToolCallHandlerConfig::default());
        let response = handler.handle_tool_call(request("call-1")).await;
        assert!(!response.is_success());
        assert_eq!(response.attempt_count, 1);
        assert_eq!(response.error.unwrap().code, eventwire_errors::ToolErrorCode::ValidationError);
    }

    #[tokio::test]
    async fn concurrent_identical_calls_execute_the_tool_once() {
        let executor = Arc::new(SlowExecutor { delay: Duration::from_millis(50), calls: AtomicU32::new(0) });
        let handler = Arc::new(ToolCallHandler::new(
            CountingExecutorHandle(executor.clone()),
            retry_manager(3),
            Arc::new(Classifier::new()),
            ToolCallHandlerConfig::default(),
        ));

        let responses = StdMutex::new(Vec::new());
        let mut tasks = Vec::new();
        for _ in 0..3 {
            let handler = handler.clone();
            tasks.push(tokio::spawn(async move { handler.handle_tool_call(request("call-1")).await }));
        }
        for task in tasks {
            responses.lock().unwrap().push(task.await.unwrap());
        }

        assert_eq!(executor.calls.load(Ordering::SeqCst), 1);
        let responses = responses.into_inner().unwrap();
        assert!(responses.windows(2).all(|w| w[0].result == w[1].result));
    }

    struct CountingExecutorHandle(Arc<SlowExecutor>);

    #[async_trait]
    impl ToolExecutor for CountingExecutorHandle {
        async fn execute(&self, request: &ToolCallRequest, cancel: &CancelHandle) -> Result<Value, String> {
            self.0.execute(request, cancel).await
        }
    }

    #[tokio::test]
    async fn cancel_unknown_call_returns_not_found() {
        let handler = ToolCallHandler::new(ValidationFailingExecutor, retry_manager(3), Arc::new(Classifier::new()), ToolCallHandlerConfig::default());
        assert!(matches!(handler.cancel_tool_call("missing"), Err(ToolHandlerError::NotFound)));
    }

    #[tokio::test]
    async fn per_attempt_timeout_surfaces_as_timeout_error() {
        let executor = SlowExecutor { delay: Duration::from_millis(100), calls: AtomicU32::new(0) };
        let handler = ToolCallHandler::new(
            executor,
            retry_manager(0),
            Arc::new(Classifier::new()),
            ToolCallHandlerConfig { per_attempt_timeout: Some(Duration::from_millis(20)) },
        );
        let response = handler.handle_tool_call(request("call-1")).await;
        let error = response.error.unwrap();
        assert_eq!(error.code, eventwire_errors::ToolErrorCode::Timeout);
    }
}
