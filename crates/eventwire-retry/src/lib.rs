//! Per-`toolCallId` attempt tracking and jittered exponential backoff.
//!
//! `RetryManager` owns a map of `AttemptState` and decides, for each
//! failure, whether a caller should retry and after how long.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use eventwire_errors::{ToolError, ToolErrorCode};
use parking_lot::RwLock;
use rand::RngExt;

/// What the retry manager should do when a policy of `Prompt` is selected.
/// With no interactive handler attached, this falls through to `Retry`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPolicy {
    Retry,
    Abort,
    Prompt,
}

/// Hook for surfacing `RetryPolicy::Prompt` to an interactive embedder.
/// The default handler always resolves to `Retry`, matching the documented
/// fallback behaviour.
pub trait PromptPolicyHandler: Send + Sync {
    fn resolve(&self, tool_call_id: &str, error: &ToolError) -> RetryPolicy;
}

pub struct DefaultPromptPolicyHandler;

impl PromptPolicyHandler for DefaultPromptPolicyHandler {
    fn resolve(&self, _tool_call_id: &str, _error: &ToolError) -> RetryPolicy {
        RetryPolicy::Retry
    }
}

#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub on_error: RetryPolicy,
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    /// In `[0, 1]`.
    pub jitter_factor: f64,
    /// `None` disables the overall deadline.
    pub overall_timeout: Option<Duration>,
    pub per_attempt_timeout: Option<Duration>,
    pub reset_after: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            on_error: RetryPolicy::Retry,
            max_retries: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
            overall_timeout: None,
            per_attempt_timeout: None,
            reset_after: Duration::from_secs(60),
        }
    }
}

/// Owned exclusively by `RetryManager`; never constructed by callers.
#[derive(Debug, Clone)]
pub struct AttemptState {
    pub first_attempt: Instant,
    pub last_attempt: Instant,
    pub attempt_count: u32,
    pub last_error: Option<ToolError>,
    pub current_delay: Duration,
}

impl AttemptState {
    fn new(now: Instant, initial_delay: Duration) -> Self {
        Self {
            first_attempt: now,
            last_attempt: now,
            attempt_count: 0,
            last_error: None,
            current_delay: initial_delay,
        }
    }
}

#[derive(Debug, Clone)]
pub enum RetryDecision {
    Retry { delay: Duration, error: ToolError },
    Terminal(ToolError),
    Cancelled(ToolError),
}

pub struct RetryManager {
    config: RetryConfig,
    attempts: Arc<RwLock<HashMap<String, AttemptState>>>,
    prompt_handler: Arc<dyn PromptPolicyHandler>,
}

impl RetryManager {
    pub fn new(config: RetryConfig) -> Self {
        Self::with_prompt_handler(config, Arc::new(DefaultPromptPolicyHandler))
    }

    pub fn with_prompt_handler(config: RetryConfig, prompt_handler: Arc<dyn PromptPolicyHandler>) -> Self {
        Self {
            config,
            attempts: Arc::new(RwLock::new(HashMap::new())),
            prompt_handler,
        }
    }

    /// Decides whether to retry. `cancelled` stands in for an external
    /// cancellation signal — the caller owns the actual primitive and just
    /// tells us whether it already fired.
    pub fn should_retry(&self, tool_call_id: &str, mut error: ToolError, cancelled: bool) -> RetryDecision {
        let now = Instant::now();
        let mut attempts = self.attempts.write();
        let state = attempts
            .entry(tool_call_id.to_string())
            .or_insert_with(|| AttemptState::new(now, self.config.initial_delay));

        state.last_attempt = now;
        state.attempt_count += 1;
        error.attempt_number = state.attempt_count;
        error.max_attempts = self.config.max_retries + 1;
        state.last_error = Some(error.clone());

        if cancelled {
            return RetryDecision::Cancelled(error);
        }

        let effective_policy = match self.config.on_error {
            RetryPolicy::Prompt => self.prompt_handler.resolve(tool_call_id, &error),
            other => other,
        };
        if effective_policy == RetryPolicy::Abort {
            return RetryDecision::Terminal(error);
        }

        if !error.should_retry() {
            return RetryDecision::Terminal(error);
        }

        if self.config.max_retries > 0 && error.attempt_number > self.config.max_retries {
            return RetryDecision::Terminal(error);
        }

        if let Some(overall) = self.config.overall_timeout {
            if now.duration_since(state.first_attempt) > overall {
                error.code = ToolErrorCode::Timeout;
                error.is_retryable = false;
                return RetryDecision::Terminal(error);
            }
        }

        let delay = compute_delay(state, &error, &self.config);
        RetryDecision::Retry { delay, error }
    }

    /// Reports the call's total duration and schedules cleanup of the
    /// attempt state after `reset_after` so a late retry on the same
    /// `toolCallId` starts fresh.
    pub fn record_success(&self, tool_call_id: &str) -> Option<Duration> {
        let now = Instant::now();
        let duration = {
            let attempts = self.attempts.read();
            attempts.get(tool_call_id).map(|state| now.duration_since(state.first_attempt))
        };

        let attempts = Arc::clone(&self.attempts);
        let id = tool_call_id.to_string();
        let reset_after = self.config.reset_after;
        tokio::spawn(async move {
            tokio::time::sleep(reset_after).await;
            attempts.write().remove(&id);
            tracing::debug!(tool_call_id = %id, "attempt state reset after success");
        });

        duration
    }

    pub fn attempt_count(&self, tool_call_id: &str) -> u32 {
        self.attempts.read().get(tool_call_id).map(|s| s.attempt_count).unwrap_or(0)
    }

    /// Clears all tracked attempt state; in-flight retries already holding
    /// a cloned decision are unaffected.
    pub fn reset(&self) {
        self.attempts.write().clear();
    }
}

fn compute_delay(state: &mut AttemptState, error: &ToolError, config: &RetryConfig) -> Duration {
    let base = if let Some(retry_after) = error.retry_after {
        Duration::from_secs(retry_after)
    } else if error.attempt_number <= 1 {
        config.initial_delay
    } else {
        let next_millis = state.current_delay.as_secs_f64() * config.backoff_multiplier;
        Duration::from_secs_f64(next_millis).min(config.max_delay)
    };
    state.current_delay = base;
    apply_jitter(base, config.jitter_factor)
}

/// Random value in `[delay * (1 - factor), delay * (1 + factor)]`, floored
/// at zero. `factor = 0` returns `delay` unchanged.
fn apply_jitter(delay: Duration, factor: f64) -> Duration {
    if factor <= 0.0 {
        return delay;
    }
    let millis = delay.as_secs_f64() * 1000.0;
    let low = (millis * (1.0 - factor)).max(0.0);
    let high = (millis * (1.0 + factor)).max(low);
    let jittered = rand::rng().random_range(low..=high);
    Duration::from_secs_f64(jittered.max(0.0) / 1000.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn network_error(attempt: u32) -> ToolError {
        let mut error = ToolError::new("call-1", "fetch", ToolErrorCode::NetworkError, "connection refused");
        error.is_retryable = true;
        error.attempt_number = attempt;
        error
    }

    #[test]
    fn backoff_is_deterministic_with_zero_jitter() {
        let config = RetryConfig {
            jitter_factor: 0.0,
            initial_delay: Duration::from_millis(10),
            backoff_multiplier: 2.0,
            max_delay: Duration::from_secs(10),
            max_retries: 5,
            ..RetryConfig::default()
        };
        let manager = RetryManager::new(config);

        let mut delays = Vec::new();
        for _ in 0..4 {
            match manager.should_retry("call-1", network_error(0), false) {
                RetryDecision::Retry { delay, .. } => delays.push(delay),
                other => panic!("expected retry, got {other:?}"),
            }
        }

        assert_eq!(
            delays,
            vec![
                Duration::from_millis(10),
                Duration::from_millis(20),
                Duration::from_millis(40),
                Duration::from_millis(80),
            ]
        );
    }

    #[test]
    fn validation_errors_are_terminal_even_when_retries_remain() {
        let manager = RetryManager::new(RetryConfig::default());
        let mut error = ToolError::new("call-1", "write", ToolErrorCode::ValidationError, "invalid input");
        error.is_retryable = true;
        match manager.should_retry("call-1", error, false) {
            RetryDecision::Terminal(e) => assert_eq!(e.code, ToolErrorCode::ValidationError),
            other => panic!("expected terminal, got {other:?}"),
        }
    }

    #[test]
    fn abort_policy_is_terminal_on_first_failure() {
        let config = RetryConfig {
            on_error: RetryPolicy::Abort,
            ..RetryConfig::default()
        };
        let manager = RetryManager::new(config);
        match manager.should_retry("call-1", network_error(0), false) {
            RetryDecision::Terminal(_) => {}
            other => panic!("expected terminal, got {other:?}"),
        }
    }

    #[test]
    fn cancellation_short_circuits_retry() {
        let manager = RetryManager::new(RetryConfig::default());
        match manager.should_retry("call-1", network_error(0), true) {
            RetryDecision::Cancelled(_) => {}
            other => panic!("expected cancelled, got {other:?}"),
        }
    }

    #[test]
    fn exceeding_max_retries_is_terminal() {
        let config = RetryConfig {
            max_retries: 2,
            jitter_factor: 0.0,
            ..RetryConfig::default()
        };
        let manager = RetryManager::new(config);
        manager.should_retry("call-1", network_error(0), false);
        manager.should_retry("call-1", network_error(0), false);
        match manager.should_retry("call-1", network_error(0), false) {
            RetryDecision::Terminal(e) => assert_eq!(e.attempt_number, 3),
            other => panic!("expected terminal, got {other:?}"),
        }
    }

    #[test]
    fn rate_limit_retry_after_overrides_backoff() {
        let manager = RetryManager::new(RetryConfig { jitter_factor: 0.0, ..RetryConfig::default() });
        let mut error = ToolError::new("call-1", "fetch", ToolErrorCode::RateLimit, "429 too many requests");
        error.is_retryable = true;
        error.retry_after = Some(30);
        match manager.should_retry("call-1", error, false) {
            RetryDecision::Retry { delay, .. } => assert_eq!(delay, Duration::from_secs(30)),
            other => panic!("expected retry, got {other:?}"),
        }
    }
}
