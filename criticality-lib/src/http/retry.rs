use super::{HttpRequest, HttpResponse, Transport};
use crate::Result;
use core::fmt::{Debug, Formatter};
use core::time::Duration;
use reqwest::header::RETRY_AFTER;
use std::sync::Arc;

const LOG_TARGET: &str = "     retry";

/// Total number of sends allowed for one request.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Delay applied after the first attempt when a strategy asks for [`RetryStrategy::RetryWithInitialDelay`].
pub const DEFAULT_INITIAL_DELAY: Duration = Duration::from_mins(2);

/// Verdict of a strategy classifier for a non-success response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
pub enum RetryStrategy {
    /// Not retryable as far as this classifier knows.
    NoRetry,

    /// Retry using the current backoff delay.
    RetryImmediate,

    /// Retry, waiting the configured initial delay if this was the first attempt.
    RetryWithInitialDelay,
}

type StrategyFn = Box<dyn Fn(&HttpResponse) -> Result<RetryStrategy> + Send + Sync>;

/// Policy consulted by [`RetryTransport`].
pub struct RetryOptions {
    /// Maximum number of sends, including the first.
    pub max_attempts: u32,

    /// Delay used for [`RetryStrategy::RetryWithInitialDelay`] on the first attempt.
    pub initial_delay: Duration,

    /// Computes the next delay from the previous one.
    pub backoff: fn(Duration) -> Duration,

    /// Extracts a mandatory wait from a response; `None` or zero means no explicit wait.
    pub retry_after: Option<fn(&HttpResponse) -> Option<Duration>>,

    strategies: Vec<StrategyFn>,
}

impl RetryOptions {
    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    #[must_use]
    pub const fn with_initial_delay(mut self, initial_delay: Duration) -> Self {
        self.initial_delay = initial_delay;
        self
    }

    /// Append a classifier to the end of the strategy chain.
    #[must_use]
    pub fn with_strategy<F>(mut self, strategy: F) -> Self
    where
        F: Fn(&HttpResponse) -> Result<RetryStrategy> + Send + Sync + 'static,
    {
        self.strategies.push(Box::new(strategy));
        self
    }

    /// Run the strategy chain; the first verdict other than `NoRetry` wins.
    pub(super) fn classify(&self, response: &HttpResponse) -> Result<RetryStrategy> {
        for strategy in &self.strategies {
            let verdict = strategy(response)?;
            if verdict != RetryStrategy::NoRetry {
                return Ok(verdict);
            }
        }

        Ok(RetryStrategy::NoRetry)
    }
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_delay: DEFAULT_INITIAL_DELAY,
            backoff: default_backoff,
            retry_after: Some(parse_retry_after),
            strategies: Vec::new(),
        }
    }
}

impl Debug for RetryOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RetryOptions")
            .field("max_attempts", &self.max_attempts)
            .field("initial_delay", &self.initial_delay)
            .field("retry_after", &self.retry_after.is_some())
            .field("strategies", &self.strategies.len())
            .finish_non_exhaustive()
    }
}

/// Start at one minute, then double.
#[must_use]
pub const fn default_backoff(previous: Duration) -> Duration {
    if previous.is_zero() {
        Duration::from_mins(1)
    } else {
        previous.saturating_mul(2)
    }
}

/// Read a `Retry-After` header expressed in whole seconds.
#[must_use]
pub fn parse_retry_after(response: &HttpResponse) -> Option<Duration> {
    let secs = response.headers.get(RETRY_AFTER)?.to_str().ok()?.trim().parse::<u64>().ok()?;
    (secs > 0).then_some(Duration::from_secs(secs))
}

/// A policy that only retries 5xx responses.
#[must_use]
pub fn server_error_retry_options(max_attempts: u32) -> RetryOptions {
    RetryOptions::default().with_max_attempts(max_attempts).with_strategy(server_error)
}

/// Retry any 5xx response.
pub fn server_error(response: &HttpResponse) -> Result<RetryStrategy> {
    if response.status.is_server_error() {
        Ok(RetryStrategy::RetryImmediate)
    } else {
        Ok(RetryStrategy::NoRetry)
    }
}

/// Attempt bookkeeping for one outbound request.
#[derive(Debug, Default)]
struct AttemptState {
    attempts: u32,
    delay: Duration,
}

/// A [`Transport`] decorator that retries according to [`RetryOptions`].
///
/// When attempts run out the last response (or transport error) is handed back unchanged, so
/// callers inspect status codes themselves.
#[derive(Clone)]
pub struct RetryTransport {
    inner: Arc<dyn Transport>,
    options: Arc<RetryOptions>,
}

impl Debug for RetryTransport {
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RetryTransport").field("options", &self.options).finish_non_exhaustive()
    }
}

impl RetryTransport {
    #[must_use]
    pub fn new(inner: Arc<dyn Transport>, options: RetryOptions) -> Self {
        Self {
            inner,
            options: Arc::new(options),
        }
    }

    /// Send `request`, retrying as the policy dictates.
    pub async fn send(&self, request: &HttpRequest) -> Result<HttpResponse> {
        let mut state = AttemptState::default();

        loop {
            if state.attempts > 0 {
                if !state.delay.is_zero() {
                    log::debug!(target: LOG_TARGET, "Waiting {:?} before retrying {}", state.delay, request.url);
                    tokio::time::sleep(state.delay).await;
                }
                state.delay = (self.options.backoff)(state.delay);
            }
            state.attempts += 1;
            let last_attempt = state.attempts >= self.options.max_attempts;

            let response = match self.inner.send(request).await {
                Ok(response) => response,
                Err(e) if last_attempt => return Err(e),
                Err(e) => {
                    log::warn!(target: LOG_TARGET, "Request to {} failed (attempt {}): {e:#}", request.url, state.attempts);
                    continue;
                }
            };

            if response.is_success() {
                return Ok(response);
            }

            if let Some(delay) = self.options.retry_after.and_then(|f| f(&response)) {
                log::warn!(target: LOG_TARGET, "Retry-After of {delay:?} requested by {}", request.url);
                state.delay = delay;
            } else {
                match self.options.classify(&response)? {
                    RetryStrategy::NoRetry => return Ok(response),
                    RetryStrategy::RetryWithInitialDelay if state.attempts == 1 => state.delay = self.options.initial_delay,
                    verdict => log::debug!(target: LOG_TARGET, "{verdict} for {} ({})", request.url, response.status),
                }
            }

            if last_attempt {
                log::warn!(
                    target: LOG_TARGET,
                    "Giving up on {} after {} attempts (status {})",
                    request.url,
                    state.attempts,
                    response.status
                );
                return Ok(response);
            }
        }
    }
}
