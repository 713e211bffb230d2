//! HTTP plumbing shared by every upstream client.
//!
//! Requests go out through a [`Transport`]. The [`RetryTransport`] decorates any transport with
//! a retry policy: each non-success response is first checked for an explicit `Retry-After`
//! value and then handed to an ordered chain of strategy classifiers, the first of which to
//! return something other than [`RetryStrategy::NoRetry`] decides how the request is retried.
//!
//! Responses are fully buffered before classification so that strategies can inspect the body
//! without taking it away from the caller.

mod github_policy;
mod message;
mod retry;
mod transport;

pub use github_policy::{disguised_server_error, github_retry_options, github_server_error, secondary_rate_limit};
pub use message::{HttpRequest, HttpResponse};
pub use retry::{
    DEFAULT_INITIAL_DELAY, DEFAULT_MAX_ATTEMPTS, RetryOptions, RetryStrategy, RetryTransport, default_backoff,
    parse_retry_after, server_error, server_error_retry_options,
};
pub use transport::{ReqwestTransport, Transport};
