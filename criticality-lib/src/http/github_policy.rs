use super::{HttpResponse, RetryOptions, RetryStrategy};
use crate::Result;
use core::time::Duration;
use regex::Regex;
use reqwest::StatusCode;
use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use std::sync::LazyLock;

const LOG_TARGET: &str = "    github";

/// Marker GitHub embeds in the HTML error page it sometimes serves with a 400 for an internal failure.
const ERROR_500_MARKER: &str = "\"error_500\"";

/// Read-only endpoints whose 5xx responses are usually genuine defects rather than overload.
static NO_RETRY_PATHS: LazyLock<[Regex; 2]> = LazyLock::new(|| {
    [
        Regex::new("(^|/)repos/[^/]+/[^/]+/issues$").expect("valid issues pattern"),
        Regex::new("(^|/)repos/[^/]+/[^/]+/issues/comments$").expect("valid issue comments pattern"),
    ]
});

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,

    #[serde(default)]
    documentation_url: String,
}

/// The retry policy used for GitHub's REST and GraphQL endpoints.
#[must_use]
pub fn github_retry_options(max_attempts: u32, initial_delay: Duration) -> RetryOptions {
    RetryOptions::default()
        .with_max_attempts(max_attempts)
        .with_initial_delay(initial_delay)
        .with_strategy(secondary_rate_limit)
        .with_strategy(disguised_server_error)
        .with_strategy(github_server_error)
}

/// A 403 whose documentation link points at the abuse or secondary rate limit docs.
pub fn secondary_rate_limit(response: &HttpResponse) -> Result<RetryStrategy> {
    if response.status != StatusCode::FORBIDDEN {
        return Ok(RetryStrategy::NoRetry);
    }

    let body: ErrorBody = serde_json::from_slice(&response.body).unwrap_or_default();
    log::warn!(
        target: LOG_TARGET,
        "403 from {}: {} ({})",
        response.url,
        body.message,
        body.documentation_url
    );

    if body.documentation_url.ends_with("#abuse-rate-limits") || body.documentation_url.ends_with("#secondary-rate-limits") {
        log::warn!(target: LOG_TARGET, "Secondary rate limit hit");
        return Ok(RetryStrategy::RetryWithInitialDelay);
    }

    Ok(RetryStrategy::NoRetry)
}

/// A 400 carrying GitHub's HTML "error 500" page.
pub fn disguised_server_error(response: &HttpResponse) -> Result<RetryStrategy> {
    if response.status != StatusCode::BAD_REQUEST {
        return Ok(RetryStrategy::NoRetry);
    }
    if response.header(CONTENT_TYPE.as_str()) != Some("text/html") {
        return Ok(RetryStrategy::NoRetry);
    }

    if response.body_contains(ERROR_500_MARKER) {
        log::debug!(target: LOG_TARGET, "400 from {} is a disguised 500", response.url);
        Ok(RetryStrategy::RetryImmediate)
    } else {
        Ok(RetryStrategy::NoRetry)
    }
}

/// Any 5xx, except for the issue and issue-comment listings.
pub fn github_server_error(response: &HttpResponse) -> Result<RetryStrategy> {
    if !response.status.is_server_error() {
        return Ok(RetryStrategy::NoRetry);
    }

    log::warn!(target: LOG_TARGET, "{} from {}", response.status, response.url);
    let path = response.url.path().trim_matches('/');
    if NO_RETRY_PATHS.iter().any(|re| re.is_match(path)) {
        log::warn!(target: LOG_TARGET, "Not retrying server error for '{path}'");
        return Ok(RetryStrategy::NoRetry);
    }

    Ok(RetryStrategy::RetryImmediate)
}
