//! Remote fetcher - read-only section fetches with retry and cancellation.
//!
//! [`RemoteFetcher`] owns the retry policy: every underlying remote call is
//! retried on throttling and transient failures with capped exponential
//! backoff plus jitter. Both the call itself and the backoff sleep are raced
//! against the request's [`CancelToken`], which makes them the only suspension
//! points in a collection run.

use crate::cancel::CancelToken;
use crate::model::ErrorKind;
use crate::registry::SectionKind;
use crate::sections::{self, SectionRecord};
use crate::traits::{ApiClient, ApiError, ApiRequest};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument, warn};

// ============================================================================
// Errors
// ============================================================================

/// Failure of a section fetch, after retries.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("Rate limited: {0}")]
    RateLimited(String),
    #[error("Transient failure: {0}")]
    Transient(String),
    #[error("Not authorized: {0}")]
    NotAuthorized(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Malformed payload: {0}")]
    Malformed(String),
    #[error("Cancelled")]
    Cancelled,
}

impl FetchError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FetchError::RateLimited(_) => ErrorKind::RateLimited,
            FetchError::Transient(_) => ErrorKind::Transient,
            FetchError::NotAuthorized(_) => ErrorKind::NotAuthorized,
            FetchError::NotFound(_) => ErrorKind::NotFound,
            FetchError::Malformed(_) => ErrorKind::Malformed,
            FetchError::Cancelled => ErrorKind::Cancelled,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}

impl From<ApiError> for FetchError {
    fn from(err: ApiError) -> Self {
        let message = err.to_string();
        match err {
            ApiError::Throttled(_) => FetchError::RateLimited(message),
            ApiError::AccessDenied(_) => FetchError::NotAuthorized(message),
            ApiError::NotFound(_) => FetchError::NotFound(message),
            ApiError::Timeout(_) | ApiError::Network(_) => FetchError::Transient(message),
            ApiError::Service { code, .. } => classify_service_code(&code, message),
        }
    }
}

/// Maps a remote error code onto the fetch taxonomy.
fn classify_service_code(code: &str, message: String) -> FetchError {
    match code {
        "Throttling" | "ThrottlingException" | "RequestLimitExceeded"
        | "TooManyRequestsException" | "SlowDown" => FetchError::RateLimited(message),
        "UnauthorizedOperation" | "AuthFailure" | "AccessDenied" | "AccessDeniedException"
        | "OptInRequired" => FetchError::NotAuthorized(message),
        "InternalError" | "InternalFailure" | "ServiceUnavailable" | "Unavailable"
        | "DirectConnectServerException" => FetchError::Transient(message),
        _ if code.ends_with(".NotFound") || code.ends_with("NotFoundException") => {
            FetchError::NotFound(message)
        }
        _ => FetchError::Malformed(message),
    }
}

// ============================================================================
// Retry policy
// ============================================================================

/// Capped exponential backoff with jitter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts per remote call, including the first
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub factor: u32,
    pub max_delay_ms: u64,
    /// Upper bound of the random extra delay, as a fraction of the delay
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 200,
            factor: 2,
            max_delay_ms: 2_000,
            jitter: 0.25,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Deterministic delay before retry number `retry` (0-based), without jitter.
    pub fn backoff(&self, retry: u32) -> Duration {
        let multiplier = u64::from(self.factor.max(1)).saturating_pow(retry);
        let delay_ms = self
            .base_delay_ms
            .saturating_mul(multiplier)
            .min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }

    /// [`Self::backoff`] plus a random extra of up to `jitter` of the delay.
    pub fn backoff_with_jitter(&self, retry: u32) -> Duration {
        let delay = self.backoff(retry);
        let max_extra = (delay.as_millis() as f64 * self.jitter.clamp(0.0, 1.0)) as u64;
        if max_extra == 0 {
            return delay;
        }
        delay + Duration::from_millis(rand::thread_rng().gen_range(0..=max_extra))
    }
}

// ============================================================================
// Fetcher
// ============================================================================

/// Issues the read-only calls for one section and normalizes the result.
#[derive(Clone)]
pub struct RemoteFetcher {
    client: Arc<dyn ApiClient>,
    retry: RetryPolicy,
}

impl RemoteFetcher {
    pub fn new(client: Arc<dyn ApiClient>) -> Self {
        Self {
            client,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Fetches and normalizes `kind` for `resource_id` in `region`.
    ///
    /// # Errors
    ///
    /// Returns the [`FetchError`] of the first underlying call that failed
    /// after retries, [`FetchError::Malformed`] when the payload does not fit
    /// the section record, or [`FetchError::Cancelled`].
    #[instrument(skip(self, cancel), fields(section = %kind))]
    pub async fn fetch(
        &self,
        kind: SectionKind,
        region: &str,
        resource_id: &str,
        cancel: &CancelToken,
    ) -> Result<SectionRecord, FetchError> {
        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }
        let ctx = CallContext {
            fetcher: self,
            region,
            cancel,
        };
        sections::fetch_section(kind, &ctx, resource_id).await
    }
}

impl std::fmt::Debug for RemoteFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteFetcher")
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

/// Per-fetch view handed to section handlers: region, cancellation and the
/// retrying call primitives.
pub(crate) struct CallContext<'a> {
    fetcher: &'a RemoteFetcher,
    region: &'a str,
    cancel: &'a CancelToken,
}

impl CallContext<'_> {
    /// One remote call with retry.
    pub(crate) async fn call(&self, request: &ApiRequest) -> Result<Value, FetchError> {
        let policy = &self.fetcher.retry;
        let mut attempt = 0;

        loop {
            attempt += 1;
            let result = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(FetchError::Cancelled),
                result = self.fetcher.client.call(self.region, request) => result,
            };

            let err = match result {
                Ok(value) => return Ok(value),
                Err(api_err) => FetchError::from(api_err),
            };

            if !err.is_retryable() || attempt >= policy.max_attempts {
                debug!(operation = request.operation, attempt, error = %err, "Remote call failed");
                return Err(err);
            }

            let delay = policy.backoff_with_jitter(attempt - 1);
            warn!(
                operation = request.operation,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Retrying remote call"
            );
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(FetchError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Calls a list operation, following `NextToken` until exhausted, and
    /// returns the concatenated `list_key` arrays.
    pub(crate) async fn list(
        &self,
        request: &ApiRequest,
        list_key: &str,
    ) -> Result<Vec<Value>, FetchError> {
        let mut items = Vec::new();
        let mut page = self.call(request).await?;
        let mut seen_tokens: Vec<String> = Vec::new();

        loop {
            match page.get_mut(list_key).map(Value::take) {
                None | Some(Value::Null) => {}
                Some(Value::Array(mut batch)) => items.append(&mut batch),
                Some(other) => {
                    return Err(FetchError::Malformed(format!(
                        "{}: expected '{list_key}' to be an array, got {other}",
                        request.operation
                    )))
                }
            }

            let token = match page.get("NextToken").or_else(|| page.get("nextToken")) {
                Some(Value::String(token)) if !token.is_empty() => token.clone(),
                _ => return Ok(items),
            };
            if seen_tokens.contains(&token) {
                return Err(FetchError::Malformed(format!(
                    "{}: pagination token '{token}' repeated",
                    request.operation
                )));
            }
            page = self.call(&request.with_next_token(&token)).await?;
            seen_tokens.push(token);
        }
    }
}
