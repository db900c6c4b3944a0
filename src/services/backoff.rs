use reqwest::{Client, Request, Response, StatusCode};
use std::time::Duration;
use tokio::time::sleep;

/// Bounded retry policy for a single outbound call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry; doubled after every retry.
    pub initial_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(1000),
        }
    }
}

/// HTTP client that retries transport failures and HTTP 429 with
/// exponential backoff. Every other status is handed back untouched.
#[derive(Clone)]
pub struct BackoffClient {
    http: Client,
    policy: RetryPolicy,
}

impl BackoffClient {
    pub fn new(http: Client, policy: RetryPolicy) -> Self {
        Self { http, policy }
    }

    pub fn http(&self) -> &Client {
        &self.http
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Send `request`, sleeping between attempts.
    ///
    /// Performs at most `max_retries + 1` attempts. The last failure is
    /// returned once retries are exhausted.
    pub async fn send(&self, request: Request) -> Result<Response, HttpError> {
        let mut delay = self.policy.initial_delay;
        let mut retries_remaining = self.policy.max_retries;
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            let attempt = request.try_clone().ok_or(HttpError::UnclonableRequest)?;

            let failure = match self.http.execute(attempt).await {
                Ok(response) if response.status() == StatusCode::TOO_MANY_REQUESTS => {
                    HttpError::RateLimited { attempts }
                }
                Ok(response) => return Ok(response),
                // The URL carries the API key in its query string.
                Err(source) => HttpError::Transport {
                    attempts,
                    source: source.without_url(),
                },
            };

            if retries_remaining == 0 {
                tracing::warn!(attempts, error = %failure, "Retries exhausted");
                return Err(failure);
            }

            tracing::warn!(
                attempt = attempts,
                retries_remaining,
                delay_ms = delay.as_millis() as u64,
                error = %failure,
                "Request failed, backing off"
            );
            metrics::counter!("restyle_http_retries_total").increment(1);

            sleep(delay).await;
            delay = delay.saturating_mul(2);
            retries_remaining -= 1;
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    #[error("network request failed after {attempts} attempt(s): {source}")]
    Transport {
        attempts: u32,
        #[source]
        source: reqwest::Error,
    },

    #[error("rate limited (HTTP 429) after {attempts} attempt(s)")]
    RateLimited { attempts: u32 },

    #[error("request body cannot be replayed for retry")]
    UnclonableRequest,
}
