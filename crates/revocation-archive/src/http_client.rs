//! Async HTTP client wrapping reqwest.
//!
//! One call is one attempt: no internal retry. Callers pick the client
//! identity per attempt and compose attempts with [`RetryPolicy`](crate::retry::RetryPolicy).

use std::time::Duration;

use reqwest::header::USER_AGENT;

use crate::types::ClientIdentity;

/// Why a single request produced no usable body.
#[derive(thiserror::Error, Debug)]
pub enum AttemptError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("HTTP status {0}")]
    Status(u16),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Response body from a successful GET.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// Final URL after redirects.
    pub final_url: String,
    /// Response status, always 2xx.
    pub status: u16,
    /// Full response body.
    pub body: Vec<u8>,
}

/// HTTP client shared by the page fetcher and the artifact downloader.
#[derive(Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpClient {
    /// Create a client whose every request carries `timeout`.
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .unwrap_or_default();

        Self { client, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// GET `url` presenting `identity` as the user agent.
    ///
    /// Non-2xx statuses are failures so the caller retries under another
    /// identity instead of archiving an error page.
    pub async fn get(
        &self,
        url: &str,
        identity: &ClientIdentity,
    ) -> Result<HttpResponse, AttemptError> {
        let resp = self
            .client
            .get(url)
            .header(USER_AGENT, identity.as_str())
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            return Err(AttemptError::Status(status));
        }
        let final_url = resp.url().to_string();
        let body = resp.bytes().await.map_err(|e| self.classify(e))?.to_vec();

        Ok(HttpResponse {
            final_url,
            status,
            body,
        })
    }

    fn classify(&self, e: reqwest::Error) -> AttemptError {
        if e.is_timeout() {
            AttemptError::Timeout(self.timeout)
        } else {
            AttemptError::Transport(e)
        }
    }
}
