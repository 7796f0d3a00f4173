//! Fetch the entry page, rotating through every identity once.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::http_client::HttpClient;
use crate::identity::IdentityPool;
use crate::retry::{RetryError, RetryPolicy};
use crate::types::{ArchiveError, ArchiveResult};

/// Fetched entry page.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub url: String,
    pub html: String,
}

/// Retrieves the entry page HTML.
///
/// Each identity in a freshly shuffled order gets exactly one attempt. The
/// first success wins; exhausting the pool is fatal for the run.
pub struct PageFetcher {
    client: HttpClient,
    identities: Arc<IdentityPool>,
    policy: RetryPolicy,
}

impl PageFetcher {
    /// `policy` supplies the pause between attempts; the attempt bound is
    /// always the pool size.
    pub fn new(client: HttpClient, identities: Arc<IdentityPool>, policy: RetryPolicy) -> Self {
        let policy = policy.with_attempts(identities.len());
        Self {
            client,
            identities,
            policy,
        }
    }

    pub async fn fetch(&self, url: &str, cancel: &CancellationToken) -> ArchiveResult<FetchedPage> {
        tracing::info!("parsing: {url}");
        let order = self.identities.shuffled();
        let order = order.as_slice();
        let client = &self.client;

        let result = self
            .policy
            .run(cancel, move |attempt| {
                let identity = &order[attempt];
                tracing::debug!("page attempt {} as {identity}", attempt + 1);
                client.get(url, identity)
            })
            .await;

        match result {
            Ok(resp) => {
                tracing::debug!(
                    "fetched {} ({}, {} bytes)",
                    resp.final_url,
                    resp.status,
                    resp.body.len()
                );
                let html = String::from_utf8_lossy(&resp.body).into_owned();
                Ok(FetchedPage {
                    url: resp.final_url,
                    html,
                })
            }
            Err(RetryError::Cancelled) => Err(ArchiveError::Cancelled),
            Err(RetryError::Exhausted { attempts, last }) => {
                tracing::error!("unable to fetch {url}: {last}");
                Err(ArchiveError::PageExhausted {
                    url: url.to_string(),
                    attempts,
                })
            }
        }
    }
}
