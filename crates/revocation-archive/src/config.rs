//! Tunables for fetching, downloading and reconciliation.

use std::time::Duration;

use serde::Deserialize;

use crate::types::{ArchiveError, ArchiveResult};

/// Default link fragment identifying revocation records on the source page.
pub const DEFAULT_KEYPHRASE: &str = "Commission-Information/Revocations";

/// Default dataset label scoping `revocation_id`.
pub const DEFAULT_DATASET_LABEL: &str = "joined_table";

/// Archive run configuration. Every field has a default, so a partial YAML
/// document overrides only what it names.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ArchiveConfig {
    /// Attempts per artifact before giving up on it.
    pub max_attempts: usize,
    /// Fixed pause after a failed attempt.
    pub retry_delay_ms: u64,
    /// Upper bound of random extra pause added to `retry_delay_ms`.
    pub retry_jitter_ms: u64,
    /// Timeout for a single HTTP attempt.
    pub request_timeout_secs: u64,
    /// Concurrent artifact downloads. 1 keeps strictly sequential order.
    pub concurrency: usize,
    /// Fewest matching links accepted from the page.
    pub min_records: usize,
    /// Artifact extension, including the dot.
    pub file_ext: String,
    /// Substring an anchor's markup must contain to count as a record.
    pub keyphrase: String,
    /// Label digested ahead of each reconciled record's fields.
    pub dataset_label: String,
    /// On exhaustion, fall back to an already archived copy if one exists.
    pub reuse_archived_on_failure: bool,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            max_attempts: 20,
            retry_delay_ms: 200,
            retry_jitter_ms: 0,
            request_timeout_secs: 30,
            concurrency: 1,
            min_records: 18,
            file_ext: ".pdf".to_string(),
            keyphrase: DEFAULT_KEYPHRASE.to_string(),
            dataset_label: DEFAULT_DATASET_LABEL.to_string(),
            reuse_archived_on_failure: false,
        }
    }
}

impl ArchiveConfig {
    pub fn validate(&self) -> ArchiveResult<()> {
        if self.max_attempts == 0 {
            return Err(ArchiveError::Config("max_attempts must be at least 1".into()));
        }
        if self.concurrency == 0 {
            return Err(ArchiveError::Config("concurrency must be at least 1".into()));
        }
        if self.request_timeout_secs == 0 {
            return Err(ArchiveError::Config(
                "request_timeout_secs must be at least 1".into(),
            ));
        }
        if self.file_ext.len() < 2 || !self.file_ext.starts_with('.') {
            return Err(ArchiveError::Config(format!(
                "file_ext must look like \".pdf\", got {:?}",
                self.file_ext
            )));
        }
        if self.keyphrase.is_empty() {
            return Err(ArchiveError::Config("keyphrase must not be empty".into()));
        }
        Ok(())
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn retry_jitter(&self) -> Duration {
        Duration::from_millis(self.retry_jitter_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
