//! Resilient fetch, retry and content-verified archiving
//! of records published on a single source page.

pub mod config;
pub mod download;
pub mod extract;
pub mod hash;
pub mod http_client;
pub mod identity;
pub mod page;
pub mod pipeline;
pub mod reconcile;
pub mod retry;
pub mod types;

pub use config::ArchiveConfig;
pub use download::ArtifactDownloader;
pub use extract::RecordExtractor;
pub use hash::{file_digest, record_digest};
pub use identity::IdentityPool;
pub use page::PageFetcher;
pub use pipeline::{ArchiveRun, PageSource, Pipeline, RunSummary};
pub use reconcile::Reconciler;
pub use retry::RetryPolicy;
pub use types::*;
