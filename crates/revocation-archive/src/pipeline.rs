//! End-to-end run: page → records → artifacts → reconciled tables.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::config::ArchiveConfig;
use crate::download::ArtifactDownloader;
use crate::extract::{page_title, unpack_descriptors, RecordExtractor};
use crate::http_client::HttpClient;
use crate::identity::IdentityPool;
use crate::page::PageFetcher;
use crate::reconcile::{descriptor_rows, Reconciler};
use crate::retry::RetryPolicy;
use crate::types::{
    ArchiveResult, DescriptorRow, DownloadOutcome, DownloadedArtifact, ReconciledRecord,
    SiteRosterEntry,
};

/// Where the entry page comes from.
#[derive(Debug, Clone)]
pub enum PageSource {
    /// Fetch over HTTP with identity rotation.
    Url(String),
    /// Already rendered HTML, e.g. saved by a headless browser.
    Html(String),
}

/// Counts of how each artifact settled.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub records: usize,
    pub written: usize,
    pub unchanged: usize,
    pub conflicts: usize,
    pub archived: usize,
}

impl RunSummary {
    fn tally(artifacts: &[Option<DownloadedArtifact>]) -> Self {
        let mut summary = Self {
            records: artifacts.len(),
            ..Self::default()
        };
        for artifact in artifacts.iter().flatten() {
            match artifact.outcome {
                DownloadOutcome::Written => summary.written += 1,
                DownloadOutcome::Unchanged => summary.unchanged += 1,
                DownloadOutcome::Conflict { .. } => summary.conflicts += 1,
                DownloadOutcome::Archived => summary.archived += 1,
            }
        }
        summary
    }
}

/// Both output tables of a completed run.
#[derive(Debug, Clone)]
pub struct ArchiveRun {
    pub title: Option<String>,
    pub descriptors: Vec<DescriptorRow>,
    pub reconciled: Vec<ReconciledRecord>,
    pub summary: RunSummary,
}

/// Wires the fetcher, extractor, downloader and reconciler together.
pub struct Pipeline {
    config: ArchiveConfig,
    fetcher: PageFetcher,
    extractor: RecordExtractor,
    downloader: ArtifactDownloader,
    reconciler: Reconciler,
    domain: String,
}

impl Pipeline {
    pub fn new(
        config: ArchiveConfig,
        identities: IdentityPool,
        domain: impl Into<String>,
        outdir: impl Into<PathBuf>,
    ) -> ArchiveResult<Self> {
        config.validate()?;
        let identities = Arc::new(identities);
        let client = HttpClient::new(config.request_timeout());

        Ok(Self {
            fetcher: PageFetcher::new(
                client.clone(),
                identities.clone(),
                RetryPolicy::from_config(&config),
            ),
            extractor: RecordExtractor::new(config.keyphrase.clone(), config.min_records),
            downloader: ArtifactDownloader::new(client, identities, outdir, &config),
            reconciler: Reconciler::new(config.dataset_label.clone()),
            domain: domain.into(),
            config,
        })
    }

    /// Run every stage. Nothing is returned unless every gate passed.
    ///
    /// The page is fully fetched and parsed before any download starts.
    pub async fn run(
        &self,
        source: PageSource,
        roster: &[SiteRosterEntry],
        cancel: &CancellationToken,
    ) -> ArchiveResult<ArchiveRun> {
        Reconciler::check_roster(roster)?;

        let html = match source {
            PageSource::Url(url) => self.fetcher.fetch(&url, cancel).await?.html,
            PageSource::Html(html) => html,
        };

        let title = page_title(&html);
        if let Some(title) = &title {
            tracing::info!("page title: {title}");
        }

        let anchors = self.extractor.extract(&html)?;
        let descriptors = unpack_descriptors(&self.domain, &anchors)?;

        let urls: Vec<String> = descriptors.iter().map(|d| d.pdfurl.clone()).collect();
        let artifacts = self
            .downloader
            .download_all(&urls, self.config.concurrency, cancel)
            .await?;
        let summary = RunSummary::tally(&artifacts);

        let rows = descriptor_rows(&descriptors, &artifacts)?;
        let reconciled = self.reconciler.reconcile(roster, &rows)?;

        tracing::info!(
            "done: {} records, {} written, {} unchanged, {} conflicts",
            summary.records,
            summary.written,
            summary.unchanged,
            summary.conflicts
        );

        Ok(ArchiveRun {
            title,
            descriptors: rows,
            reconciled,
            summary,
        })
    }
}
