//! Download artifacts into an append-only, content-verified local archive.
//!
//! ## Naming
//!
//! A URL maps to `<outdir>/<stem><ext>`, taken from its last path segment.
//! When that file already holds different bytes, the new bytes go to
//! `<stem><YYYY-MM-DD><ext>`; a further same-day mismatch gets
//! `<stem><YYYY-MM-DD>-2<ext>`, `-3`, and so on. Existing files are never
//! overwritten.
//!
//! ## Atomicity
//!
//! Bytes land in a hidden `.part` file that is renamed into place once fully
//! written and synced. The compare-then-write step for one target name runs
//! under a per-name async lock.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use futures::stream::{self, StreamExt};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::config::ArchiveConfig;
use crate::hash::file_digest;
use crate::http_client::HttpClient;
use crate::identity::IdentityPool;
use crate::retry::{RetryError, RetryPolicy};
use crate::types::{ArchiveError, ArchiveResult, DownloadOutcome, DownloadedArtifact};

/// File name for `url`: the last segment of its path (query and fragment
/// ignored), cut just after the first `ext`, or with `ext` appended when the
/// segment lacks it. `None` when the URL does not parse or the segment is
/// empty.
pub fn derive_filename(url: &str, ext: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let segment = parsed.path_segments()?.last()?;

    let name = match segment.find(ext) {
        Some(idx) => segment[..idx + ext.len()].to_string(),
        None => format!("{segment}{ext}"),
    };
    (name.len() > ext.len()).then_some(name)
}

/// `<stem><date><ext>` for the first conflict of the day, then `-N` suffixed.
pub fn conflict_filename(filename: &str, ext: &str, date: &str, n: usize) -> String {
    let stem = filename.strip_suffix(ext).unwrap_or(filename);
    if n <= 1 {
        format!("{stem}{date}{ext}")
    } else {
        format!("{stem}{date}-{n}{ext}")
    }
}

/// Fetches artifacts with identity rotation and settles them against disk.
pub struct ArtifactDownloader {
    client: HttpClient,
    identities: Arc<IdentityPool>,
    policy: RetryPolicy,
    outdir: PathBuf,
    file_ext: String,
    reuse_archived_on_failure: bool,
    locks: DashMap<PathBuf, Arc<Mutex<()>>>,
}

impl ArtifactDownloader {
    pub fn new(
        client: HttpClient,
        identities: Arc<IdentityPool>,
        outdir: impl Into<PathBuf>,
        config: &ArchiveConfig,
    ) -> Self {
        Self {
            client,
            identities,
            policy: RetryPolicy::from_config(config),
            outdir: outdir.into(),
            file_ext: config.file_ext.clone(),
            reuse_archived_on_failure: config.reuse_archived_on_failure,
            locks: DashMap::new(),
        }
    }

    /// Download one artifact.
    ///
    /// `Ok(None)` is a soft, per-record failure: every attempt failed (or the
    /// URL has no usable file name). Only cancellation and local I/O errors
    /// are returned as `Err`.
    pub async fn download(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> ArchiveResult<Option<DownloadedArtifact>> {
        tracing::info!("attempting to download: {url}");
        let Some(filename) = derive_filename(url, &self.file_ext) else {
            tracing::warn!("no file name derivable from {url}");
            return Ok(None);
        };
        let path = self.outdir.join(&filename);

        let client = &self.client;
        let identities = &self.identities;
        let fetched = self
            .policy
            .run(cancel, move |attempt| {
                let identity = identities.pick().clone();
                tracing::debug!("download attempt {} as {identity}", attempt + 1);
                async move { client.get(url, &identity).await }
            })
            .await;

        match fetched {
            Ok(resp) => {
                tracing::debug!(
                    "fetched {} ({}, {} bytes)",
                    resp.final_url,
                    resp.status,
                    resp.body.len()
                );
                let (local_filename, outcome) = self.settle(&path, &filename, &resp.body).await?;
                Ok(Some(DownloadedArtifact {
                    url: url.to_string(),
                    local_filename,
                    content_hash: file_digest(&resp.body),
                    content: resp.body,
                    outcome,
                }))
            }
            Err(RetryError::Cancelled) => Err(ArchiveError::Cancelled),
            Err(RetryError::Exhausted { attempts, last }) => {
                tracing::warn!("unable to download {url} after {attempts} attempts: {last}");
                if self.reuse_archived_on_failure {
                    if let Some(existing) = read_if_exists(&path).await? {
                        tracing::info!("keeping archived copy {}", path.display());
                        return Ok(Some(DownloadedArtifact {
                            url: url.to_string(),
                            local_filename: path,
                            content_hash: file_digest(&existing),
                            content: existing,
                            outcome: DownloadOutcome::Archived,
                        }));
                    }
                }
                Ok(None)
            }
        }
    }

    /// Download every URL, at most `concurrency` at a time, keeping input order.
    pub async fn download_all(
        &self,
        urls: &[String],
        concurrency: usize,
        cancel: &CancellationToken,
    ) -> ArchiveResult<Vec<Option<DownloadedArtifact>>> {
        let results: Vec<ArchiveResult<Option<DownloadedArtifact>>> = stream::iter(urls)
            .map(|url| self.download(url, cancel))
            .buffered(concurrency.max(1))
            .collect()
            .await;

        results.into_iter().collect()
    }

    /// Compare fetched bytes with the archive and write where needed.
    async fn settle(
        &self,
        path: &Path,
        filename: &str,
        fetched: &[u8],
    ) -> ArchiveResult<(PathBuf, DownloadOutcome)> {
        let lock = self.locks.entry(path.to_path_buf()).or_default().clone();
        let _guard = lock.lock().await;

        let Some(existing) = read_if_exists(path).await? else {
            write_atomic(path, fetched).await?;
            tracing::info!("download successful: {}", path.display());
            return Ok((path.to_path_buf(), DownloadOutcome::Written));
        };

        if existing == fetched {
            tracing::info!(
                "a file with the same name and contents already exists: {}",
                path.display()
            );
            return Ok((path.to_path_buf(), DownloadOutcome::Unchanged));
        }

        let date = chrono::Local::now().format("%Y-%m-%d").to_string();
        let mut n = 1;
        loop {
            let candidate = self
                .outdir
                .join(conflict_filename(filename, &self.file_ext, &date, n));
            match read_if_exists(&candidate).await? {
                Some(bytes) if bytes == fetched => {
                    tracing::info!("changed content already archived as {}", candidate.display());
                    return Ok((candidate, conflict(path)));
                }
                Some(_) => n += 1,
                None => {
                    tracing::warn!(
                        "{} exists with different contents; writing {}",
                        path.display(),
                        candidate.display()
                    );
                    write_atomic(&candidate, fetched).await?;
                    return Ok((candidate, conflict(path)));
                }
            }
        }
    }
}

fn conflict(original: &Path) -> DownloadOutcome {
    DownloadOutcome::Conflict {
        original: original.to_path_buf(),
    }
}

async fn read_if_exists(path: &Path) -> ArchiveResult<Option<Vec<u8>>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Removes an unfinished `.part` file if the write is abandoned.
struct PartFile {
    path: PathBuf,
    committed: bool,
}

impl Drop for PartFile {
    fn drop(&mut self) {
        if !self.committed {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> ArchiveResult<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    tokio::fs::create_dir_all(dir).await?;

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut part = PartFile {
        path: dir.join(format!(".{name}.{:08x}.part", rand::random::<u32>())),
        committed: false,
    };

    let mut file = tokio::fs::File::create(&part.path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await?;
    drop(file);

    tokio::fs::rename(&part.path, path).await?;
    part.committed = true;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_filename() {
        assert_eq!(
            derive_filename("https://example.org/docs/x.pdf?hash=abc123", ".pdf").as_deref(),
            Some("x.pdf")
        );
        assert_eq!(
            derive_filename("https://example.org/a/b/Report.pdf", ".pdf").as_deref(),
            Some("Report.pdf")
        );
        assert_eq!(
            derive_filename("https://example.org/view?id=7", ".pdf").as_deref(),
            Some("view.pdf")
        );
        assert_eq!(derive_filename("https://example.org/", ".pdf"), None);
        assert_eq!(derive_filename("https://example.org/.pdf", ".pdf"), None);
        assert_eq!(derive_filename("not a url", ".pdf"), None);
    }

    #[test]
    fn test_derive_filename_ignores_slashes_in_query() {
        let alpha = derive_filename("https://example.org/docs/alpha.pdf?hash=Zm9v/YmFy", ".pdf");
        let beta = derive_filename("https://example.org/docs/beta.pdf?hash=cXV4/YmFy", ".pdf");
        assert_eq!(alpha.as_deref(), Some("alpha.pdf"));
        assert_eq!(beta.as_deref(), Some("beta.pdf"));
        assert_eq!(
            derive_filename("https://example.org/docs/view#p/2", ".pdf").as_deref(),
            Some("view.pdf")
        );
    }

    #[test]
    fn test_conflict_filename() {
        assert_eq!(conflict_filename("x.pdf", ".pdf", "2024-05-01", 1), "x2024-05-01.pdf");
        assert_eq!(conflict_filename("x.pdf", ".pdf", "2024-05-01", 3), "x2024-05-01-3.pdf");
    }

    #[tokio::test]
    async fn test_write_atomic_leaves_no_part_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("x.pdf");
        write_atomic(&path, b"%PDF-1.4").await.unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"%PDF-1.4");
        let names: Vec<_> = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names.len(), 1);
    }
}
