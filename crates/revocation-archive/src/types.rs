//! Core data types for scraped records, archived artifacts, and the roster join.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Number of hex characters kept from a full digest.
pub const SHORT_HASH_LEN: usize = 8;

/// A truncated hex digest used as a compact identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShortHash(String);

impl ShortHash {
    /// Keep the first [`SHORT_HASH_LEN`] characters of a full hex digest.
    pub(crate) fn from_hex_digest(full: &str) -> Self {
        Self(full.chars().take(SHORT_HASH_LEN).collect())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ShortHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An opaque request-fingerprinting token, sent as the `User-Agent` header.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientIdentity(String);

impl ClientIdentity {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Last whitespace-delimited token of a display name.
pub fn last_name_of(display_name: &str) -> Option<&str> {
    display_name.split_whitespace().last()
}

/// Join key derived from a last name.
pub(crate) fn join_key(last_name: &str) -> String {
    last_name.to_lowercase()
}

/// A raw record extracted from the source page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordDescriptor {
    /// Display name as rendered in the link text.
    pub officer_name: String,
    /// Relative link as it appears in the page.
    pub href: String,
    /// Substring of `href` starting at `hash=`; empty when the link has none.
    pub given_hash: String,
    /// Absolute artifact URL, `domain + href`.
    pub pdfurl: String,
    /// Last whitespace token of `officer_name`, display casing kept.
    pub last_name: String,
}

impl RecordDescriptor {
    /// Build a descriptor from an anchor's text and link.
    ///
    /// Fails if the name has no tokens, the link is empty, or `domain + href`
    /// is not an absolute URL.
    pub fn new(domain: &str, officer_name: &str, href: &str) -> ArchiveResult<Self> {
        let officer_name = officer_name.trim();
        let last_name = last_name_of(officer_name)
            .ok_or_else(|| ArchiveError::InvalidDescriptor(format!("empty name for link {href}")))?
            .to_string();

        let href = href.trim();
        if href.is_empty() {
            return Err(ArchiveError::InvalidDescriptor(format!(
                "empty link for {officer_name}"
            )));
        }

        let pdfurl = format!("{domain}{href}");
        url::Url::parse(&pdfurl).map_err(|e| {
            ArchiveError::InvalidDescriptor(format!("{officer_name}: bad artifact url {pdfurl}: {e}"))
        })?;

        let given_hash = href
            .find("hash=")
            .map(|idx| href[idx..].to_string())
            .unwrap_or_default();

        Ok(Self {
            officer_name: officer_name.to_string(),
            href: href.to_string(),
            given_hash,
            pdfurl,
            last_name,
        })
    }
}

/// How a download settled against the local archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// No prior file; the fetched bytes were written.
    Written,
    /// A file with the same name and identical bytes already existed.
    Unchanged,
    /// A file with the same name but different bytes existed; the new bytes
    /// went to a date-suffixed sibling.
    Conflict { original: PathBuf },
    /// Every attempt failed and the previously archived copy was kept.
    Archived,
}

/// A fetched artifact and where it lives on disk.
#[derive(Debug, Clone)]
pub struct DownloadedArtifact {
    /// URL the bytes were requested from.
    pub url: String,
    /// Archive file holding `content`.
    pub local_filename: PathBuf,
    /// Body as fetched (or as archived, for [`DownloadOutcome::Archived`]).
    pub content: Vec<u8>,
    /// `file_digest` of `content`.
    pub content_hash: ShortHash,
    /// How the bytes settled against the archive.
    pub outcome: DownloadOutcome,
}

/// Descriptor-level output row.
#[derive(Debug, Clone, Serialize)]
pub struct DescriptorRow {
    /// Display name from the page.
    pub officer_name: String,
    /// Relative link as it appears in the page.
    pub href: String,
    /// `hash=` suffix of `href`, or empty.
    pub given_hash: String,
    /// Absolute artifact URL.
    pub pdfurl: String,
    /// Path of the archived file.
    pub filename: String,
    /// Digest of the archived bytes.
    pub fileid: ShortHash,
    /// Last token of `officer_name`.
    pub last_name: String,
}

impl DescriptorRow {
    pub fn new(descriptor: &RecordDescriptor, artifact: &DownloadedArtifact) -> Self {
        Self {
            officer_name: descriptor.officer_name.clone(),
            href: descriptor.href.clone(),
            given_hash: descriptor.given_hash.clone(),
            pdfurl: descriptor.pdfurl.clone(),
            filename: artifact.local_filename.display().to_string(),
            fileid: artifact.content_hash.clone(),
            last_name: descriptor.last_name.clone(),
        }
    }
}

/// An expected record from the externally supplied roster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteRosterEntry {
    /// Case number, the roster key.
    pub caseno: String,
    /// Full display name; its last token is the join key.
    pub officer_name: String,
    /// Remaining static fields, ordered by key.
    pub extra: BTreeMap<String, String>,
}

impl SiteRosterEntry {
    pub fn new(
        caseno: impl Into<String>,
        officer_name: impl Into<String>,
        extra: BTreeMap<String, String>,
    ) -> ArchiveResult<Self> {
        let caseno = caseno.into();
        let officer_name = officer_name.into().trim().to_string();
        if caseno.trim().is_empty() {
            return Err(ArchiveError::InvalidRoster(format!(
                "empty caseno for {officer_name}"
            )));
        }
        if last_name_of(&officer_name).is_none() {
            return Err(ArchiveError::InvalidRoster(format!(
                "case {caseno} has no officer_name"
            )));
        }
        Ok(Self {
            caseno,
            officer_name,
            extra,
        })
    }

    pub fn last_name(&self) -> &str {
        // validated non-empty in `new`
        last_name_of(&self.officer_name).unwrap_or_default()
    }
}

/// A roster entry joined with its scraped descriptor and identities.
#[derive(Debug, Clone)]
pub struct ReconciledRecord {
    /// The roster entry this record was joined from.
    pub roster: SiteRosterEntry,
    /// Roster last name, display casing kept.
    pub last_name: String,
    /// Artifact URL of the matched descriptor.
    pub pdfurl: String,
    /// Digest of the matched artifact's bytes.
    pub fileid: ShortHash,
    /// Record digest over the dataset label and [`digest_fields`](Self::digest_fields).
    pub revocation_id: ShortHash,
}

impl ReconciledRecord {
    /// Field values in the pinned digest order, without `revocation_id`.
    pub fn digest_fields(&self) -> Vec<&str> {
        let mut fields = Vec::with_capacity(self.roster.extra.len() + 5);
        fields.push(self.roster.caseno.as_str());
        fields.push(self.roster.officer_name.as_str());
        fields.extend(self.roster.extra.values().map(String::as_str));
        fields.push(self.last_name.as_str());
        fields.push(self.pdfurl.as_str());
        fields.push(self.fileid.as_str());
        fields
    }
}

/// Errors that can occur while archiving.
#[derive(thiserror::Error, Debug)]
pub enum ArchiveError {
    #[error("Identity pool is empty")]
    EmptyIdentityPool,

    #[error("Unable to fetch {url}: all {attempts} identities failed")]
    PageExhausted { url: String, attempts: usize },

    #[error("Page structure changed: found {found} matching records, need at least {required}")]
    ExtractionShape { found: usize, required: usize },

    #[error("Invalid descriptor: {0}")]
    InvalidDescriptor(String),

    #[error("Invalid roster entry: {0}")]
    InvalidRoster(String),

    #[error("Duplicate last name in roster: {0}")]
    DuplicateLastName(String),

    #[error("Roster has {roster} entries but {scraped} records were scraped")]
    RosterSizeMismatch { roster: usize, scraped: usize },

    #[error("Case {caseno} ({last_name}) matched {matches} scraped records, expected exactly 1")]
    AmbiguousJoin {
        caseno: String,
        last_name: String,
        matches: usize,
    },

    #[error("Join produced {joined} rows for {roster} roster entries")]
    JoinMismatch { roster: usize, joined: usize },

    #[error("No file downloaded for {} record(s): {}", .0.len(), .0.join(", "))]
    IncompleteDownloads(Vec<String>),

    #[error("Cancelled")]
    Cancelled,

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type ArchiveResult<T> = Result<T, ArchiveError>;
