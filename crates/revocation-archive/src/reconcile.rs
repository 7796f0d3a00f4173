//! Join scraped records with the expected roster and attach identities.
//!
//! Every step is a gate: a violated invariant aborts with an error instead of
//! coercing the data.

use std::collections::{HashMap, HashSet};

use crate::hash::record_digest;
use crate::types::{
    join_key, ArchiveError, ArchiveResult, DescriptorRow, DownloadedArtifact, ReconciledRecord,
    RecordDescriptor, ShortHash, SiteRosterEntry,
};

/// Pair each descriptor with its artifact.
///
/// Fails listing every record whose download produced no file.
pub fn descriptor_rows(
    descriptors: &[RecordDescriptor],
    artifacts: &[Option<DownloadedArtifact>],
) -> ArchiveResult<Vec<DescriptorRow>> {
    let missing: Vec<String> = descriptors
        .iter()
        .zip(artifacts.iter().map(Some).chain(std::iter::repeat(None)))
        .filter(|(_, artifact)| !matches!(artifact, Some(Some(_))))
        .map(|(d, _)| d.pdfurl.clone())
        .collect();
    if !missing.is_empty() {
        return Err(ArchiveError::IncompleteDownloads(missing));
    }

    Ok(descriptors
        .iter()
        .zip(artifacts.iter().flatten())
        .map(|(d, a)| DescriptorRow::new(d, a))
        .collect())
}

/// Reconciles scraped rows against the roster.
#[derive(Debug, Clone)]
pub struct Reconciler {
    dataset_label: String,
}

impl Reconciler {
    pub fn new(dataset_label: impl Into<String>) -> Self {
        Self {
            dataset_label: dataset_label.into(),
        }
    }

    /// Roster last names must be unique (case-insensitive).
    pub fn check_roster(roster: &[SiteRosterEntry]) -> ArchiveResult<()> {
        let mut seen = HashSet::new();
        for entry in roster {
            if !seen.insert(join_key(entry.last_name())) {
                return Err(ArchiveError::DuplicateLastName(entry.last_name().to_string()));
            }
        }
        Ok(())
    }

    /// Join on last name and compute `revocation_id` for each joined row.
    pub fn reconcile(
        &self,
        roster: &[SiteRosterEntry],
        rows: &[DescriptorRow],
    ) -> ArchiveResult<Vec<ReconciledRecord>> {
        Self::check_roster(roster)?;

        if roster.len() != rows.len() {
            return Err(ArchiveError::RosterSizeMismatch {
                roster: roster.len(),
                scraped: rows.len(),
            });
        }

        let mut by_key: HashMap<String, Vec<&DescriptorRow>> = HashMap::new();
        for row in rows {
            by_key.entry(join_key(&row.last_name)).or_default().push(row);
        }

        let mut joined = Vec::with_capacity(roster.len());
        for entry in roster {
            let matches = by_key
                .get(&join_key(entry.last_name()))
                .map(Vec::as_slice)
                .unwrap_or_default();
            let row = match matches {
                [] => {
                    tracing::warn!(
                        "case {} ({}) has no scraped record",
                        entry.caseno,
                        entry.last_name()
                    );
                    continue;
                }
                [row] => *row,
                _ => {
                    return Err(ArchiveError::AmbiguousJoin {
                        caseno: entry.caseno.clone(),
                        last_name: entry.last_name().to_string(),
                        matches: matches.len(),
                    })
                }
            };
            let mut record = ReconciledRecord {
                roster: entry.clone(),
                last_name: entry.last_name().to_string(),
                pdfurl: row.pdfurl.clone(),
                fileid: row.fileid.clone(),
                revocation_id: ShortHash::default(),
            };
            record.revocation_id = record_digest(&self.dataset_label, record.digest_fields());
            joined.push(record);
        }

        if joined.len() != roster.len() {
            return Err(ArchiveError::JoinMismatch {
                roster: roster.len(),
                joined: joined.len(),
            });
        }

        tracing::info!("reconciled {} records", joined.len());
        Ok(joined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::file_digest;
    use crate::types::DownloadOutcome;
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    fn entry(caseno: &str, name: &str) -> SiteRosterEntry {
        SiteRosterEntry::new(caseno, name, BTreeMap::new()).unwrap()
    }

    fn descriptor(name: &str, href: &str) -> RecordDescriptor {
        RecordDescriptor::new("https://example.org", name, href).unwrap()
    }

    fn artifact(d: &RecordDescriptor, body: &[u8]) -> DownloadedArtifact {
        DownloadedArtifact {
            url: d.pdfurl.clone(),
            local_filename: PathBuf::from("out/x.pdf"),
            content: body.to_vec(),
            content_hash: file_digest(body),
            outcome: DownloadOutcome::Written,
        }
    }

    fn row(name: &str, href: &str) -> DescriptorRow {
        let d = descriptor(name, href);
        let a = artifact(&d, href.as_bytes());
        DescriptorRow::new(&d, &a)
    }

    #[test]
    fn test_example_scenario() {
        let d = descriptor("Jane A Doe", "/docs/x.pdf?hash=abc123");
        let body = b"%PDF-1.4...";
        let rows = descriptor_rows(&[d.clone()], &[Some(artifact(&d, body))]).unwrap();
        assert_eq!(rows[0].fileid, file_digest(body));
        assert_eq!(rows[0].last_name, "Doe");

        let roster = vec![entry("001", "Jane A Doe")];
        let joined = Reconciler::new("joined_table").reconcile(&roster, &rows).unwrap();
        assert_eq!(joined.len(), 1);
        assert_eq!(joined[0].last_name, "Doe");
        assert_eq!(joined[0].fileid, file_digest(body));
        assert_eq!(
            joined[0].revocation_id,
            record_digest(
                "joined_table",
                [
                    "001",
                    "Jane A Doe",
                    "Doe",
                    "https://example.org/docs/x.pdf?hash=abc123",
                    file_digest(body).as_str(),
                ]
            )
        );
    }

    #[test]
    fn test_missing_download_is_reported() {
        let a = descriptor("Jane A Doe", "/docs/a.pdf");
        let b = descriptor("John Roe", "/docs/b.pdf");
        let err = descriptor_rows(&[a.clone(), b], &[Some(artifact(&a, b"a")), None]).unwrap_err();
        match err {
            ArchiveError::IncompleteDownloads(missing) => {
                assert_eq!(missing, vec!["https://example.org/docs/b.pdf".to_string()]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_join_is_case_insensitive_on_last_name() {
        let roster = vec![entry("001", "Jane A DOE"), entry("002", "John Roe")];
        let rows = vec![row("John Roe", "/docs/b.pdf"), row("Jane A Doe", "/docs/a.pdf")];
        let joined = Reconciler::new("joined_table").reconcile(&roster, &rows).unwrap();
        assert_eq!(joined.len(), 2);
        assert_eq!(joined[0].roster.caseno, "001");
        assert_eq!(joined[0].pdfurl, "https://example.org/docs/a.pdf");
        assert_eq!(joined[1].pdfurl, "https://example.org/docs/b.pdf");
    }

    #[test]
    fn test_duplicate_roster_last_name() {
        let roster = vec![entry("001", "Jane A Doe"), entry("002", "John doe")];
        let err = Reconciler::check_roster(&roster).unwrap_err();
        assert!(matches!(err, ArchiveError::DuplicateLastName(_)));
    }

    #[test]
    fn test_size_mismatch() {
        let roster = vec![entry("001", "Jane A Doe")];
        let rows = vec![row("Jane A Doe", "/docs/a.pdf"), row("John Roe", "/docs/b.pdf")];
        let err = Reconciler::new("joined_table").reconcile(&roster, &rows).unwrap_err();
        assert!(matches!(
            err,
            ArchiveError::RosterSizeMismatch {
                roster: 1,
                scraped: 2
            }
        ));
    }

    #[test]
    fn test_unmatched_roster_entry_fails_join() {
        let roster = vec![entry("001", "Jane A Doe"), entry("002", "John Roe")];
        let rows = vec![row("Jane A Doe", "/docs/a.pdf"), row("Jim Doe", "/docs/c.pdf")];
        let err = Reconciler::new("joined_table").reconcile(&roster, &rows).unwrap_err();
        // Doe fans out to two rows and Roe matches none; totals alone would agree
        match err {
            ArchiveError::AmbiguousJoin { caseno, matches, .. } => {
                assert_eq!(caseno, "001");
                assert_eq!(matches, 2);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_roster_entry_without_record_fails_count_gate() {
        let roster = vec![entry("001", "Jane A Doe"), entry("002", "John Roe")];
        let rows = vec![row("Jane A Doe", "/docs/a.pdf"), row("Ann Smith", "/docs/s.pdf")];
        let err = Reconciler::new("joined_table").reconcile(&roster, &rows).unwrap_err();
        assert!(matches!(
            err,
            ArchiveError::JoinMismatch {
                roster: 2,
                joined: 1
            }
        ));
    }

    #[test]
    fn test_revocation_id_depends_on_label() {
        let roster = vec![entry("001", "Jane A Doe")];
        let rows = vec![row("Jane A Doe", "/docs/a.pdf")];
        let a = Reconciler::new("joined_table").reconcile(&roster, &rows).unwrap();
        let b = Reconciler::new("other").reconcile(&roster, &rows).unwrap();
        assert_ne!(a[0].revocation_id, b[0].revocation_id);
    }
}
