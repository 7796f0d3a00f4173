//! CSV writers for the two output tables.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;

use revocation_archive::{DescriptorRow, ReconciledRecord};

pub fn write_descriptor_table<W: Write>(out: W, rows: &[DescriptorRow]) -> anyhow::Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    if rows.is_empty() {
        writer.write_record([
            "officer_name",
            "href",
            "given_hash",
            "pdfurl",
            "filename",
            "fileid",
            "last_name",
        ])?;
    }
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

/// Header for the reconciled table. Extra roster fields come from the first
/// record; every record is checked against it on write.
fn reconciled_header(records: &[ReconciledRecord]) -> Vec<String> {
    let mut header = vec!["caseno".to_string(), "officer_name".to_string()];
    if let Some(first) = records.first() {
        header.extend(first.roster.extra.keys().cloned());
    }
    header.extend(
        ["last_name", "pdfurl", "fileid", "revocation_id"]
            .into_iter()
            .map(String::from),
    );
    header
}

pub fn write_reconciled_table<W: Write>(
    out: W,
    records: &[ReconciledRecord],
) -> anyhow::Result<()> {
    let header = reconciled_header(records);
    let extra_keys: Vec<&String> = records
        .first()
        .map(|r| r.roster.extra.keys().collect())
        .unwrap_or_default();

    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(&header)?;
    for record in records {
        let keys: Vec<&String> = record.roster.extra.keys().collect();
        if keys != extra_keys {
            anyhow::bail!(
                "case {} has roster fields {:?}, expected {:?}",
                record.roster.caseno,
                keys,
                extra_keys
            );
        }

        let mut fields = record.digest_fields();
        fields.push(record.revocation_id.as_str());
        writer.write_record(&fields)?;
    }
    writer.flush()?;
    Ok(())
}

/// Write both tables, or neither.
///
/// Both are rendered in memory and staged next to their targets; the targets
/// are only replaced once every staged file is complete.
pub fn write_tables(
    ref_out: &Path,
    rev_out: &Path,
    descriptors: &[DescriptorRow],
    reconciled: &[ReconciledRecord],
) -> anyhow::Result<()> {
    if ref_out == rev_out {
        anyhow::bail!("both tables would be written to {}", ref_out.display());
    }

    let mut ref_csv = Vec::new();
    write_descriptor_table(&mut ref_csv, descriptors)
        .with_context(|| format!("rendering {}", ref_out.display()))?;
    let mut rev_csv = Vec::new();
    write_reconciled_table(&mut rev_csv, reconciled)
        .with_context(|| format!("rendering {}", rev_out.display()))?;

    let staged = [stage(ref_out, &ref_csv)?, stage(rev_out, &rev_csv)?];
    for file in &staged {
        std::fs::rename(&file.path, &file.target)
            .with_context(|| format!("moving table into {}", file.target.display()))?;
    }

    tracing::info!("wrote {} and {}", ref_out.display(), rev_out.display());
    Ok(())
}

/// A complete table waiting to be renamed over its target. Removed on drop
/// unless the rename already moved it.
struct StagedFile {
    path: PathBuf,
    target: PathBuf,
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

fn stage(target: &Path, bytes: &[u8]) -> anyhow::Result<StagedFile> {
    let dir = match target.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
            parent.to_path_buf()
        }
        None => PathBuf::from("."),
    };
    let name = target
        .file_name()
        .with_context(|| format!("{} has no file name", target.display()))?
        .to_string_lossy();

    let staged = StagedFile {
        path: dir.join(format!(".{name}.{}.part", std::process::id())),
        target: target.to_path_buf(),
    };
    let mut file = std::fs::File::create(&staged.path)
        .with_context(|| format!("creating {}", staged.path.display()))?;
    file.write_all(bytes)?;
    file.sync_all()?;
    Ok(staged)
}
