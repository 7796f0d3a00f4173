//! Input loading and path resolution.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context};
use serde_yaml::{Mapping, Value};

use revocation_archive::{ArchiveConfig, IdentityPool, SiteRosterEntry};

/// Environment fallback for `--agents`.
pub const AGENTS_ENV: &str = "REVOCATION_AGENTS";
/// Environment fallback for `--names`.
pub const NAMES_ENV: &str = "REVOCATION_NAMES";
/// Environment fallback for `--outdir`.
pub const OUTDIR_ENV: &str = "REVOCATION_OUTDIR";

/// Resolve an input path: explicit flag first, then the environment.
pub fn resolve_path(explicit: Option<&Path>, env_var: &str) -> anyhow::Result<PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }

    match std::env::var(env_var) {
        Ok(path) if !path.is_empty() => Ok(PathBuf::from(path)),
        _ => bail!("no path given and {env_var} is not set"),
    }
}

/// Load the identity pool from a YAML sequence of strings.
pub fn load_identities(path: &Path) -> anyhow::Result<IdentityPool> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading identities from {}", path.display()))?;
    parse_identities(&content).with_context(|| format!("parsing {}", path.display()))
}

pub fn parse_identities(yaml: &str) -> anyhow::Result<IdentityPool> {
    let tokens: Vec<String> = serde_yaml::from_str(yaml)?;
    Ok(IdentityPool::new(tokens)?)
}

/// Load the expected roster from a YAML mapping `caseno -> fields`.
///
/// `officer_name` is required; every other scalar field is kept as text.
/// Every entry ends up with the same set of extra fields: one missing from
/// an entry is filled with an empty string.
pub fn load_roster(path: &Path) -> anyhow::Result<Vec<SiteRosterEntry>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading roster from {}", path.display()))?;
    parse_roster(&content).with_context(|| format!("parsing {}", path.display()))
}

pub fn parse_roster(yaml: &str) -> anyhow::Result<Vec<SiteRosterEntry>> {
    let cases: Mapping = serde_yaml::from_str(yaml)?;

    let mut parsed = Vec::with_capacity(cases.len());
    let mut all_keys = BTreeSet::new();
    for (caseno, fields) in cases {
        let caseno = scalar_text(&caseno)
            .ok_or_else(|| anyhow!("case number must be a scalar, got {caseno:?}"))?;
        let Value::Mapping(fields) = fields else {
            bail!("case {caseno}: expected a mapping of fields");
        };

        let mut officer_name = None;
        let mut extra = BTreeMap::new();
        for (key, value) in fields {
            let key = scalar_text(&key)
                .ok_or_else(|| anyhow!("case {caseno}: field names must be scalars"))?;
            let value = scalar_text(&value)
                .ok_or_else(|| anyhow!("case {caseno}: field {key} is not a scalar"))?;
            if key == "officer_name" {
                officer_name = Some(value);
            } else if key == "caseno" {
                bail!("case {caseno}: caseno is the mapping key, not a field");
            } else {
                extra.insert(key, value);
            }
        }

        let officer_name =
            officer_name.ok_or_else(|| anyhow!("case {caseno}: missing officer_name"))?;
        all_keys.extend(extra.keys().cloned());
        parsed.push((caseno, officer_name, extra));
    }

    parsed
        .into_iter()
        .map(|(caseno, officer_name, mut extra)| -> anyhow::Result<SiteRosterEntry> {
            for key in &all_keys {
                extra.entry(key.clone()).or_default();
            }
            Ok(SiteRosterEntry::new(caseno, officer_name, extra)?)
        })
        .collect()
}

/// Load `ArchiveConfig` overrides, or defaults when no file is given.
pub fn load_archive_config(path: Option<&Path>) -> anyhow::Result<ArchiveConfig> {
    let Some(path) = path else {
        return Ok(ArchiveConfig::default());
    };
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading config from {}", path.display()))?;
    if content.trim().is_empty() {
        return Ok(ArchiveConfig::default());
    }
    serde_yaml::from_str(&content).with_context(|| format!("parsing {}", path.display()))
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null => Some(String::new()),
        _ => None,
    }
}
