//! Short content and record digests.
//!
//! Both digests are SHA-1 truncated to [`SHORT_HASH_LEN`](crate::types::SHORT_HASH_LEN)
//! hex characters. They are identifiers, not a security boundary.

use sha1::{Digest, Sha1};

use crate::types::ShortHash;

/// Digest of raw file content.
pub fn file_digest(bytes: &[u8]) -> ShortHash {
    let mut hasher = Sha1::new();
    hasher.update(bytes);
    ShortHash::from_hex_digest(&hex::encode(hasher.finalize()))
}

/// Digest of a dataset label followed by each field's string form.
///
/// Fields are fed in the given order with no separator, so the caller's field
/// order is part of the identifier. See
/// [`ReconciledRecord::digest_fields`](crate::types::ReconciledRecord::digest_fields)
/// for the pinned order used for reconciled records.
pub fn record_digest<I, F>(dataset_label: &str, fields: I) -> ShortHash
where
    I: IntoIterator<Item = F>,
    F: AsRef<str>,
{
    let mut hasher = Sha1::new();
    hasher.update(dataset_label.as_bytes());
    for field in fields {
        hasher.update(field.as_ref().as_bytes());
    }
    ShortHash::from_hex_digest(&hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_digest_known_vector() {
        // sha1("abc") = a9993e364706816aba3e25717850c26c9cd0d89d
        assert_eq!(file_digest(b"abc").as_str(), "a9993e36");
        // sha1("") = da39a3ee5e6b4b0d3255bfef95601890afd80709
        assert_eq!(file_digest(b"").as_str(), "da39a3ee");
    }

    #[test]
    fn test_record_digest_is_label_plus_concatenation() {
        // label "a" + fields ["b", "c"] hashes the same bytes as "abc"
        assert_eq!(record_digest("a", ["b", "c"]).as_str(), "a9993e36");
    }

    #[test]
    fn test_record_digest_sensitivity() {
        let base = record_digest("joined_table", ["001", "Jane A Doe", "Doe"]);
        assert_eq!(base, record_digest("joined_table", ["001", "Jane A Doe", "Doe"]));
        assert_ne!(base, record_digest("joined_table", ["002", "Jane A Doe", "Doe"]));
        assert_ne!(base, record_digest("other_table", ["001", "Jane A Doe", "Doe"]));
        assert_ne!(base, record_digest("joined_table", ["Jane A Doe", "001", "Doe"]));
    }
}
