//! Group content signatures
//!
//! A signature answers "can a previous computation be trusted", nothing
//! more: it hashes the group path and the name-sorted (name, timestamp)
//! pairs of the head modules, so it is insensitive to discovery order but
//! sensitive to any head, path or timestamp change.

use std::fmt;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

/// 20-byte SHA1 content signature of a closed group.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Signature([u8; 20]);

impl Signature {
    pub fn compute<'a>(
        path: &Path,
        heads: impl IntoIterator<Item = (&'a str, DateTime<Utc>)>,
    ) -> Self {
        let mut entries: Vec<(&str, DateTime<Utc>)> = heads.into_iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));

        let mut hasher = Sha1::new();
        hasher.update(path.to_string_lossy().as_bytes());
        for (name, stamp) in entries {
            hasher.update(name.as_bytes());
            hasher.update(stamp.timestamp_millis().to_le_bytes());
        }
        Self(hasher.finalize().into())
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Shortened form for display.
    pub fn short(&self) -> String {
        self.to_hex().chars().take(12).collect()
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({})", self.short())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn stamp(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn insensitive_to_head_order() {
        let a = Signature::compute(
            Path::new("/modules"),
            vec![("alpha", stamp(10)), ("beta", stamp(20))],
        );
        let b = Signature::compute(
            Path::new("/modules"),
            vec![("beta", stamp(20)), ("alpha", stamp(10))],
        );
        assert_eq!(a, b);
    }

    #[test]
    fn sensitive_to_path_name_and_timestamp() {
        let base = Signature::compute(Path::new("/modules"), vec![("alpha", stamp(10))]);
        assert_ne!(
            base,
            Signature::compute(Path::new("/other"), vec![("alpha", stamp(10))])
        );
        assert_ne!(
            base,
            Signature::compute(Path::new("/modules"), vec![("beta", stamp(10))])
        );
        assert_ne!(
            base,
            Signature::compute(Path::new("/modules"), vec![("alpha", stamp(11))])
        );
    }

    #[test]
    fn renders_as_forty_hex_chars() {
        let sig = Signature::compute(Path::new("/modules"), vec![("alpha", stamp(10))]);
        assert_eq!(sig.to_hex().len(), 40);
        assert_eq!(sig.short().len(), 12);
        assert_eq!(sig.as_bytes().len(), 20);
    }
}
