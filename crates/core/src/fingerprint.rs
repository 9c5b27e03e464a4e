//! SHA-256 fingerprinting shared by the fetcher, package cache, and
//! environment builder.

use dashmap::DashMap;
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::{Path, PathBuf};

/// Hex-encodes the SHA-256 digest of `bytes`.
#[must_use]
pub fn sha256_hex(bytes: impl AsRef<[u8]>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes.as_ref());
    hex::encode(hasher.finalize())
}

/// Streams `reader` through SHA-256 without holding the whole file in
/// memory, for use while a fetch or cache revalidation is in flight.
pub fn sha256_hex_reader<R: Read>(mut reader: R) -> std::io::Result<String> {
    let mut hasher = Sha256::new();
    let mut buf = [0_u8; 64 * 1024];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Computes a SHA-256 digest of a file's bytes on disk.
pub fn sha256_hex_file(path: impl AsRef<Path>) -> std::io::Result<String> {
    let file = std::fs::File::open(path)?;
    sha256_hex_reader(std::io::BufReader::new(file))
}

/// Truncates a hex fingerprint to the first `n` characters, as used for the
/// environment builder's directory-naming scheme.
#[must_use]
pub fn truncate_hex(fingerprint: &str, n: usize) -> String {
    fingerprint.chars().take(n).collect()
}

/// Map of content fingerprint to the cached artifact directory that holds
/// it. Shared by the package cache (keyed by the full 64-hex fingerprint)
/// so repeated lookups avoid re-hashing a file whose fingerprint is
/// already known for this process lifetime.
#[derive(Debug, Default)]
pub struct FingerprintIndex {
    entries: DashMap<String, PathBuf>,
}

impl FingerprintIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, fingerprint: &str) -> Option<PathBuf> {
        self.entries.get(fingerprint).map(|e| e.clone())
    }

    pub fn insert(&self, fingerprint: impl Into<String>, path: PathBuf) {
        self.entries.insert(fingerprint.into(), path);
    }

    pub fn remove(&self, fingerprint: &str) {
        self.entries.remove(fingerprint);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_hex_matches_known_vector() {
        // SHA-256("") = e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn truncate_hex_takes_prefix() {
        assert_eq!(truncate_hex("abcdef0123456789", 7), "abcdef0");
    }

    #[test]
    fn index_round_trips() {
        let idx = FingerprintIndex::new();
        idx.insert("deadbeef", PathBuf::from("/tmp/x"));
        assert_eq!(idx.get("deadbeef"), Some(PathBuf::from("/tmp/x")));
        idx.remove("deadbeef");
        assert_eq!(idx.get("deadbeef"), None);
    }
}
