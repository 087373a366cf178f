//! Content fingerprints for tracked files
//!
//! A fingerprint is the blake3 hash of a file's bytes, rendered as hex.
//! Two files with the same fingerprint are treated as identical by the
//! staleness policy; a mismatch (or a missing fingerprint) always means
//! "recompile".

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;

/// A blake3 content fingerprint
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Computes the fingerprint of a byte slice
    pub fn of_bytes(bytes: &[u8]) -> Self {
        Self(blake3::hash(bytes).to_hex().to_string())
    }

    /// Computes the fingerprint of a file's contents
    pub fn of_file(path: &Path) -> io::Result<Self> {
        Ok(Self::of_bytes(&fs::read(path)?))
    }

    /// Returns the hex rendering of the hash
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
