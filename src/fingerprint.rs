//! Fingerprint-gated skip for the batch compile path.
//!
//! A fingerprint is a stable hash over a compile's inputs and the properties
//! that affect its output; matching a freshly computed one against a
//! persisted one lets [`crate::batch::BatchDriver`] skip a redundant spawn.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::DriverError;

/// A hash over a compile's key properties and its input files (including the
/// depfile's own listed inputs).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint {
    digest: String,
}

impl Fingerprint {
    /// Build a fingerprint from a set of `key=value` properties and the
    /// concatenated byte contents of a list of input files.
    ///
    /// Missing input files are treated as empty content rather than an
    /// error: a fingerprint for a not-yet-built output should simply fail to
    /// match, not block the batch compile from proceeding.
    #[must_use]
    pub fn compute(properties: &BTreeMap<String, String>, input_paths: &[PathBuf]) -> Self {
        let mut hasher = Sha256::new();
        for (key, value) in properties {
            hasher.update(key.as_bytes());
            hasher.update(b"=");
            hasher.update(value.as_bytes());
            hasher.update(b"\n");
        }
        for path in input_paths {
            hasher.update(path.to_string_lossy().as_bytes());
            hasher.update(b":");
            if let Ok(contents) = fs::read(path) {
                hasher.update(&contents);
            }
            hasher.update(b"\n");
        }
        let digest = format!("{:x}", hasher.finalize());
        Self { digest }
    }
}

/// Persists and compares fingerprints for the batch compile's skip check.
pub trait FingerprintStore: Send + Sync {
    /// Read the persisted fingerprint for `depfile_path`, if any.
    fn load(&self, depfile_path: &Path) -> Option<Fingerprint>;

    /// Persist `fingerprint` for `depfile_path`.
    ///
    /// # Errors
    /// Returns [`DriverError::Io`] if the fingerprint file cannot be written.
    fn persist(&self, depfile_path: &Path, fingerprint: &Fingerprint) -> Result<(), DriverError>;
}

/// Fingerprint layout `<depFilePath>.fingerprint`, JSON-encoded.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileFingerprintStore;

impl FileFingerprintStore {
    fn fingerprint_path(depfile_path: &Path) -> PathBuf {
        let mut os_string = depfile_path.as_os_str().to_owned();
        os_string.push(".fingerprint");
        PathBuf::from(os_string)
    }
}

impl FingerprintStore for FileFingerprintStore {
    fn load(&self, depfile_path: &Path) -> Option<Fingerprint> {
        let contents = fs::read_to_string(Self::fingerprint_path(depfile_path)).ok()?;
        serde_json::from_str(&contents).ok()
    }

    fn persist(&self, depfile_path: &Path, fingerprint: &Fingerprint) -> Result<(), DriverError> {
        let contents = serde_json::to_string(fingerprint)
            .map_err(|e| DriverError::CompileFailed(format!("serializing fingerprint: {e}")))?;
        fs::write(Self::fingerprint_path(depfile_path), contents)?;
        Ok(())
    }
}

/// Decides whether a batch compile may be skipped.
pub struct FingerprintGate<'a> {
    store: &'a dyn FingerprintStore,
}

impl<'a> FingerprintGate<'a> {
    /// Wrap a [`FingerprintStore`].
    #[must_use]
    pub fn new(store: &'a dyn FingerprintStore) -> Self {
        Self { store }
    }

    /// Returns `true` and does nothing else if the freshly computed
    /// fingerprint matches the one persisted for `depfile_path`.
    #[must_use]
    pub fn matches(&self, depfile_path: &Path, fresh: &Fingerprint) -> bool {
        self.store.load(depfile_path).as_ref() == Some(fresh)
    }

    /// Persist `fresh` as the new fingerprint for `depfile_path`.
    ///
    /// # Errors
    /// Propagates the underlying store's write failure.
    pub fn persist(&self, depfile_path: &Path, fresh: &Fingerprint) -> Result<(), DriverError> {
        self.store.persist(depfile_path, fresh)
    }
}

/// Inputs listed in a Make-style depfile, filtering out build-slave-local
/// paths that never resolve on the machine running this driver.
///
/// Depfile format: `output: input1 input2 ...`, possibly wrapped across
/// multiple lines with a trailing `\`.
#[must_use]
pub fn read_depfile_inputs(depfile_path: &Path) -> Vec<PathBuf> {
    let Ok(contents) = fs::read_to_string(depfile_path) else {
        return Vec::new();
    };
    let joined = contents.replace("\\\n", " ");
    let Some((_, inputs)) = joined.split_once(':') else {
        return Vec::new();
    };
    inputs
        .split_whitespace()
        .filter(|p| !p.starts_with("/b/build/slave/"))
        .map(PathBuf::from)
        .collect()
}
