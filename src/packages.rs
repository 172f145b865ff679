//! The on-disk package-name to URI-prefix map.
//!
//! Parsing the packages file format itself is treated as an external
//! collaborator boundary: [`PackagesReader`] is the seam, [`LineReader`] is
//! the one real implementation this crate ships, and tests can substitute a
//! fake that returns a fixed [`PackageMap`] without touching disk.

use std::fs;
use std::path::Path;

use indexmap::IndexMap;

use crate::error::DriverError;

/// Ordered `package name -> prefix URI` mapping.
///
/// Order is insertion order from the source file, which is the order
/// [`crate::uri_mapper::URIMapper`] must scan in for first-match-wins
/// behavior to be deterministic.
pub type PackageMap = IndexMap<String, String>;

/// Reads a packages file into a [`PackageMap`].
pub trait PackagesReader: Send + Sync {
    /// Read and parse the packages file at `path`.
    ///
    /// # Errors
    /// Returns [`DriverError::Io`] if the file cannot be read. A malformed
    /// individual line is skipped rather than failing the whole read, since
    /// the frontend server tolerates the same.
    fn read(&self, path: &Path) -> Result<PackageMap, DriverError>;
}

/// Reads the classic line-oriented packages file format:
/// one `package_name:prefix_uri` pair per line, `#`-prefixed comments and
/// blank lines ignored.
#[derive(Debug, Clone, Copy, Default)]
pub struct LineReader;

impl PackagesReader for LineReader {
    fn read(&self, path: &Path) -> Result<PackageMap, DriverError> {
        let contents = fs::read_to_string(path)?;
        let mut map = PackageMap::new();
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((name, prefix)) = line.split_once(':') {
                map.insert(name.to_owned(), prefix.to_owned());
            }
        }
        Ok(map)
    }
}
