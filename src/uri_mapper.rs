//! Mapping filesystem paths to `package:` or virtual-filesystem URIs.

use std::path::Path;

use crate::error::DriverError;
use crate::file_uri::path_to_file_uri;
use crate::packages::{LineReader, PackagesReader};

/// Pure function object mapping an absolute filesystem path to a `package:`
/// or virtual-filesystem URI.
///
/// Construction reads the packages file once; [`URIMapper::map`] afterwards
/// is a cheap, allocation-light string operation.
#[derive(Debug, Clone)]
pub struct URIMapper {
    /// The package name resolved at construction time, if any prefix matched.
    package_name: Option<String>,
    /// URI prefixes to try, in order. Empty iff the mapper could not resolve
    /// any package for the given script.
    prefixes: Vec<String>,
}

impl URIMapper {
    /// Build a mapper for `script_path`, scanning `packages_path`'s package
    /// map (if given) for a matching prefix.
    ///
    /// Iteration over the packages map is insertion order: the first package
    /// whose prefix matches wins.
    ///
    /// # Errors
    /// Propagates I/O errors from reading the packages file.
    pub fn new(
        script_path: &str,
        packages_path: Option<&Path>,
        vfs_scheme: Option<&str>,
        vfs_roots: Option<&[String]>,
    ) -> Result<Self, DriverError> {
        Self::with_reader(&LineReader, script_path, packages_path, vfs_scheme, vfs_roots)
    }

    /// Same as [`URIMapper::new`] but with an injectable [`PackagesReader`],
    /// so callers (and tests) can avoid touching disk.
    pub fn with_reader(
        reader: &dyn PackagesReader,
        script_path: &str,
        packages_path: Option<&Path>,
        vfs_scheme: Option<&str>,
        vfs_roots: Option<&[String]>,
    ) -> Result<Self, DriverError> {
        let package_map = match packages_path {
            Some(path) => reader.read(path)?,
            None => Default::default(),
        };

        let script_uri = path_to_file_uri(script_path);

        // First pass: a vfs-scheme match, only when both scheme and roots are configured.
        if let (Some(scheme), Some(roots)) = (vfs_scheme, vfs_roots) {
            for (name, prefix) in &package_map {
                if prefix.contains(scheme) {
                    let prefixes = roots.iter().map(|r| path_to_file_uri(r)).collect();
                    return Ok(Self { package_name: Some(name.clone()), prefixes });
                }
            }
        }

        // Second pass: the script URI itself falls under some package's prefix.
        for (name, prefix) in &package_map {
            if script_uri.starts_with(prefix.as_str()) && prefix.len() < script_uri.len() {
                return Ok(Self { package_name: Some(name.clone()), prefixes: vec![prefix.clone()] });
            }
        }

        Ok(Self { package_name: None, prefixes: Vec::new() })
    }

    /// An empty mapper that always reports "not mappable". Useful when no
    /// packages file is configured at all.
    #[must_use]
    pub fn empty() -> Self {
        Self { package_name: None, prefixes: Vec::new() }
    }

    /// Map a filesystem path to a `package:` URI, or `None` if this mapper
    /// has no package bound, or no configured prefix matches.
    #[must_use]
    pub fn map(&self, path: &str) -> Option<String> {
        let package_name = self.package_name.as_ref()?;
        let uri = path_to_file_uri(path);
        for prefix in &self.prefixes {
            if let Some(remainder) = uri.strip_prefix(prefix.as_str()) {
                return Some(format!("package:{package_name}/{remainder}"));
            }
        }
        None
    }

    /// The package name this mapper resolved to, if any.
    #[must_use]
    pub fn package_name(&self) -> Option<&str> {
        self.package_name.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packages::PackageMap;

    struct FixedReader(PackageMap);

    impl PackagesReader for FixedReader {
        fn read(&self, _path: &Path) -> Result<PackageMap, DriverError> {
            Ok(self.0.clone())
        }
    }

    fn map_of(pairs: &[(&str, &str)]) -> PackageMap {
        pairs.iter().map(|(k, v)| ((*k).to_owned(), (*v).to_owned())).collect()
    }

    #[test]
    fn maps_path_under_package_prefix() {
        let reader = FixedReader(map_of(&[("p", "file:///p/lib/")]));
        let mapper = URIMapper::with_reader(
            &reader,
            "/p/lib/m.dart",
            Some(Path::new("/irrelevant")),
            None,
            None,
        )
        .unwrap();
        assert_eq!(mapper.map("/p/lib/sub/x.dart"), Some("package:p/sub/x.dart".to_owned()));
    }

    #[test]
    fn unmappable_path_yields_none() {
        let reader = FixedReader(map_of(&[("p", "file:///p/lib/")]));
        let mapper = URIMapper::with_reader(
            &reader,
            "/p/lib/m.dart",
            Some(Path::new("/irrelevant")),
            None,
            None,
        )
        .unwrap();
        assert_eq!(mapper.map("/other/x.dart"), None);
    }

    #[test]
    fn empty_mapper_never_maps() {
        let reader = FixedReader(map_of(&[]));
        let mapper = URIMapper::with_reader(&reader, "/p/lib/m.dart", None, None, None).unwrap();
        assert_eq!(mapper.map("/p/lib/m.dart"), None);
        assert_eq!(mapper.package_name(), None);
    }

    #[test]
    fn first_matching_prefix_wins_in_insertion_order() {
        // Both "a" and "b" prefixes would match; "a" must win since it comes first.
        let reader = FixedReader(map_of(&[("a", "file:///shared/"), ("b", "file:///shared/lib/")]));
        let mapper =
            URIMapper::with_reader(&reader, "/shared/lib/m.dart", Some(Path::new("x")), None, None)
                .unwrap();
        assert_eq!(mapper.package_name(), Some("a"));
    }

    #[test]
    fn vfs_scheme_match_takes_priority_over_prefix_match() {
        let reader = FixedReader(map_of(&[("vfspkg", "org-dartlang-vfs:///p/lib/")]));
        let roots = vec!["/build/root".to_owned()];
        let mapper = URIMapper::with_reader(
            &reader,
            "/build/root/lib/m.dart",
            Some(Path::new("x")),
            Some("org-dartlang-vfs"),
            Some(&roots),
        )
        .unwrap();
        assert_eq!(mapper.package_name(), Some("vfspkg"));
        assert_eq!(
            mapper.map("/build/root/lib/m.dart"),
            Some("package:vfspkg/lib/m.dart".to_owned())
        );
    }

    proptest::proptest! {
        #[test]
        fn mapping_a_path_under_the_chosen_prefix_always_starts_with_package_scheme(
            suffix in "[a-z_/]{1,32}\\.dart",
        ) {
            let reader = FixedReader(map_of(&[("p", "file:///p/lib/")]));
            let mapper = URIMapper::with_reader(&reader, "/p/lib/m.dart", Some(Path::new("x")), None, None).unwrap();
            let path = format!("/p/lib/{suffix}");
            if let Some(uri) = mapper.map(&path) {
                proptest::prop_assert!(uri.starts_with("package:p/"));
            }
        }
    }
}
