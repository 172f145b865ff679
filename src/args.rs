//! Shared assembly of the frontend server's command-line, used by both the
//! batch driver and the resident session's cold-compile spawn.

use std::path::{Path, PathBuf};

use crate::file_uri::ensure_trailing_slash;
use crate::target::TargetModel;
use crate::uri_mapper::URIMapper;

/// Fields shared between [`crate::batch::BatchOptions`] and
/// [`crate::session::SessionConfig`] that feed the common prefix of the
/// frontend server's argument list.
#[derive(Debug, Clone)]
pub struct CommonCompileArgs<'a> {
    pub sdk_root: &'a str,
    pub target_model: TargetModel,
    pub track_widget_creation: bool,
    pub link_platform: bool,
    pub aot: bool,
    pub product_vm: bool,
    pub incremental: bool,
    pub packages_path: Option<&'a Path>,
    pub extra_session_packages_path: Option<&'a Path>,
    pub output_path: Option<&'a Path>,
    pub depfile_path: Option<&'a Path>,
    pub vfs_roots: &'a [String],
    pub vfs_scheme: Option<&'a str>,
    pub extra_options: &'a [String],
}

/// Build the stable-order flag list the frontend server expects, plus the
/// resolved main URI as the final positional argument.
///
/// Does not include the compiler binary itself — [`crate::process::ProcessSpawner`]
/// takes that separately. The first element is the frontend snapshot path.
///
/// `main_path` is resolved through `mapper`; if unmappable, the raw path is
/// used verbatim.
#[must_use]
pub fn build_args(common: &CommonCompileArgs<'_>, snapshot: &Path, main_path: &str, mapper: &URIMapper) -> Vec<String> {
    let mut args = Vec::new();
    args.push(snapshot.display().to_string());
    args.push("--sdk-root".to_owned());
    args.push(ensure_trailing_slash(common.sdk_root));
    args.push("--strong".to_owned());
    args.push(format!("--target={}", common.target_model));

    if common.track_widget_creation {
        args.push("--track-widget-creation".to_owned());
    }
    if !common.link_platform {
        args.push("--no-link-platform".to_owned());
    }
    if common.aot {
        args.push("--aot".to_owned());
        args.push("--tfa".to_owned());
    }
    if common.product_vm {
        args.push("-Ddart.vm.product=true".to_owned());
    }
    if common.incremental {
        args.push("--incremental".to_owned());
    }

    // Both a request-scoped and a session-scoped packages path may be
    // forwarded, producing `--packages` twice. Reproduced verbatim rather
    // than deduplicated; see DESIGN.md.
    if let Some(packages) = common.packages_path {
        args.push("--packages".to_owned());
        args.push(packages.display().to_string());
    }
    if let Some(packages) = common.extra_session_packages_path {
        args.push("--packages".to_owned());
        args.push(packages.display().to_string());
    }

    if let Some(output) = common.output_path {
        args.push("--output-dill".to_owned());
        args.push(output.display().to_string());
    }

    if common.vfs_roots.is_empty() {
        if let Some(depfile) = common.depfile_path {
            args.push("--depfile".to_owned());
            args.push(depfile.display().to_string());
        }
    }

    for root in common.vfs_roots {
        args.push("--filesystem-root".to_owned());
        args.push(root.clone());
    }
    if let Some(scheme) = common.vfs_scheme {
        args.push("--filesystem-scheme".to_owned());
        args.push(scheme.to_owned());
    }

    args.extend(common.extra_options.iter().cloned());

    args.push(resolve_main_uri(main_path, mapper));
    args
}

/// Resolve a main-entrypoint path through `mapper`, falling back to the raw
/// path if the mapper cannot place it.
#[must_use]
pub fn resolve_main_uri(main_path: &str, mapper: &URIMapper) -> String {
    mapper.map(main_path).unwrap_or_else(|| main_path.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_args<'a>(sdk_root: &'a str) -> CommonCompileArgs<'a> {
        CommonCompileArgs {
            sdk_root,
            target_model: TargetModel::Flutter,
            track_widget_creation: false,
            link_platform: true,
            aot: false,
            product_vm: false,
            incremental: false,
            packages_path: None,
            extra_session_packages_path: None,
            output_path: None,
            depfile_path: None,
            vfs_roots: &[],
            vfs_scheme: None,
            extra_options: &[],
        }
    }

    #[test]
    fn sdk_root_gets_trailing_slash_and_strong_flag_present() {
        let common = base_args("/sdk");
        let mapper = URIMapper::empty();
        let args = build_args(&common, Path::new("/sdk/frontend.snapshot"), "/p/main.dart", &mapper);
        assert!(args.contains(&"--sdk-root".to_owned()));
        assert!(args.contains(&"/sdk/".to_owned()));
        assert!(args.contains(&"--strong".to_owned()));
    }

    #[test]
    fn depfile_omitted_when_vfs_roots_present() {
        let mut common = base_args("/sdk");
        let roots = vec!["/build/root".to_owned()];
        common.vfs_roots = &roots;
        common.depfile_path = Some(Path::new("/out/app.deps"));
        let mapper = URIMapper::empty();
        let args = build_args(&common, Path::new("/snap"), "/p/m.dart", &mapper);
        assert!(!args.contains(&"--depfile".to_owned()), "depfile flag must be suppressed when vfs roots are configured");
        assert!(args.contains(&"--filesystem-root".to_owned()));
    }

    #[test]
    fn packages_forwarded_twice_when_both_scopes_configured() {
        let mut common = base_args("/sdk");
        common.packages_path = Some(Path::new("/a/.packages"));
        common.extra_session_packages_path = Some(Path::new("/b/.packages"));
        let mapper = URIMapper::empty();
        let args = build_args(&common, Path::new("/snap"), "/p/m.dart", &mapper);
        let packages_count = args.iter().filter(|a| *a == "--packages").count();
        assert_eq!(packages_count, 2, "both packages paths must be forwarded, reproducing the upstream quirk");
    }

    #[test]
    fn unmappable_main_path_is_passed_through_verbatim() {
        let common = base_args("/sdk");
        let mapper = URIMapper::empty();
        let args = build_args(&common, Path::new("/snap"), "/p/main.dart", &mapper);
        assert_eq!(args.last().map(String::as_str), Some("/p/main.dart"));
    }
}
