//! One-shot batch compile with fingerprint-gated caching.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tokio::io::AsyncBufReadExt;
use tokio::io::AsyncWriteExt;

use crate::args::{build_args, CommonCompileArgs};
use crate::artifacts::ArtifactLocator;
use crate::diagnostics::{DiagnosticSink, Emphasis};
use crate::error::DriverError;
use crate::fingerprint::{read_depfile_inputs, Fingerprint, FingerprintGate, FingerprintStore};
use crate::frame::{CompilerOutput, StdoutFramer};
use crate::process::ProcessSpawner;
use crate::target::TargetModel;
use crate::uri_mapper::URIMapper;

/// Options for a single batch compile.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct BatchOptions {
    /// SDK root passed as `--sdk-root`.
    pub sdk_root: String,
    /// Entry point (main) source path.
    pub main_path: PathBuf,
    /// Output kernel file path.
    pub output_path: PathBuf,
    /// Depfile path; also used as the fingerprint key.
    pub depfile_path: Option<PathBuf>,
    /// `--target=` value.
    pub target_model: TargetModel,
    /// Whether to pass `--no-link-platform`.
    pub link_platform: bool,
    /// Whether to pass `--aot --tfa`.
    pub aot: bool,
    /// Whether to pass `--track-widget-creation`.
    pub track_widget_creation: bool,
    /// Extra options appended verbatim, in order.
    pub extra_options: Vec<String>,
    /// Enables `--incremental` when set.
    pub incremental_byte_store_path: Option<PathBuf>,
    /// Packages file, also resolves `main_path` through a [`URIMapper`].
    pub packages_path: Option<PathBuf>,
    /// Virtual filesystem roots, in order.
    pub vfs_roots: Vec<String>,
    /// Virtual filesystem scheme.
    pub vfs_scheme: Option<String>,
    /// Whether to pass `-Ddart.vm.product=true`.
    pub product_vm: bool,
}

impl BatchOptions {
    /// Build an otherwise-default `BatchOptions` for the required fields.
    ///
    /// # Errors
    /// Returns [`DriverError::InvalidState`] if `sdk_root` is empty.
    pub fn new(sdk_root: impl Into<String>, main_path: impl Into<PathBuf>, output_path: impl Into<PathBuf>, target_model: TargetModel) -> Result<Self, DriverError> {
        let sdk_root = sdk_root.into();
        if sdk_root.trim().is_empty() {
            return Err(DriverError::InvalidState("sdk_root must not be empty".to_owned()));
        }
        Ok(Self {
            sdk_root,
            main_path: main_path.into(),
            output_path: output_path.into(),
            depfile_path: None,
            target_model,
            link_platform: true,
            aot: false,
            track_widget_creation: false,
            extra_options: Vec::new(),
            incremental_byte_store_path: None,
            packages_path: None,
            vfs_roots: Vec::new(),
            vfs_scheme: None,
            product_vm: false,
        })
    }
}

/// Drives a single one-shot compile, skipping the spawn entirely on a
/// fingerprint hit.
pub struct BatchDriver<'a> {
    artifacts: &'a dyn ArtifactLocator,
    spawner: &'a dyn ProcessSpawner,
    fingerprint_store: &'a dyn FingerprintStore,
    sink: &'a dyn DiagnosticSink,
}

impl<'a> BatchDriver<'a> {
    /// Build a batch driver from its four collaborators.
    #[must_use]
    pub fn new(artifacts: &'a dyn ArtifactLocator, spawner: &'a dyn ProcessSpawner, fingerprint_store: &'a dyn FingerprintStore, sink: &'a dyn DiagnosticSink) -> Self {
        Self { artifacts, spawner, fingerprint_store, sink }
    }

    /// Run a single one-shot batch compile, skipping the spawn on a fingerprint hit.
    ///
    /// # Errors
    /// - [`DriverError::ToolMissing`] if the compiler binary is not runnable.
    /// - [`DriverError::CompileFailed`] if the child exits non-zero.
    /// - Propagates I/O errors from spawning or fingerprint persistence.
    pub async fn compile(&self, options: &BatchOptions) -> Result<CompilerOutput, DriverError> {
        if !self.artifacts.is_runnable() {
            return Err(DriverError::ToolMissing { path: self.artifacts.compiler_binary() });
        }

        let fingerprint_gate = self.prepare_fingerprint(options);
        if let Some((depfile, fresh)) = &fingerprint_gate {
            let gate = FingerprintGate::new(self.fingerprint_store);
            if gate.matches(depfile, fresh) {
                return Ok(CompilerOutput {
                    output_file: Some(options.output_path.display().to_string()),
                    error_count: 0,
                });
            }
        }

        let mapper = match &options.packages_path {
            Some(packages) => URIMapper::new(
                &options.main_path.display().to_string(),
                Some(packages.as_path()),
                options.vfs_scheme.as_deref(),
                Some(options.vfs_roots.as_slice()),
            )?,
            None => URIMapper::empty(),
        };

        let common = CommonCompileArgs {
            sdk_root: &options.sdk_root,
            target_model: options.target_model,
            track_widget_creation: options.track_widget_creation,
            link_platform: options.link_platform,
            aot: options.aot,
            product_vm: options.product_vm,
            incremental: options.incremental_byte_store_path.is_some(),
            packages_path: options.packages_path.as_deref(),
            extra_session_packages_path: None,
            output_path: Some(&options.output_path),
            depfile_path: options.depfile_path.as_deref(),
            vfs_roots: &options.vfs_roots,
            vfs_scheme: options.vfs_scheme.as_deref(),
            extra_options: &options.extra_options,
        };

        let full_args = build_args(&common, &self.artifacts.frontend_snapshot(), &options.main_path.display().to_string(), &mapper);
        let binary = self.artifacts.compiler_binary();

        let mut spawned = self
            .spawner
            .spawn(&binary, &full_args)
            .await
            .map_err(|e| DriverError::SpawnFailed(e.to_string()))?;

        let mut framer = StdoutFramer::new();
        let result_rx = framer.reset(false);

        let mut stdout_lines = spawned.stdout;
        let mut stderr_lines = spawned.stderr;
        let sink = self.sink;

        let stdout_task = async {
            let mut buf = String::new();
            loop {
                buf.clear();
                match stdout_lines.read_line(&mut buf).await {
                    Ok(0) | Err(_) => {
                        framer.on_eof();
                        break;
                    }
                    Ok(_) => {
                        let line = buf.trim_end_matches(['\n', '\r']);
                        framer.feed_line(line, sink);
                    }
                }
            }
        };

        let stderr_task = async {
            let mut buf = String::new();
            loop {
                buf.clear();
                match stderr_lines.read_line(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {
                        let line = buf.trim_end_matches(['\n', '\r']);
                        sink.emit(Emphasis::Plain, line);
                    }
                }
            }
        };

        // No further writes are needed on stdin for a batch compile; the
        // frontend server reads its work from the command line.
        let _ = spawned.stdin.shutdown().await;

        let ((), (), exit) = tokio::join!(stdout_task, stderr_task, spawned.handle.wait());
        let exit = exit.map_err(DriverError::Io)?;

        let output = result_rx.await.unwrap_or(CompilerOutput { output_file: None, error_count: 0 });

        if !exit.is_success() {
            return Err(DriverError::CompileFailed(format!("frontend server exited with {exit:?}")));
        }

        if let Some((depfile, fresh)) = fingerprint_gate {
            let gate = FingerprintGate::new(self.fingerprint_store);
            gate.persist(&depfile, &fresh)?;
        }

        Ok(output)
    }

    fn prepare_fingerprint(&self, options: &BatchOptions) -> Option<(PathBuf, Fingerprint)> {
        let depfile = options.depfile_path.clone()?;

        let mut properties = BTreeMap::new();
        properties.insert("entryPoint".to_owned(), options.main_path.display().to_string());
        properties.insert("trackWidgetCreation".to_owned(), options.track_widget_creation.to_string());
        properties.insert("linkPlatformKernelIn".to_owned(), options.link_platform.to_string());

        let mut inputs = vec![options.main_path.clone()];
        inputs.extend(read_depfile_inputs(&depfile));

        let fresh = Fingerprint::compute(&properties, &inputs);
        Some((depfile, fresh))
    }
}
