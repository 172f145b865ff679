//! The resident compiler session: a long-lived child process driven by a
//! serialized sequence of recompile / expression-compile / accept / reject /
//! reset commands.

use std::path::{Path, PathBuf};
use std::pin::Pin;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{oneshot, Mutex as AsyncMutex};
use uuid::Uuid;

use crate::args::{build_args, resolve_main_uri, CommonCompileArgs};
use crate::artifacts::ArtifactLocator;
use crate::diagnostics::{DiagnosticSink, Emphasis};
use crate::error::DriverError;
use crate::file_uri::file_uri_to_path;
use crate::frame::{CompilerOutput, StdoutFramer};
use crate::process::{ChildHandle, ProcessSpawner};
use crate::target::TargetModel;
use crate::uri_mapper::URIMapper;

/// Configuration fixed for the lifetime of a [`ResidentSession`].
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct SessionConfig {
    /// SDK root passed as `--sdk-root`.
    pub sdk_root: String,
    /// Whether to pass `--track-widget-creation`.
    pub track_widget_creation: bool,
    /// Session-scoped packages file, used when a request doesn't supply its own.
    pub packages_path: Option<PathBuf>,
    /// Virtual filesystem roots, in order.
    pub vfs_roots: Vec<String>,
    /// Virtual filesystem scheme.
    pub vfs_scheme: Option<String>,
    /// `--initialize-from-dill` argument, if configured.
    pub initialize_from_dill: Option<PathBuf>,
    /// `--target=` value.
    pub target_model: TargetModel,
    /// Whether to pass `--unsafe-package-serialization`.
    pub unsafe_package_serialization: bool,
    /// Experimental flags, joined with `,` into `--enable-experiment=`.
    pub experimental_flags: Vec<String>,
}

impl SessionConfig {
    /// Build a config, validating the fields that must be non-empty at
    /// construction time rather than on first use.
    ///
    /// # Errors
    /// Returns [`DriverError::InvalidState`] if `sdk_root` is empty.
    pub fn new(sdk_root: impl Into<String>, target_model: TargetModel) -> Result<Self, DriverError> {
        let sdk_root = sdk_root.into();
        if sdk_root.trim().is_empty() {
            return Err(DriverError::InvalidState("sdk_root must not be empty".to_owned()));
        }
        Ok(Self {
            sdk_root,
            track_widget_creation: false,
            packages_path: None,
            vfs_roots: Vec::new(),
            vfs_scheme: None,
            initialize_from_dill: None,
            target_model,
            unsafe_package_serialization: false,
            experimental_flags: Vec::new(),
        })
    }
}

/// A recompile request; the first one submitted to a session acts as the
/// cold compile and ignores `invalidated`.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct RecompileRequest {
    /// Entry point. Required for the cold compile; optional afterwards (the
    /// session reuses the previously resolved main path when omitted).
    pub main_path: Option<PathBuf>,
    /// Files invalidated since the last recompile, as paths or `file:` URIs.
    pub invalidated: Vec<String>,
    /// Output kernel file path.
    pub output_path: PathBuf,
    /// Request-scoped packages file, preferred over the session's.
    pub packages_path: Option<PathBuf>,
}

impl RecompileRequest {
    /// Build a recompile request with no invalidated files and no
    /// request-scoped packages path.
    #[must_use]
    pub fn new(output_path: impl Into<PathBuf>) -> Self {
        Self { main_path: None, invalidated: Vec::new(), output_path: output_path.into(), packages_path: None }
    }
}

/// An expression-evaluation request.
#[derive(Debug, Clone, Default)]
#[non_exhaustive]
pub struct CompileExpressionRequest {
    /// The expression source text.
    pub expression: String,
    /// Local variable definitions visible to the expression.
    pub definitions: Vec<String>,
    /// Local type-parameter definitions visible to the expression.
    pub type_definitions: Vec<String>,
    /// The enclosing library URI, if evaluating in a library/class scope.
    pub library_uri: Option<String>,
    /// The enclosing class name, if evaluating in an instance scope.
    pub klass: Option<String>,
    /// Whether evaluation happens in a static context.
    pub is_static: Option<bool>,
}

enum SessionState {
    NotStarted,
    Running { child: RunningChild, awaiting_confirmation: bool },
    /// The cold compile's spawn failed. A broken session never retries the
    /// spawn on its own; every subsequent request fails fast with the
    /// original spawn error instead of silently falling back to
    /// `NotStarted` and re-spawning.
    Broken(String),
    ShutDown,
}

struct RunningChild {
    stdin: Pin<Box<dyn AsyncWrite + Send>>,
    stdout: Pin<Box<dyn AsyncBufRead + Send>>,
    stderr: Pin<Box<dyn AsyncBufRead + Send>>,
    handle: Box<dyn ChildHandle>,
    framer: StdoutFramer,
    /// Set once the child's stdout has closed; a poisoned session refuses
    /// further commands rather than hanging on a result that can never come.
    poisoned: bool,
    /// The most recently resolved main-entrypoint path, reused by recompile
    /// requests that omit one.
    last_main_path: String,
}

/// Owns a frontend server child process and serializes requests against it.
///
/// All stdin writes and framer-result awaits happen inside
/// [`crate::queue::RequestQueue::run`], so two requests submitted
/// concurrently never interleave their wire traffic.
pub struct ResidentSession<'a> {
    config: SessionConfig,
    artifacts: &'a dyn ArtifactLocator,
    spawner: &'a dyn ProcessSpawner,
    sink: &'a dyn DiagnosticSink,
    queue: crate::queue::RequestQueue,
    state: AsyncMutex<SessionState>,
}

impl<'a> ResidentSession<'a> {
    /// Build a session in the `NotStarted` state. No process is spawned
    /// until the first [`ResidentSession::recompile`] call.
    #[must_use]
    pub fn new(config: SessionConfig, artifacts: &'a dyn ArtifactLocator, spawner: &'a dyn ProcessSpawner, sink: &'a dyn DiagnosticSink) -> Self {
        Self { config, artifacts, spawner, sink, queue: crate::queue::RequestQueue::new(), state: AsyncMutex::new(SessionState::NotStarted) }
    }

    /// Submit a recompile. The first call on a fresh session performs the
    /// cold compile and ignores `request.invalidated`.
    ///
    /// # Errors
    /// [`DriverError::InvalidState`] if the session has been shut down or the
    /// cold compile is missing a main path; [`DriverError::ToolMissing`] if
    /// the compiler binary is not runnable; [`DriverError::UnexpectedExit`]
    /// if the child's stdout closed on a previous command.
    pub async fn recompile(&self, request: RecompileRequest) -> Result<CompilerOutput, DriverError> {
        self.queue
            .run(|sequence| async move {
                tracing::debug!(sequence, "recompile");
                let mut state = self.state.lock().await;
                self.handle_recompile(&mut state, &request).await
            })
            .await
    }

    /// Submit an expression-evaluation request. Completes with an absent
    /// result, writing nothing, if the session has never cold-compiled.
    ///
    /// # Errors
    /// See [`ResidentSession::recompile`].
    pub async fn compile_expression(&self, request: CompileExpressionRequest) -> Result<CompilerOutput, DriverError> {
        self.queue
            .run(|sequence| async move {
                tracing::debug!(sequence, "compile-expression");
                let mut state = self.state.lock().await;
                if let SessionState::Broken(reason) = &*state {
                    return Err(DriverError::SpawnFailed(reason.clone()));
                }
                let SessionState::Running { child, .. } = &mut *state else {
                    return Ok(absent());
                };
                if child.poisoned {
                    return Err(DriverError::UnexpectedExit);
                }

                let rx = child.framer.reset(true);
                let key = Uuid::new_v4().to_string();
                let command = expression_command(&key, &request);
                child.stdin.write_all(command.as_bytes()).await?;
                Ok(drive_until_result(self.sink, child, rx).await)
            })
            .await
    }

    /// Accept the last recompile's output, fire-and-forget. A no-op if no
    /// confirmation is pending.
    ///
    /// # Errors
    /// [`DriverError::UnexpectedExit`] if the child's stdout already closed.
    pub async fn accept(&self) -> Result<(), DriverError> {
        self.queue
            .run(|sequence| async move {
                tracing::debug!(sequence, "accept");
                let mut state = self.state.lock().await;
                if let SessionState::Broken(reason) = &*state {
                    return Err(DriverError::SpawnFailed(reason.clone()));
                }
                if let SessionState::Running { child, awaiting_confirmation } = &mut *state {
                    if *awaiting_confirmation {
                        if child.poisoned {
                            return Err(DriverError::UnexpectedExit);
                        }
                        child.stdin.write_all(b"accept\n").await?;
                        *awaiting_confirmation = false;
                    }
                }
                Ok(())
            })
            .await
    }

    /// Reject the last recompile's output. Completes immediately with an
    /// absent result if no confirmation is pending.
    ///
    /// # Errors
    /// [`DriverError::UnexpectedExit`] if the child's stdout already closed.
    pub async fn reject(&self) -> Result<CompilerOutput, DriverError> {
        self.queue
            .run(|sequence| async move {
                tracing::debug!(sequence, "reject");
                let mut state = self.state.lock().await;
                if let SessionState::Broken(reason) = &*state {
                    return Err(DriverError::SpawnFailed(reason.clone()));
                }
                let SessionState::Running { child, awaiting_confirmation } = &mut *state else {
                    return Ok(absent());
                };
                if !*awaiting_confirmation {
                    return Ok(absent());
                }
                if child.poisoned {
                    return Err(DriverError::UnexpectedExit);
                }
                let rx = child.framer.reset(false);
                child.stdin.write_all(b"reject\n").await?;
                let output = drive_until_result(self.sink, child, rx).await;
                *awaiting_confirmation = false;
                Ok(output)
            })
            .await
    }

    /// Send `reset`, fire-and-forget. The next recompile is treated as
    /// from-scratch by the server. A no-op if the session never started.
    ///
    /// # Errors
    /// [`DriverError::UnexpectedExit`] if the child's stdout already closed.
    pub async fn reset(&self) -> Result<(), DriverError> {
        self.queue
            .run(|sequence| async move {
                tracing::debug!(sequence, "reset");
                let mut state = self.state.lock().await;
                if let SessionState::Broken(reason) = &*state {
                    return Err(DriverError::SpawnFailed(reason.clone()));
                }
                if let SessionState::Running { child, .. } = &mut *state {
                    if child.poisoned {
                        return Err(DriverError::UnexpectedExit);
                    }
                    child.stdin.write_all(b"reset\n").await?;
                }
                Ok(())
            })
            .await
    }

    /// Kill the child, if any, and transition to `ShutDown`. Idempotent.
    ///
    /// # Errors
    /// Propagates I/O errors from killing or awaiting the child.
    pub async fn shutdown(&self) -> Result<(), DriverError> {
        self.queue
            .run(|sequence| async move {
                tracing::debug!(sequence, "shutdown");
                let mut state = self.state.lock().await;
                let previous = std::mem::replace(&mut *state, SessionState::ShutDown);
                if let SessionState::Running { mut child, .. } = previous {
                    child.handle.kill().await?;
                    let _ = child.handle.wait().await;
                }
                Ok(())
            })
            .await
    }

    async fn handle_recompile(&self, state: &mut SessionState, request: &RecompileRequest) -> Result<CompilerOutput, DriverError> {
        match state {
            SessionState::ShutDown => return Err(DriverError::InvalidState("session is shut down".to_owned())),
            SessionState::Broken(reason) => return Err(DriverError::SpawnFailed(reason.clone())),
            SessionState::NotStarted => {
                match self.spawn_cold(request).await {
                    Ok((child, output)) => {
                        *state = SessionState::Running { child, awaiting_confirmation: true };
                        return Ok(output);
                    }
                    // A missing main path is a caller mistake, not a process
                    // failure: the session stays `NotStarted` so a corrected
                    // request can still cold-compile.
                    Err(err @ DriverError::InvalidState(_)) => return Err(err),
                    Err(err) => {
                        // `ToolMissing`/`SpawnFailed` are not retried: leaving
                        // the session in `NotStarted` would make the next
                        // request spawn another doomed child instead of
                        // failing fast.
                        *state = SessionState::Broken(err.to_string());
                        return Err(err);
                    }
                }
            }
            SessionState::Running { .. } => {}
        }

        let SessionState::Running { child, awaiting_confirmation } = state else {
            unreachable!("ShutDown, Broken, and NotStarted were handled above")
        };
        let output = self.incremental_recompile(child, request).await?;
        *awaiting_confirmation = true;
        Ok(output)
    }

    async fn spawn_cold(&self, request: &RecompileRequest) -> Result<(RunningChild, CompilerOutput), DriverError> {
        if !self.artifacts.is_runnable() {
            return Err(DriverError::ToolMissing { path: self.artifacts.compiler_binary() });
        }
        let main_path = request
            .main_path
            .clone()
            .ok_or_else(|| DriverError::InvalidState("cold compile requires a main path".to_owned()))?;
        let script_path = main_path.display().to_string();

        let mut extra = Vec::new();
        if let Some(dill) = &self.config.initialize_from_dill {
            extra.push("--initialize-from-dill".to_owned());
            extra.push(dill.display().to_string());
        }
        if self.config.unsafe_package_serialization {
            extra.push("--unsafe-package-serialization".to_owned());
        }
        if !self.config.experimental_flags.is_empty() {
            extra.push(format!("--enable-experiment={}", self.config.experimental_flags.join(",")));
        }

        let packages_path = request.packages_path.as_deref().or(self.config.packages_path.as_deref());
        let extra_session_packages_path = if request.packages_path.is_some() { self.config.packages_path.as_deref() } else { None };

        let mapper = URIMapper::new(&script_path, packages_path, self.config.vfs_scheme.as_deref(), Some(self.config.vfs_roots.as_slice()))?;

        let common = CommonCompileArgs {
            sdk_root: &self.config.sdk_root,
            target_model: self.config.target_model,
            track_widget_creation: self.config.track_widget_creation,
            link_platform: true,
            aot: false,
            product_vm: false,
            incremental: true,
            packages_path,
            extra_session_packages_path,
            output_path: Some(&request.output_path),
            depfile_path: None,
            vfs_roots: &self.config.vfs_roots,
            vfs_scheme: self.config.vfs_scheme.as_deref(),
            extra_options: &extra,
        };

        let args = build_args(&common, &self.artifacts.frontend_snapshot(), &script_path, &mapper);
        let binary = self.artifacts.compiler_binary();
        tracing::info!(binary = %binary.display(), arg_count = args.len(), "spawning frontend server");

        let mut spawned = self.spawner.spawn(&binary, &args).await.map_err(|e| DriverError::SpawnFailed(e.to_string()))?;

        let mut framer = StdoutFramer::new();
        let rx = framer.reset(false);
        let main_uri = resolve_main_uri(&script_path, &mapper);
        spawned.stdin.write_all(format!("compile {main_uri}\n").as_bytes()).await?;

        let mut child = RunningChild {
            stdin: spawned.stdin,
            stdout: spawned.stdout,
            stderr: spawned.stderr,
            handle: spawned.handle,
            framer,
            poisoned: false,
            last_main_path: script_path,
        };

        let output = drive_until_result(self.sink, &mut child, rx).await;
        Ok((child, output))
    }

    async fn incremental_recompile(&self, child: &mut RunningChild, request: &RecompileRequest) -> Result<CompilerOutput, DriverError> {
        if child.poisoned {
            return Err(DriverError::UnexpectedExit);
        }

        let packages_path = request.packages_path.as_deref().or(self.config.packages_path.as_deref());
        let anchor = request.main_path.as_ref().map(|p| p.display().to_string()).unwrap_or_else(|| child.last_main_path.clone());
        let mapper = URIMapper::new(&anchor, packages_path, self.config.vfs_scheme.as_deref(), Some(self.config.vfs_roots.as_slice()))?;

        let rx = child.framer.reset(false);
        let key = Uuid::new_v4().to_string();

        let mut command = String::from("recompile ");
        if let Some(main_path) = &request.main_path {
            let main_path_str = main_path.display().to_string();
            command.push_str(&resolve_main_uri(&main_path_str, &mapper));
            command.push(' ');
            child.last_main_path = main_path_str;
        }
        command.push_str(&key);
        command.push('\n');
        for raw in &request.invalidated {
            command.push_str(&map_invalidated(raw, &mapper, &self.config.vfs_roots, self.config.vfs_scheme.as_deref()));
            command.push('\n');
        }
        command.push_str(&key);
        command.push('\n');

        child.stdin.write_all(command.as_bytes()).await?;
        Ok(drive_until_result(self.sink, child, rx).await)
    }
}

fn absent() -> CompilerOutput {
    CompilerOutput { output_file: None, error_count: 0 }
}

/// `isStatic ?? "false"`: a request that never specified staticness is
/// forwarded the literal string `false` rather than omitting the field.
/// Preserved verbatim; see DESIGN.md.
fn expression_command(key: &str, request: &CompileExpressionRequest) -> String {
    let mut command = format!("compile-expression {key}\n{}\n", request.expression);
    for def in &request.definitions {
        command.push_str(def);
        command.push('\n');
    }
    command.push_str(key);
    command.push('\n');
    for type_def in &request.type_definitions {
        command.push_str(type_def);
        command.push('\n');
    }
    command.push_str(key);
    command.push('\n');
    command.push_str(request.library_uri.as_deref().unwrap_or(""));
    command.push('\n');
    command.push_str(request.klass.as_deref().unwrap_or(""));
    command.push('\n');
    let is_static = request.is_static.map_or_else(|| "false".to_owned(), |b| b.to_string());
    command.push_str(&is_static);
    command.push('\n');
    command
}

/// Maps one invalidated-file entry through the fallback chain: decode a
/// `file:` URI to a path first (passing through unchanged on decode
/// failure), then try the URIMapper, then a vfs-root prefix, then verbatim.
fn map_invalidated(raw: &str, mapper: &URIMapper, vfs_roots: &[String], vfs_scheme: Option<&str>) -> String {
    let path = if raw.starts_with("file:") {
        match file_uri_to_path(raw) {
            Some(decoded) => decoded,
            None => return raw.to_owned(),
        }
    } else {
        raw.to_owned()
    };

    if let Some(mapped) = mapper.map(&path) {
        return mapped;
    }
    if let Some(scheme) = vfs_scheme {
        for root in vfs_roots {
            if let Some(suffix) = path.strip_prefix(root.as_str()) {
                return format!("{scheme}:/{}", suffix.trim_start_matches('/'));
            }
        }
    }
    raw.to_owned()
}

async fn read_one_line<R: AsyncBufRead + Unpin>(reader: &mut R, buf: &mut String) -> Option<String> {
    buf.clear();
    match reader.read_line(buf).await {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(buf.trim_end_matches(['\n', '\r']).to_owned()),
    }
}

/// Pumps stdout into `child`'s framer and stderr into `sink` until `rx`
/// resolves. stdout closing mid-wait marks the child poisoned and resolves
/// `rx` to an absent result via [`StdoutFramer::on_eof`].
async fn drive_until_result(sink: &dyn DiagnosticSink, child: &mut RunningChild, mut rx: oneshot::Receiver<CompilerOutput>) -> CompilerOutput {
    let mut stdout_buf = String::new();
    let mut stderr_buf = String::new();
    let mut stderr_open = true;

    loop {
        tokio::select! {
            result = &mut rx => {
                return result.unwrap_or_else(|_| absent());
            }
            line = read_one_line(&mut child.stdout, &mut stdout_buf) => {
                match line {
                    Some(text) => child.framer.feed_line(&text, sink),
                    None => {
                        child.poisoned = true;
                        child.framer.on_eof();
                    }
                }
            }
            line = read_one_line(&mut child.stderr, &mut stderr_buf), if stderr_open => {
                match line {
                    Some(text) => sink.emit(Emphasis::Plain, &text),
                    None => stderr_open = false,
                }
            }
        }
    }
}
