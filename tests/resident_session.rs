//! End-to-end scenarios for [`ResidentSession`] and [`BatchDriver`] against a
//! fake child process.
//!
//! Requires the `test-util` feature (`cargo test --features test-util`),
//! which exposes the fake [`ProcessSpawner`] normally compiled only for the
//! library's own unit tests.

use std::path::PathBuf;

use frontend_driver::test_support::{read_line, write_line, FakeSpawner};
use frontend_driver::{
    ArtifactLocator, BatchDriver, BatchOptions, CompileExpressionRequest, DriverError, ExitOutcome, FileFingerprintStore, Fingerprint, FingerprintGate,
    FingerprintStore, InMemorySink, RecompileRequest, ResidentSession, SessionConfig, TargetModel,
};

struct AlwaysRunnable(PathBuf, PathBuf);

impl ArtifactLocator for AlwaysRunnable {
    fn compiler_binary(&self) -> PathBuf {
        self.0.clone()
    }
    fn frontend_snapshot(&self) -> PathBuf {
        self.1.clone()
    }
    fn is_runnable(&self) -> bool {
        true
    }
}

fn artifacts() -> AlwaysRunnable {
    AlwaysRunnable(PathBuf::from("/bin/compiler"), PathBuf::from("/sdk/frontend.snapshot"))
}

fn session_config() -> SessionConfig {
    init_tracing();
    SessionConfig::new("/sdk", TargetModel::Flutter).unwrap()
}

/// Installs a `tracing` subscriber once so `RUST_LOG=debug cargo test` shows
/// the driver's spawn/request/frame events; harmless if another test beat us
/// to it.
fn init_tracing() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).try_init();
    });
}

/// A packages file mapping `p` to `/p/lib/`, written to a unique temp path so
/// `URIMapper` (which reads it from disk through the real `LineReader`) has
/// something to resolve `/p/lib/...` paths against.
struct TempPackagesFile(PathBuf);

impl TempPackagesFile {
    fn create(tag: &str) -> Self {
        let path = std::env::temp_dir().join(format!("resident-session-test-{}-{tag}.packages", std::process::id()));
        std::fs::write(&path, "p:file:///p/lib/\n").unwrap();
        Self(path)
    }
}

impl Drop for TempPackagesFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.0);
    }
}

/// Scenario 1: cold compile, success.
#[tokio::test]
async fn cold_compile_success() {
    let artifacts = artifacts();
    let (spawner, mut rx) = FakeSpawner::new();
    let sink = InMemorySink::default();
    let packages = TempPackagesFile::create("cold");
    let mut config = session_config();
    config.packages_path = Some(packages.0.clone());
    let session = ResidentSession::new(config, &artifacts, &spawner, &sink);

    let request = RecompileRequest { main_path: Some(PathBuf::from("/p/lib/m.dart")), ..RecompileRequest::new("/out.dill") };

    let compile = session.recompile(request);
    let responder = async {
        let mut controller = rx.recv().await.expect("cold compile must spawn a child");
        let line = read_line(&mut controller.stdin_reader).await.expect("cold compile writes one command");
        assert_eq!(line, "compile package:p/m.dart");
        write_line(&mut controller.stdout_writer, "result AAA").await;
        write_line(&mut controller.stdout_writer, "AAA /out.dill 0").await;
    };

    let (result, ()) = tokio::join!(compile, responder);
    let output = result.expect("cold compile must succeed");
    assert_eq!(output.output_file.as_deref(), Some("/out.dill"));
    assert_eq!(output.error_count, 0);
}

/// Scenario 2: incremental recompile with invalidated files, after a cold
/// compile has already happened.
#[tokio::test]
async fn incremental_recompile_with_invalidation() {
    let artifacts = artifacts();
    let (spawner, mut rx) = FakeSpawner::new();
    let sink = InMemorySink::default();
    let packages = TempPackagesFile::create("incremental");
    let mut config = session_config();
    config.packages_path = Some(packages.0.clone());
    let session = ResidentSession::new(config, &artifacts, &spawner, &sink);

    let cold = session.recompile(RecompileRequest { main_path: Some(PathBuf::from("/p/lib/m.dart")), ..RecompileRequest::new("/out.dill") });
    let cold_responder = async {
        let mut controller = rx.recv().await.expect("cold compile must spawn a child");
        let _ = read_line(&mut controller.stdin_reader).await;
        write_line(&mut controller.stdout_writer, "result AAA").await;
        write_line(&mut controller.stdout_writer, "AAA /out.dill 0").await;
        controller
    };
    let (cold_result, mut controller) = tokio::join!(cold, cold_responder);
    cold_result.expect("cold compile must succeed");

    let incremental = session.recompile(RecompileRequest {
        main_path: None,
        invalidated: vec!["file:///p/lib/x.dart".to_owned(), "/p/lib/y.dart".to_owned()],
        output_path: PathBuf::from("/out.dill"),
        packages_path: None,
    });
    let incremental_responder = async {
        let header = read_line(&mut controller.stdin_reader).await.expect("recompile header line");
        assert!(header.starts_with("recompile "), "expected a recompile header, got {header}");
        let key = header.trim_start_matches("recompile ").to_owned();

        let first = read_line(&mut controller.stdin_reader).await.unwrap();
        let second = read_line(&mut controller.stdin_reader).await.unwrap();
        assert_eq!(first, "package:p/x.dart");
        assert_eq!(second, "package:p/y.dart");
        let terminator = read_line(&mut controller.stdin_reader).await.unwrap();
        assert_eq!(terminator, key);

        write_line(&mut controller.stdout_writer, &format!("result {key}")).await;
        write_line(&mut controller.stdout_writer, &format!("{key} /out.dill 0")).await;
    };

    let (result, ()) = tokio::join!(incremental, incremental_responder);
    let output = result.expect("incremental recompile must succeed");
    assert_eq!(output.output_file.as_deref(), Some("/out.dill"));
}

/// Scenario 3: rejecting a pending recompile.
#[tokio::test]
async fn reject_path() {
    let artifacts = artifacts();
    let (spawner, mut rx) = FakeSpawner::new();
    let sink = InMemorySink::default();
    let session = ResidentSession::new(session_config(), &artifacts, &spawner, &sink);

    let cold = session.recompile(RecompileRequest { main_path: Some(PathBuf::from("/p/lib/m.dart")), ..RecompileRequest::new("/out.dill") });
    let cold_responder = async {
        let mut controller = rx.recv().await.expect("cold compile must spawn a child");
        let _ = read_line(&mut controller.stdin_reader).await;
        write_line(&mut controller.stdout_writer, "result AAA").await;
        write_line(&mut controller.stdout_writer, "AAA /out.dill 0").await;
        controller
    };
    let (cold_result, mut controller) = tokio::join!(cold, cold_responder);
    cold_result.expect("cold compile must succeed");

    let reject = session.reject();
    let reject_responder = async {
        let line = read_line(&mut controller.stdin_reader).await.unwrap();
        assert_eq!(line, "reject");
        write_line(&mut controller.stdout_writer, "result BBB").await;
        write_line(&mut controller.stdout_writer, "BBB").await;
    };
    let (result, ()) = tokio::join!(reject, reject_responder);
    let output = result.expect("reject must complete");
    assert_eq!(output.output_file, None);

    // A second reject with nothing pending completes immediately, absent,
    // and writes nothing further.
    let output = session.reject().await.unwrap();
    assert_eq!(output.output_file, None);
}

/// Scenario 4: expression compilation before any cold compile.
#[tokio::test]
async fn expression_before_cold_compile_yields_absent() {
    let artifacts = artifacts();
    let (spawner, _rx) = FakeSpawner::new();
    let sink = InMemorySink::default();
    let session = ResidentSession::new(session_config(), &artifacts, &spawner, &sink);

    let output = session
        .compile_expression(CompileExpressionRequest { expression: "1 + 1".to_owned(), ..Default::default() })
        .await
        .unwrap();
    assert_eq!(output.output_file, None);
}

/// Scenario 5: the child crashes mid-frame; the pending result resolves
/// absent and the session refuses further requests.
#[tokio::test]
async fn crash_mid_frame_poisons_the_session() {
    let artifacts = artifacts();
    let (spawner, mut rx) = FakeSpawner::new();
    let sink = InMemorySink::default();
    let session = ResidentSession::new(session_config(), &artifacts, &spawner, &sink);

    let cold = session.recompile(RecompileRequest { main_path: Some(PathBuf::from("/p/lib/m.dart")), ..RecompileRequest::new("/out.dill") });
    let responder = async {
        let mut controller = rx.recv().await.expect("cold compile must spawn a child");
        let _ = read_line(&mut controller.stdin_reader).await;
        write_line(&mut controller.stdout_writer, "result CCC").await;
        drop(controller.stdout_writer);
        let _ = controller.exit_tx.take().unwrap().send(ExitOutcome::Failure(None));
    };
    let (result, ()) = tokio::join!(cold, responder);
    let output = result.expect("a crash mid-frame resolves absent, not an error");
    assert_eq!(output.output_file, None);

    let next = session.recompile(RecompileRequest::new("/out.dill")).await;
    assert!(matches!(next, Err(DriverError::UnexpectedExit)), "subsequent requests on a crashed child must error");
}

/// Scenario 6: a fingerprint hit on the batch path skips the spawn entirely.
#[tokio::test]
async fn fingerprint_hit_skips_spawn() {
    let artifacts = artifacts();
    let (spawner, mut rx) = FakeSpawner::new();
    let store = FileFingerprintStore;
    let sink = InMemorySink::default();

    let depfile = std::env::temp_dir().join(format!("resident-session-test-{}.deps", std::process::id()));
    std::fs::write(&depfile, "out: \n").unwrap();

    let mut options = BatchOptions::new("/sdk", "/p/main.dart", "/out/app.dill", TargetModel::Flutter).unwrap();
    options.depfile_path = Some(depfile.clone());

    let properties = std::collections::BTreeMap::from([
        ("entryPoint".to_owned(), "/p/main.dart".to_owned()),
        ("trackWidgetCreation".to_owned(), "false".to_owned()),
        ("linkPlatformKernelIn".to_owned(), "true".to_owned()),
    ]);
    let fresh = Fingerprint::compute(&properties, &[PathBuf::from("/p/main.dart")]);
    FingerprintGate::new(&store).persist(&depfile, &fresh).unwrap();

    let driver = BatchDriver::new(&artifacts, &spawner, &store, &sink);
    let never_spawned = async {
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err(), "fingerprint hit must not spawn a child");
    };

    let (result, ()) = tokio::join!(driver.compile(&options), never_spawned);
    let output = result.expect("fingerprint hit must succeed without spawning");
    assert_eq!(output.output_file.as_deref(), Some("/out/app.dill"));

    let _ = std::fs::remove_file(&depfile);
    let _ = std::fs::remove_file(format!("{}.fingerprint", depfile.display()));
}
