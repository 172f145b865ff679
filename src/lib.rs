//! Driver for an external incremental-compiler frontend server.
//!
//! Two entry points: [`batch::BatchDriver`] for a one-shot, fingerprint-gated
//! compile, and [`session::ResidentSession`] for a long-lived compiler
//! process driven through a serialized sequence of recompile / expression /
//! accept / reject / reset commands over its standard streams.
//!
//! Every external dependency (spawning the child, locating its binary,
//! routing diagnostics, reading a packages file, persisting fingerprints) is
//! a narrow trait so the whole driver is testable without a real compiler.

#![warn(clippy::pedantic)]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]

pub mod args;
pub mod artifacts;
pub mod batch;
pub mod diagnostics;
pub mod error;
pub mod file_uri;
pub mod fingerprint;
pub mod frame;
pub mod packages;
pub mod process;
pub mod queue;
pub mod session;
pub mod target;
pub mod uri_mapper;

#[cfg(any(test, feature = "test-util"))]
pub mod test_support;

pub use args::{build_args, CommonCompileArgs};
pub use artifacts::{ArtifactLocator, FixedArtifactLocator};
pub use batch::{BatchDriver, BatchOptions};
pub use diagnostics::{DiagnosticSink, Emphasis, InMemorySink, TracingSink};
pub use error::DriverError;
pub use fingerprint::{FileFingerprintStore, Fingerprint, FingerprintGate, FingerprintStore};
pub use frame::{CompilerOutput, StdoutFramer};
pub use packages::{LineReader, PackageMap, PackagesReader};
pub use process::{ChildHandle, ExitOutcome, ProcessSpawner, SpawnedProcess, TokioProcessSpawner};
pub use queue::RequestQueue;
pub use session::{CompileExpressionRequest, RecompileRequest, ResidentSession, SessionConfig};
pub use target::TargetModel;
pub use uri_mapper::URIMapper;
