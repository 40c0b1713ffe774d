//! # coderunner-eval
//!
//! Evaluates student C++ submissions against a suite of test cases: builds
//! a compilable doctest harness, runs it in a disposable Docker sandbox
//! under strict resource limits, reconstructs per-test verdicts from
//! doctest's failure-only transcript, classifies failures into a fixed
//! taxonomy, persists an audit record, and publishes a metrics event —
//! all behind a single entry point, [`coordinator::Coordinator::evaluate`].
//!
//! ## Architecture
//!
//! The pipeline is a chain of independently testable stages:
//!
//! - [`templater`] — generates the harness source for a submission
//! - [`registrar`] — ensures the sandbox image for a language exists
//! - [`sandbox`] — runs one harness in a disposable container
//! - [`parser`] — reconstructs per-test verdicts from the transcript
//! - [`classifier`] — maps a failed run with no parseable output to the
//!   fixed failure taxonomy
//! - [`coordinator`] — owns the ten-step pipeline end-to-end
//! - [`repository`] — persists the audit record and generated harness
//! - [`metrics`] — publishes the fire-and-forget metrics event
//! - [`rpc`] — wire DTOs and mapping to/from the domain types
//!
//! [`domain`] holds the shared data model every stage operates on.
//!
//! ## Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::path::PathBuf;
//!
//! use coderunner_eval::coordinator::{Coordinator, SandboxLimits};
//! use coderunner_eval::metrics::LoggingMetricsPublisher;
//! use coderunner_eval::registrar::DockerRegistrar;
//! use coderunner_eval::repository::InMemoryRepository;
//! use coderunner_eval::sandbox::DockerSandboxRunner;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let docker = bollard::Docker::connect_with_local_defaults()?;
//! let repo = Arc::new(InMemoryRepository::new());
//! let coordinator = Coordinator::new(
//!     Arc::new(DockerRegistrar::new(docker.clone(), PathBuf::from("/etc/coderunner-eval/images"))),
//!     Arc::new(DockerSandboxRunner::new(docker)),
//!     repo.clone(),
//!     repo,
//!     Arc::new(LoggingMetricsPublisher),
//!     SandboxLimits::default(),
//!     PathBuf::from("/var/lib/coderunner-eval"),
//! );
//! # let _ = coordinator;
//! # Ok(())
//! # }
//! ```

pub mod classifier;
pub mod config;
pub mod coordinator;
pub mod domain;
pub mod metrics;
pub mod parser;
pub mod registrar;
pub mod repository;
pub mod rpc;
pub mod sandbox;
pub mod templater;

pub use config::{Config, load_config};
pub use coordinator::{Coordinator, CoordinatorError, SandboxLimits};
pub use domain::{Execution, ExecutionStatus, Language, Submission, TestCase};
