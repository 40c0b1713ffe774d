//! Evaluation Coordinator: orchestrates the pipeline end-to-end for one
//! submission, owning the ten-step state machine documented on
//! [`Coordinator::evaluate`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info_span, warn, Instrument};
use uuid::Uuid;

use crate::classifier;
use crate::domain::{Execution, ExecutionResult, ExecutionStatus, Submission};
use crate::metrics::{ExecutionMetricsEvent, MetricsPublisher};
use crate::parser::ParserRegistry;
use crate::registrar::ImageRegistrar;
use crate::repository::{ExecutionRepository, HarnessRepository};
use crate::sandbox::{SandboxConfig, SandboxRunner};
use crate::templater;

pub type CoordinatorResult<T> = Result<T, CoordinatorError>;

/// Errors that prevent the pipeline from producing a normal response at
/// all (spec.md §7). Everything else — timeouts, compile failures, test
/// failures, parser mismatches — is a *successful* evaluation outcome
/// carried on the returned [`Execution`].
#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("internal error: {0}")]
    Internal(String),
}

/// Resource limits and timeout applied to every sandbox run, configurable
/// per deployment (spec.md §5's defaults).
#[derive(Debug, Clone)]
pub struct SandboxLimits {
    pub memory_mb: i64,
    pub cpu_cores: f64,
    pub timeout: Duration,
}

impl Default for SandboxLimits {
    fn default() -> Self {
        Self {
            memory_mb: 256,
            cpu_cores: 0.5,
            timeout: Duration::from_secs(30),
        }
    }
}

pub struct Coordinator {
    registrar: Arc<dyn ImageRegistrar>,
    sandbox_runner: Arc<dyn SandboxRunner>,
    execution_repository: Arc<dyn ExecutionRepository>,
    harness_repository: Arc<dyn HarnessRepository>,
    metrics: Arc<dyn MetricsPublisher>,
    parsers: ParserRegistry,
    limits: SandboxLimits,
    host_root: std::path::PathBuf,
    hostname: String,
}

impl Coordinator {
    pub fn new(
        registrar: Arc<dyn ImageRegistrar>,
        sandbox_runner: Arc<dyn SandboxRunner>,
        execution_repository: Arc<dyn ExecutionRepository>,
        harness_repository: Arc<dyn HarnessRepository>,
        metrics: Arc<dyn MetricsPublisher>,
        limits: SandboxLimits,
        host_root: std::path::PathBuf,
    ) -> Self {
        Self {
            registrar,
            sandbox_runner,
            execution_repository,
            harness_repository,
            metrics,
            parsers: ParserRegistry::new(),
            limits,
            host_root,
            hostname: hostname_or_unknown(),
        }
    }

    /// Runs the full ten-step evaluation pipeline (spec.md §4.6):
    ///
    /// 1. validate ids (done by the caller before `Submission` exists);
    /// 2. create the `Running` audit record;
    /// 3. generate and persist the harness;
    /// 4. ensure the image and run the sandbox with a `timeout+5s` deadline;
    /// 5. on timeout, record `TimedOut`;
    /// 6. on a completed run, parse and apply verdicts, or record the
    ///    classifier's verdict if parsing did not apply;
    /// 7. run the classifier when there is no parseable framework output;
    /// 8. persist the updated execution;
    /// 9. publish metrics from a detached task;
    /// 10. return the finished execution.
    pub async fn evaluate(&self, submission: Submission) -> CoordinatorResult<Execution> {
        let mut execution = Execution::start(&submission);
        let span = info_span!(
            "evaluate",
            execution_id = %execution.id,
            challenge_id = %execution.challenge_id,
            student_id = %execution.student_id,
            language = %execution.language,
        );

        async {
            self.execution_repository
                .create(&execution)
                .await
                .map_err(|e| CoordinatorError::Internal(e.to_string()))?;

            let harness = match templater::generate(execution.id, &submission) {
                Ok(h) => h,
                Err(e) => {
                    execution.status = ExecutionStatus::Failed;
                    execution.error_message = Some(format!("Template generation failed: {e}"));
                    execution.updated_at = chrono::Utc::now();
                    self.persist(&execution).await?;
                    return Ok(execution);
                }
            };
            self.harness_repository
                .create(&harness)
                .await
                .map_err(|e| CoordinatorError::Internal(e.to_string()))?;

            let started = Instant::now();
            let sandbox_deadline = self.limits.timeout + Duration::from_secs(5);

            self.registrar
                .ensure_image(submission.language)
                .await
                .map_err(|e| CoordinatorError::Internal(e.to_string()))?;

            let sandbox_cfg = SandboxConfig {
                execution_id: execution.id,
                image_tag: crate::registrar::image_tag(submission.language),
                compile_and_run_command: compile_and_run_command(&submission, &harness),
                working_dir: "/workspace".to_string(),
                extension: submission.language.extension().to_string(),
                harness_source: harness.source.clone(),
                memory_mb: self.limits.memory_mb,
                cpu_cores: self.limits.cpu_cores,
                timeout: self.limits.timeout,
                host_root: self.host_root.clone(),
            };

            let run_future = self.sandbox_runner.run(&sandbox_cfg);
            let outcome = match tokio::time::timeout(sandbox_deadline, run_future).await {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(e)) => return Err(CoordinatorError::Internal(e.to_string())),
                Err(_) => {
                    execution.status = ExecutionStatus::TimedOut;
                    execution.error_type = Some("timeout".to_string());
                    execution.execution_time_ms = started.elapsed().as_millis() as i64;
                    execution.updated_at = chrono::Utc::now();
                    self.persist(&execution).await?;
                    self.publish_metrics(&execution, Vec::new());
                    return Ok(execution);
                }
            };

            let result = self.resolve_outcome(&submission, outcome);
            execution.execution_time_ms = started.elapsed().as_millis() as i64;
            execution.exit_code = result.exit_code;
            execution.total = result.total;
            execution.passed = result.passed;
            execution.failed = result.failed;
            execution.error_type = result.error_type.clone();
            execution.error_message = result.error_message.clone();
            execution.approved_test_ids = result.approved_ids();
            execution.failed_test_ids = result.failed_ids();
            // A parser mismatch always means success=false even if the
            // best-effort counts happen to look clean (spec.md §8
            // scenario 6), since the reconstruction could not be trusted.
            execution.success = result.success() && result.error_message.is_none();
            // Every path that reaches here ran the sandbox to completion:
            // compile errors, runtime signals, and test failures are all
            // normal evaluation outcomes (spec.md §7's propagation rule),
            // not pipeline failures. Only template-generation failure
            // (above) and timeout (below) use the other terminal statuses.
            execution.status = ExecutionStatus::Completed;
            execution.updated_at = chrono::Utc::now();

            self.persist(&execution).await?;
            self.publish_metrics(&execution, result.verdicts);

            Ok(execution)
        }
        .instrument(span)
        .await
    }

    fn resolve_outcome(&self, submission: &Submission, outcome: crate::sandbox::RunOutcome) -> ExecutionResult {
        let expected_ids = submission.test_ids();

        if outcome.timed_out {
            return ExecutionResult {
                timed_out: true,
                error_type: Some("timeout".to_string()),
                ..Default::default()
            };
        }

        // A framework summary line is proof doctest actually ran, whether
        // or not the process exited zero (doctest's own main exits
        // nonzero when any test failed). Its absence means there is no
        // parseable framework output — a compile error, a crash before
        // main, or a runtime signal — and the classifier decides instead.
        let has_framework_output = parser_has_summary(&outcome.stdout);

        if has_framework_output {
            if let Some(parser) = self.parsers.for_language(submission.language) {
                match parser.parse(&outcome.stdout, &expected_ids) {
                    Ok(verdicts) => {
                        let passed = verdicts.iter().filter(|v| v.passed).count();
                        let failed = verdicts.len() - passed;
                        let error_type = (failed > 0).then(|| "test_failure".to_string());
                        return ExecutionResult {
                            stdout: outcome.stdout,
                            stderr: outcome.stderr,
                            exit_code: outcome.exit_code,
                            total: verdicts.len(),
                            passed,
                            failed,
                            verdicts,
                            error_type,
                            ..Default::default()
                        };
                    }
                    Err(mismatch) => {
                        warn!(reason = %mismatch.reason, "parser summary mismatch");
                        let passed = mismatch.verdicts.iter().filter(|v| v.passed).count();
                        let failed = mismatch.verdicts.len() - passed;
                        return ExecutionResult {
                            stdout: outcome.stdout,
                            stderr: outcome.stderr,
                            exit_code: outcome.exit_code,
                            total: mismatch.verdicts.len(),
                            passed,
                            failed,
                            verdicts: mismatch.verdicts,
                            error_message: Some(mismatch.reason),
                            ..Default::default()
                        };
                    }
                }
            }
        }

        // No parseable framework output: classify (spec.md §4.6 step 7).
        // No tests ran to produce verdicts, so counts stay zeroed whether
        // the kind is compile-class or not.
        let (kind, message) = classifier::classify(outcome.exit_code, &outcome.stderr, 0);

        ExecutionResult {
            stdout: outcome.stdout,
            stderr: outcome.stderr,
            exit_code: outcome.exit_code,
            error_type: Some(kind.as_str().to_string()),
            error_message: Some(message),
            ..Default::default()
        }
    }

    async fn persist(&self, execution: &Execution) -> CoordinatorResult<()> {
        self.execution_repository
            .update(execution)
            .await
            .map_err(|e| CoordinatorError::Internal(e.to_string()))
    }

    /// Publishes the metrics event from a detached task with its own 5s
    /// deadline; failures are logged only and never reach the caller.
    fn publish_metrics(&self, execution: &Execution, verdicts: Vec<crate::domain::TestVerdict>) {
        let metrics = self.metrics.clone();
        let event = ExecutionMetricsEvent::from_execution(execution, verdicts, &self.hostname);
        tokio::spawn(async move {
            let result = tokio::time::timeout(Duration::from_secs(5), metrics.publish(event)).await;
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(error = %e, "metrics publish failed"),
                Err(_) => warn!("metrics publish did not finish within its detached deadline"),
            }
        });
    }
}

fn parser_has_summary(transcript: &str) -> bool {
    transcript.contains("[doctest] test cases:")
}

fn compile_and_run_command(submission: &Submission, harness: &crate::domain::GeneratedHarness) -> String {
    let _ = submission;
    let _ = harness;
    "g++ -std=c++17 -O2 -o solution solution.cpp && ./solution".to_string()
}

fn hostname_or_unknown() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string())
}
