//! Metrics Publisher: fire-and-forget event emission. Publication errors
//! are logged and never fail the request.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::domain::{Execution, ExecutionStatus, TestVerdict};

/// The event shape published to the metrics bus for one evaluation.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionMetricsEvent {
    pub execution_id: Uuid,
    pub challenge_id: Uuid,
    pub code_version_id: Uuid,
    pub student_id: Uuid,
    pub language: String,
    pub status: ExecutionStatus,
    pub execution_time_ms: i64,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub verdicts: Vec<TestVerdict>,
    pub memory_mb: Option<i64>,
    pub exit_code: Option<i32>,
    pub error_type: Option<String>,
    pub error_message: Option<String>,
    pub hostname: String,
    pub emitted_at: DateTime<Utc>,
}

impl ExecutionMetricsEvent {
    pub fn from_execution(execution: &Execution, verdicts: Vec<TestVerdict>, hostname: &str) -> Self {
        Self {
            execution_id: execution.id,
            challenge_id: execution.challenge_id,
            code_version_id: execution.code_version_id,
            student_id: execution.student_id,
            language: execution.language.to_string(),
            status: execution.status,
            execution_time_ms: execution.execution_time_ms,
            total: execution.total,
            passed: execution.passed,
            failed: execution.failed,
            verdicts,
            memory_mb: execution.memory_mb,
            exit_code: execution.exit_code,
            error_type: execution.error_type.clone(),
            error_message: execution.error_message.clone(),
            hostname: hostname.to_string(),
            emitted_at: Utc::now(),
        }
    }
}

pub type MetricsResult<T> = Result<T, MetricsError>;

#[derive(Debug, thiserror::Error)]
#[error("metrics publish failed: {0}")]
pub struct MetricsError(pub String);

/// A sink for evaluation metrics events. Implementations must not block
/// the caller for longer than their own deadline.
#[async_trait]
pub trait MetricsPublisher: Send + Sync {
    async fn publish(&self, event: ExecutionMetricsEvent) -> MetricsResult<()>;
}

/// Default publisher: logs the event at info level and never fails.
/// Stands in for a real event-bus client until one is wired up.
pub struct LoggingMetricsPublisher;

#[async_trait]
impl MetricsPublisher for LoggingMetricsPublisher {
    async fn publish(&self, event: ExecutionMetricsEvent) -> MetricsResult<()> {
        tracing::info!(
            execution_id = %event.execution_id,
            status = %event.status,
            total = event.total,
            passed = event.passed,
            failed = event.failed,
            "execution metrics event"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Execution, Language, Submission};

    #[tokio::test]
    async fn logging_publisher_never_fails() {
        let submission = Submission {
            challenge_id: Uuid::new_v4(),
            code_version_id: Uuid::new_v4(),
            student_id: Uuid::new_v4(),
            source: String::new(),
            language: Language::Cpp,
            tests: vec![],
        };
        let execution = Execution::start(&submission);
        let event = ExecutionMetricsEvent::from_execution(&execution, vec![], "test-host");
        let publisher = LoggingMetricsPublisher;
        assert!(publisher.publish(event).await.is_ok());
    }
}
