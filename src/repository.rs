//! Persistence boundary: `ExecutionRepository`/`HarnessRepository` traits,
//! a `sqlx`-backed Postgres implementation, and an in-memory
//! implementation used by tests.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::{Execution, ExecutionStatus, GeneratedHarness};

pub type RepositoryResult<T> = Result<T, RepositoryError>;

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(String),
    #[error("execution {0} not found")]
    NotFound(Uuid),
}

#[async_trait]
pub trait ExecutionRepository: Send + Sync {
    async fn create(&self, execution: &Execution) -> RepositoryResult<()>;
    async fn update(&self, execution: &Execution) -> RepositoryResult<()>;
}

#[async_trait]
pub trait HarnessRepository: Send + Sync {
    async fn create(&self, harness: &GeneratedHarness) -> RepositoryResult<()>;
}

/// `sqlx`-backed Postgres implementation of both repositories.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ExecutionRepository for PostgresRepository {
    async fn create(&self, execution: &Execution) -> RepositoryResult<()> {
        sqlx::query(
            r#"
            INSERT INTO executions
                (id, challenge_id, code_version_id, student_id, language, source,
                 status, success, total, passed, failed, execution_time_ms,
                 approved_test_ids, failed_test_ids, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            "#,
        )
        .bind(execution.id)
        .bind(execution.challenge_id)
        .bind(execution.code_version_id)
        .bind(execution.student_id)
        .bind(execution.language.tag())
        .bind(&execution.source)
        .bind(execution.status.to_string())
        .bind(execution.success)
        .bind(execution.total as i32)
        .bind(execution.passed as i32)
        .bind(execution.failed as i32)
        .bind(execution.execution_time_ms)
        .bind(&execution.approved_test_ids)
        .bind(&execution.failed_test_ids)
        .bind(execution.created_at)
        .bind(execution.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(e.to_string()))?;

        Ok(())
    }

    async fn update(&self, execution: &Execution) -> RepositoryResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE executions SET
                status = $2, success = $3, total = $4, passed = $5, failed = $6,
                execution_time_ms = $7, memory_mb = $8, exit_code = $9,
                error_type = $10, error_message = $11, approved_test_ids = $12,
                failed_test_ids = $13, updated_at = $14
            WHERE id = $1
            "#,
        )
        .bind(execution.id)
        .bind(execution.status.to_string())
        .bind(execution.success)
        .bind(execution.total as i32)
        .bind(execution.passed as i32)
        .bind(execution.failed as i32)
        .bind(execution.execution_time_ms)
        .bind(execution.memory_mb)
        .bind(execution.exit_code)
        .bind(&execution.error_type)
        .bind(&execution.error_message)
        .bind(&execution.approved_test_ids)
        .bind(&execution.failed_test_ids)
        .bind(execution.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(execution.id));
        }

        Ok(())
    }
}

#[async_trait]
impl HarnessRepository for PostgresRepository {
    async fn create(&self, harness: &GeneratedHarness) -> RepositoryResult<()> {
        sqlx::query(
            r#"
            INSERT INTO generated_harnesses
                (execution_id, source, byte_size, test_case_count, generation_duration_ms)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(harness.execution_id)
        .bind(&harness.source)
        .bind(harness.byte_size as i64)
        .bind(harness.test_case_count as i32)
        .bind(harness.generation_duration.as_millis() as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::Database(e.to_string()))?;

        Ok(())
    }
}

/// In-memory repository pair used by tests in place of a real database,
/// mirroring the teacher's fakeable-trait testing posture.
#[derive(Default)]
pub struct InMemoryRepository {
    executions: tokio::sync::Mutex<std::collections::HashMap<Uuid, Execution>>,
    harnesses: tokio::sync::Mutex<Vec<GeneratedHarness>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, id: Uuid) -> Option<Execution> {
        self.executions.lock().await.get(&id).cloned()
    }
}

#[async_trait]
impl ExecutionRepository for InMemoryRepository {
    async fn create(&self, execution: &Execution) -> RepositoryResult<()> {
        self.executions.lock().await.insert(execution.id, execution.clone());
        Ok(())
    }

    async fn update(&self, execution: &Execution) -> RepositoryResult<()> {
        let mut guard = self.executions.lock().await;
        if !guard.contains_key(&execution.id) {
            return Err(RepositoryError::NotFound(execution.id));
        }
        guard.insert(execution.id, execution.clone());
        Ok(())
    }
}

#[async_trait]
impl HarnessRepository for InMemoryRepository {
    async fn create(&self, harness: &GeneratedHarness) -> RepositoryResult<()> {
        self.harnesses.lock().await.push(harness.clone());
        Ok(())
    }
}

impl Execution {
    /// Marks the record `Completed`/`Failed`/`TimedOut` and stamps
    /// `updated_at`.
    pub fn finish(&mut self, status: ExecutionStatus) {
        self.status = status;
        self.updated_at = chrono::Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Language, Submission};

    fn submission() -> Submission {
        Submission {
            challenge_id: Uuid::new_v4(),
            code_version_id: Uuid::new_v4(),
            student_id: Uuid::new_v4(),
            source: "int add(int n){return n+1;}".to_string(),
            language: Language::Cpp,
            tests: vec![],
        }
    }

    #[tokio::test]
    async fn create_then_update_round_trips_through_memory() {
        let repo = InMemoryRepository::new();
        let mut execution = Execution::start(&submission());
        repo.create(&execution).await.unwrap();

        execution.finish(ExecutionStatus::Completed);
        repo.update(&execution).await.unwrap();

        let stored = repo.get(execution.id).await.unwrap();
        assert_eq!(stored.status, ExecutionStatus::Completed);
    }

    #[tokio::test]
    async fn update_on_unknown_id_is_not_found() {
        let repo = InMemoryRepository::new();
        let execution = Execution::start(&submission());
        let err = repo.update(&execution).await.unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound(_)));
    }
}
