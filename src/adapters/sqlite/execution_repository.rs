//! SQLite implementation of the ExecutionRepository port.

use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::errors::{OrchestratorError, OrchestratorResult};
use crate::domain::models::{Execution, ExecutionLog, ExecutionStatus, LogType, StageCommand, TokenUsage};
use crate::domain::ports::ExecutionRepository;

#[derive(Clone)]
pub struct SqliteExecutionRepository {
    pool: SqlitePool,
}

impl SqliteExecutionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ExecutionRepository for SqliteExecutionRepository {
    async fn create(&self, execution: &Execution) -> OrchestratorResult<()> {
        let mut tx = self.pool.begin().await?;

        // At most one active execution per card: clear any prior one first.
        sqlx::query("UPDATE executions SET is_active = 0 WHERE card_id = ? AND is_active = 1")
            .bind(execution.card_id.to_string())
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"INSERT INTO executions (id, card_id, command, status, started_at, completed_at,
               workflow_stage, workflow_error, input_tokens, output_tokens, total_tokens,
               cost, model, is_active)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(execution.id.to_string())
        .bind(execution.card_id.to_string())
        .bind(execution.command.as_str())
        .bind(status_str(execution.status))
        .bind(execution.started_at.to_rfc3339())
        .bind(execution.completed_at.map(|ts| ts.to_rfc3339()))
        .bind(&execution.workflow_stage)
        .bind(&execution.workflow_error)
        .bind(execution.usage.input_tokens)
        .bind(execution.usage.output_tokens)
        .bind(execution.usage.total_tokens)
        .bind(execution.cost)
        .bind(&execution.model)
        .bind(execution.is_active)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> OrchestratorResult<Option<Execution>> {
        let row: Option<ExecutionRow> = sqlx::query_as("SELECT * FROM executions WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn update(&self, execution: &Execution) -> OrchestratorResult<()> {
        let result = sqlx::query(
            r#"UPDATE executions SET status = ?, completed_at = ?, workflow_stage = ?,
               workflow_error = ?, input_tokens = ?, output_tokens = ?, total_tokens = ?,
               cost = ?, is_active = ?
               WHERE id = ?"#,
        )
        .bind(status_str(execution.status))
        .bind(execution.completed_at.map(|ts| ts.to_rfc3339()))
        .bind(&execution.workflow_stage)
        .bind(&execution.workflow_error)
        .bind(execution.usage.input_tokens)
        .bind(execution.usage.output_tokens)
        .bind(execution.usage.total_tokens)
        .bind(execution.cost)
        .bind(execution.is_active)
        .bind(execution.id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(OrchestratorError::NotFound {
                entity: "execution".to_string(),
                id: execution.id.to_string(),
            });
        }
        Ok(())
    }

    async fn active_for_card(&self, card_id: Uuid) -> OrchestratorResult<Option<Execution>> {
        let row: Option<ExecutionRow> =
            sqlx::query_as("SELECT * FROM executions WHERE card_id = ? AND is_active = 1")
                .bind(card_id.to_string())
                .fetch_optional(&self.pool)
                .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn list_by_card(&self, card_id: Uuid) -> OrchestratorResult<Vec<Execution>> {
        let rows: Vec<ExecutionRow> =
            sqlx::query_as("SELECT * FROM executions WHERE card_id = ? ORDER BY started_at DESC")
                .bind(card_id.to_string())
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn append_log(&self, log: &ExecutionLog) -> OrchestratorResult<()> {
        sqlx::query(
            r#"INSERT INTO execution_logs (id, execution_id, sequence, log_type, content, timestamp)
               VALUES (?, ?, ?, ?, ?, ?)"#,
        )
        .bind(log.id.to_string())
        .bind(log.execution_id.to_string())
        .bind(log.sequence)
        .bind(log_type_str(log.log_type))
        .bind(&log.content)
        .bind(log.timestamp.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                OrchestratorError::StoreConflict {
                    entity: "execution_log".to_string(),
                    id: format!("{}/{}", log.execution_id, log.sequence),
                }
            }
            _ => OrchestratorError::from(e),
        })?;

        Ok(())
    }

    async fn list_logs(&self, execution_id: Uuid) -> OrchestratorResult<Vec<ExecutionLog>> {
        let rows: Vec<ExecutionLogRow> = sqlx::query_as(
            "SELECT * FROM execution_logs WHERE execution_id = ? ORDER BY sequence ASC",
        )
        .bind(execution_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }
}

const fn status_str(status: ExecutionStatus) -> &'static str {
    match status {
        ExecutionStatus::Running => "running",
        ExecutionStatus::Success => "success",
        ExecutionStatus::Error => "error",
    }
}

fn status_from_str(s: &str) -> OrchestratorResult<ExecutionStatus> {
    match s {
        "running" => Ok(ExecutionStatus::Running),
        "success" => Ok(ExecutionStatus::Success),
        "error" => Ok(ExecutionStatus::Error),
        other => Err(OrchestratorError::Internal(anyhow::anyhow!("invalid execution status: {other}"))),
    }
}

const fn log_type_str(log_type: LogType) -> &'static str {
    match log_type {
        LogType::Info => "info",
        LogType::Text => "text",
        LogType::Tool => "tool",
        LogType::Result => "result",
        LogType::Error => "error",
    }
}

fn log_type_from_str(s: &str) -> OrchestratorResult<LogType> {
    match s {
        "info" => Ok(LogType::Info),
        "text" => Ok(LogType::Text),
        "tool" => Ok(LogType::Tool),
        "result" => Ok(LogType::Result),
        "error" => Ok(LogType::Error),
        other => Err(OrchestratorError::Internal(anyhow::anyhow!("invalid log type: {other}"))),
    }
}

fn command_from_str(s: &str) -> OrchestratorResult<StageCommand> {
    match s {
        "/plan" => Ok(StageCommand::Plan),
        "/implement" => Ok(StageCommand::Implement),
        "/test-implementation" => Ok(StageCommand::TestImplementation),
        "/review" => Ok(StageCommand::Review),
        other => Err(OrchestratorError::Internal(anyhow::anyhow!("invalid stage command: {other}"))),
    }
}

#[derive(sqlx::FromRow)]
struct ExecutionRow {
    id: String,
    card_id: String,
    command: String,
    status: String,
    started_at: String,
    completed_at: Option<String>,
    workflow_stage: String,
    workflow_error: Option<String>,
    input_tokens: i64,
    output_tokens: i64,
    total_tokens: i64,
    cost: f64,
    model: String,
    is_active: bool,
}

impl TryFrom<ExecutionRow> for Execution {
    type Error = OrchestratorError;

    fn try_from(row: ExecutionRow) -> Result<Self, Self::Error> {
        Ok(Execution {
            id: super::parse_uuid(&row.id)?,
            card_id: super::parse_uuid(&row.card_id)?,
            command: command_from_str(&row.command)?,
            status: status_from_str(&row.status)?,
            started_at: super::parse_datetime(&row.started_at)?,
            completed_at: row.completed_at.map(|s| super::parse_datetime(&s)).transpose()?,
            workflow_stage: row.workflow_stage,
            workflow_error: row.workflow_error,
            usage: TokenUsage {
                input_tokens: row.input_tokens,
                output_tokens: row.output_tokens,
                total_tokens: row.total_tokens,
            },
            cost: row.cost,
            model: row.model,
            is_active: row.is_active,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ExecutionLogRow {
    id: String,
    execution_id: String,
    sequence: i64,
    log_type: String,
    content: String,
    timestamp: String,
}

impl TryFrom<ExecutionLogRow> for ExecutionLog {
    type Error = OrchestratorError;

    fn try_from(row: ExecutionLogRow) -> Result<Self, Self::Error> {
        Ok(ExecutionLog {
            id: super::parse_uuid(&row.id)?,
            execution_id: super::parse_uuid(&row.execution_id)?,
            sequence: row.sequence,
            log_type: log_type_from_str(&row.log_type)?,
            content: row.content,
            timestamp: super::parse_datetime(&row.timestamp)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::{create_migrated_test_pool, SqliteCardRepository, SqliteGoalRepository};
    use crate::domain::models::{Card, Goal, GoalSource, LogSequencer};
    use crate::domain::ports::{CardRepository, GoalRepository};

    async fn setup() -> (SqliteExecutionRepository, Uuid) {
        let pool = create_migrated_test_pool().await.unwrap();
        let goals = SqliteGoalRepository::new(pool.clone());
        let cards = SqliteCardRepository::new(pool.clone());
        let goal = Goal::new("x", GoalSource { source: "cli".into(), source_id: "local".into() });
        goals.create(&goal).await.unwrap();
        let card = Card::new(goal.id, "t", "d");
        cards.create(&card).await.unwrap();
        (SqliteExecutionRepository::new(pool), card.id)
    }

    #[tokio::test]
    async fn creating_new_execution_deactivates_prior_one() {
        let (repo, card_id) = setup().await;
        let first = Execution::start(card_id, StageCommand::Plan, "plan", "sonnet-default");
        repo.create(&first).await.unwrap();

        let second = Execution::start(card_id, StageCommand::Implement, "implement", "sonnet-default");
        repo.create(&second).await.unwrap();

        let active = repo.active_for_card(card_id).await.unwrap().unwrap();
        assert_eq!(active.id, second.id);

        let first_reloaded = repo.get(first.id).await.unwrap().unwrap();
        assert!(!first_reloaded.is_active);
    }

    #[tokio::test]
    async fn logs_preserve_sequence_order() {
        let (repo, card_id) = setup().await;
        let execution = Execution::start(card_id, StageCommand::Plan, "plan", "sonnet-default");
        repo.create(&execution).await.unwrap();

        let mut seq = LogSequencer::new(execution.id);
        for content in ["start", "working", "done"] {
            repo.append_log(&seq.next(LogType::Text, content)).await.unwrap();
        }

        let logs = repo.list_logs(execution.id).await.unwrap();
        assert_eq!(logs.len(), 3);
        assert_eq!(logs[0].sequence, 1);
        assert_eq!(logs[2].content, "done");
    }
}
