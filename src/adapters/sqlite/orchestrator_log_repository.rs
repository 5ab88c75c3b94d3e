//! SQLite implementation of the OrchestratorLogRepository port.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::domain::errors::OrchestratorResult;
use crate::domain::models::{Decision, OrchestratorAction, OrchestratorLog};
use crate::domain::ports::OrchestratorLogRepository;

#[derive(Clone)]
pub struct SqliteOrchestratorLogRepository {
    pool: SqlitePool,
}

impl SqliteOrchestratorLogRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrchestratorLogRepository for SqliteOrchestratorLogRepository {
    async fn record_action(&self, action: &OrchestratorAction) -> OrchestratorResult<()> {
        let decision_json = serde_json::to_string(&action.decision)?;

        sqlx::query(
            r#"INSERT INTO orchestrator_actions (id, tick, decision, outcome, error, created_at)
               VALUES (?, ?, ?, ?, ?, ?)"#,
        )
        .bind(action.id.to_string())
        .bind(action.tick)
        .bind(&decision_json)
        .bind(&action.outcome)
        .bind(&action.error)
        .bind(action.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn record_log(&self, log: &OrchestratorLog) -> OrchestratorResult<()> {
        sqlx::query("INSERT INTO orchestrator_logs (id, tick, message, created_at) VALUES (?, ?, ?, ?)")
            .bind(log.id.to_string())
            .bind(log.tick)
            .bind(&log.message)
            .bind(log.created_at.to_rfc3339())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn recent_actions(&self, limit: usize) -> OrchestratorResult<Vec<OrchestratorAction>> {
        let rows: Vec<ActionRow> = sqlx::query_as(
            "SELECT * FROM orchestrator_actions ORDER BY tick DESC, created_at DESC LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn recent_logs(&self, limit: usize) -> OrchestratorResult<Vec<OrchestratorLog>> {
        let rows: Vec<LogRow> = sqlx::query_as(
            "SELECT * FROM orchestrator_logs ORDER BY tick DESC, created_at DESC LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn last_tick(&self) -> OrchestratorResult<i64> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT COALESCE(MAX(tick), 0) FROM orchestrator_actions")
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map_or(0, |(tick,)| tick))
    }
}

#[derive(sqlx::FromRow)]
struct ActionRow {
    id: String,
    tick: i64,
    decision: String,
    outcome: Option<String>,
    error: Option<String>,
    created_at: String,
}

impl TryFrom<ActionRow> for OrchestratorAction {
    type Error = crate::domain::errors::OrchestratorError;

    fn try_from(row: ActionRow) -> Result<Self, Self::Error> {
        Ok(OrchestratorAction {
            id: super::parse_uuid(&row.id)?,
            tick: row.tick,
            decision: serde_json::from_str::<Decision>(&row.decision)?,
            outcome: row.outcome,
            error: row.error,
            created_at: super::parse_datetime(&row.created_at)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct LogRow {
    id: String,
    tick: i64,
    message: String,
    created_at: String,
}

impl TryFrom<LogRow> for OrchestratorLog {
    type Error = crate::domain::errors::OrchestratorError;

    fn try_from(row: LogRow) -> Result<Self, Self::Error> {
        Ok(OrchestratorLog {
            id: super::parse_uuid(&row.id)?,
            tick: row.tick,
            message: row.message,
            created_at: super::parse_datetime(&row.created_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_migrated_test_pool;

    #[tokio::test]
    async fn last_tick_defaults_to_zero_then_tracks_recorded_actions() {
        let pool = create_migrated_test_pool().await.unwrap();
        let repo = SqliteOrchestratorLogRepository::new(pool);
        assert_eq!(repo.last_tick().await.unwrap(), 0);

        let action = OrchestratorAction::new(1, Decision::Wait { reason: "budget".into() });
        repo.record_action(&action).await.unwrap();
        assert_eq!(repo.last_tick().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn recent_logs_orders_newest_first() {
        let pool = create_migrated_test_pool().await.unwrap();
        let repo = SqliteOrchestratorLogRepository::new(pool);
        repo.record_log(&OrchestratorLog::new(1, "tick 1")).await.unwrap();
        repo.record_log(&OrchestratorLog::new(2, "tick 2")).await.unwrap();

        let logs = repo.recent_logs(10).await.unwrap();
        assert_eq!(logs[0].tick, 2);
    }
}
