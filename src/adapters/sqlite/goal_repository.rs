//! SQLite implementation of the GoalRepository port.

use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::errors::{OrchestratorError, OrchestratorResult};
use crate::domain::models::{Goal, GoalSource, GoalStatus};
use crate::domain::ports::GoalRepository;

#[derive(Clone)]
pub struct SqliteGoalRepository {
    pool: SqlitePool,
}

impl SqliteGoalRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl GoalRepository for SqliteGoalRepository {
    async fn create(&self, goal: &Goal) -> OrchestratorResult<()> {
        let card_ids_json = serde_json::to_string(&goal.card_ids)?;

        sqlx::query(
            r#"INSERT INTO goals (id, description, status, source, source_id, card_ids,
               learning_text, learning_id, total_tokens, total_cost, error,
               created_at, started_at, completed_at, version)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(goal.id.to_string())
        .bind(&goal.description)
        .bind(goal.status.as_str())
        .bind(&goal.source.source)
        .bind(&goal.source.source_id)
        .bind(&card_ids_json)
        .bind(&goal.learning_text)
        .bind(goal.learning_id.map(|id| id.to_string()))
        .bind(goal.total_tokens)
        .bind(goal.total_cost)
        .bind(&goal.error)
        .bind(goal.created_at.to_rfc3339())
        .bind(goal.started_at.map(|ts| ts.to_rfc3339()))
        .bind(goal.completed_at.map(|ts| ts.to_rfc3339()))
        .bind(goal.version)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, id: Uuid) -> OrchestratorResult<Option<Goal>> {
        let row: Option<GoalRow> = sqlx::query_as("SELECT * FROM goals WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn update(&self, goal: &Goal) -> OrchestratorResult<()> {
        let card_ids_json = serde_json::to_string(&goal.card_ids)?;

        let result = sqlx::query(
            r#"UPDATE goals SET description = ?, status = ?, card_ids = ?, learning_text = ?,
               learning_id = ?, total_tokens = ?, total_cost = ?, error = ?,
               started_at = ?, completed_at = ?, version = ?
               WHERE id = ? AND version = ?"#,
        )
        .bind(&goal.description)
        .bind(goal.status.as_str())
        .bind(&card_ids_json)
        .bind(&goal.learning_text)
        .bind(goal.learning_id.map(|id| id.to_string()))
        .bind(goal.total_tokens)
        .bind(goal.total_cost)
        .bind(&goal.error)
        .bind(goal.started_at.map(|ts| ts.to_rfc3339()))
        .bind(goal.completed_at.map(|ts| ts.to_rfc3339()))
        .bind(goal.version)
        .bind(goal.id.to_string())
        .bind(goal.version - 1)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(OrchestratorError::StoreConflict {
                entity: "goal".to_string(),
                id: goal.id.to_string(),
            });
        }

        Ok(())
    }

    async fn list_by_status(&self, status: GoalStatus) -> OrchestratorResult<Vec<Goal>> {
        let rows: Vec<GoalRow> = sqlx::query_as("SELECT * FROM goals WHERE status = ? ORDER BY created_at")
            .bind(status.as_str())
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn oldest_pending(&self) -> OrchestratorResult<Option<Goal>> {
        let row: Option<GoalRow> = sqlx::query_as(
            "SELECT * FROM goals WHERE status = 'pending' ORDER BY created_at ASC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn list_active(&self) -> OrchestratorResult<Vec<Goal>> {
        self.list_by_status(GoalStatus::Active).await
    }
}

#[derive(sqlx::FromRow)]
struct GoalRow {
    id: String,
    description: String,
    status: String,
    source: String,
    source_id: String,
    card_ids: String,
    learning_text: Option<String>,
    learning_id: Option<String>,
    total_tokens: i64,
    total_cost: f64,
    error: Option<String>,
    created_at: String,
    started_at: Option<String>,
    completed_at: Option<String>,
    version: i64,
}

impl TryFrom<GoalRow> for Goal {
    type Error = OrchestratorError;

    fn try_from(row: GoalRow) -> Result<Self, Self::Error> {
        let status = GoalStatus::from_str(&row.status).ok_or_else(|| {
            OrchestratorError::Internal(anyhow::anyhow!("invalid goal status: {}", row.status))
        })?;

        Ok(Goal {
            id: super::parse_uuid(&row.id)?,
            description: row.description,
            status,
            source: GoalSource {
                source: row.source,
                source_id: row.source_id,
            },
            card_ids: serde_json::from_str(&row.card_ids)?,
            learning_text: row.learning_text,
            learning_id: row.learning_id.map(|s| super::parse_uuid(&s)).transpose()?,
            total_tokens: row.total_tokens,
            total_cost: row.total_cost,
            error: row.error,
            created_at: super::parse_datetime(&row.created_at)?,
            started_at: row.started_at.map(|s| super::parse_datetime(&s)).transpose()?,
            completed_at: row.completed_at.map(|s| super::parse_datetime(&s)).transpose()?,
            version: row.version,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_migrated_test_pool;

    async fn setup() -> SqliteGoalRepository {
        let pool = create_migrated_test_pool().await.unwrap();
        SqliteGoalRepository::new(pool)
    }

    fn source() -> GoalSource {
        GoalSource {
            source: "cli".to_string(),
            source_id: "local".to_string(),
        }
    }

    #[tokio::test]
    async fn create_and_get_roundtrips() {
        let repo = setup().await;
        let goal = Goal::new("add healthz", source());
        repo.create(&goal).await.unwrap();

        let fetched = repo.get(goal.id).await.unwrap().unwrap();
        assert_eq!(fetched.description, "add healthz");
        assert_eq!(fetched.status, GoalStatus::Pending);
    }

    #[tokio::test]
    async fn update_rejects_stale_version() {
        let repo = setup().await;
        let mut goal = Goal::new("x", source());
        repo.create(&goal).await.unwrap();

        goal.transition_to(GoalStatus::Active).unwrap();
        repo.update(&goal).await.unwrap();

        // stale copy still thinks version is 1 -> update should conflict
        let mut stale = goal.clone();
        stale.version = 1;
        let err = repo.update(&stale).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::StoreConflict { .. }));
    }

    #[tokio::test]
    async fn oldest_pending_orders_by_created_at() {
        let repo = setup().await;
        let first = Goal::new("first", source());
        repo.create(&first).await.unwrap();
        let second = Goal::new("second", source());
        repo.create(&second).await.unwrap();

        let oldest = repo.oldest_pending().await.unwrap().unwrap();
        assert_eq!(oldest.id, first.id);
    }
}
