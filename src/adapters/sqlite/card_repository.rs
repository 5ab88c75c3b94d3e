//! SQLite implementation of the CardRepository port.

use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::errors::{OrchestratorError, OrchestratorResult};
use crate::domain::models::{Card, Column};
use crate::domain::ports::{CardFilter, CardRepository};

#[derive(Clone)]
pub struct SqliteCardRepository {
    pool: SqlitePool,
}

impl SqliteCardRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CardRepository for SqliteCardRepository {
    async fn create(&self, card: &Card) -> OrchestratorResult<()> {
        let dependencies_json = serde_json::to_string(&card.dependencies)?;
        let diff_stats_json = card.diff_stats.as_ref().map(serde_json::to_string).transpose()?;

        sqlx::query(
            r#"INSERT INTO cards (id, goal_id, title, description, column_name, spec_path,
               model_plan, model_implement, model_test, model_review, parent_card_id,
               is_fix_card, test_error_context, branch_name, worktree_path, base_branch,
               dependencies, diff_stats, archived, created_at, completed_at, version)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(card.id.to_string())
        .bind(card.goal_id.to_string())
        .bind(&card.title)
        .bind(&card.description)
        .bind(card.column.as_str())
        .bind(&card.spec_path)
        .bind(&card.model_plan)
        .bind(&card.model_implement)
        .bind(&card.model_test)
        .bind(&card.model_review)
        .bind(card.parent_card_id.map(|id| id.to_string()))
        .bind(card.is_fix_card)
        .bind(&card.test_error_context)
        .bind(&card.branch_name)
        .bind(&card.worktree_path)
        .bind(&card.base_branch)
        .bind(&dependencies_json)
        .bind(&diff_stats_json)
        .bind(card.archived)
        .bind(card.created_at.to_rfc3339())
        .bind(card.completed_at.map(|ts| ts.to_rfc3339()))
        .bind(card.version)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get(&self, id: Uuid) -> OrchestratorResult<Option<Card>> {
        let row: Option<CardRow> = sqlx::query_as("SELECT * FROM cards WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(TryInto::try_into).transpose()
    }

    async fn update(&self, card: &Card) -> OrchestratorResult<()> {
        let dependencies_json = serde_json::to_string(&card.dependencies)?;
        let diff_stats_json = card.diff_stats.as_ref().map(serde_json::to_string).transpose()?;

        let result = sqlx::query(
            r#"UPDATE cards SET title = ?, description = ?, column_name = ?, spec_path = ?,
               parent_card_id = ?, test_error_context = ?, branch_name = ?, worktree_path = ?,
               base_branch = ?, dependencies = ?, diff_stats = ?, archived = ?,
               completed_at = ?, version = ?
               WHERE id = ? AND version = ?"#,
        )
        .bind(&card.title)
        .bind(&card.description)
        .bind(card.column.as_str())
        .bind(&card.spec_path)
        .bind(card.parent_card_id.map(|id| id.to_string()))
        .bind(&card.test_error_context)
        .bind(&card.branch_name)
        .bind(&card.worktree_path)
        .bind(&card.base_branch)
        .bind(&dependencies_json)
        .bind(&diff_stats_json)
        .bind(card.archived)
        .bind(card.completed_at.map(|ts| ts.to_rfc3339()))
        .bind(card.version)
        .bind(card.id.to_string())
        .bind(card.version - 1)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(OrchestratorError::StoreConflict {
                entity: "card".to_string(),
                id: card.id.to_string(),
            });
        }

        Ok(())
    }

    async fn move_column(&self, id: Uuid, to: Column) -> OrchestratorResult<Card> {
        let mut card = self
            .get(id)
            .await?
            .ok_or_else(|| OrchestratorError::NotFound { entity: "card".to_string(), id: id.to_string() })?;
        card.transition_to(to)?;

        // A card can be moved concurrently by the tick loop and the HTTP
        // move-card endpoint; re-read and reapply the transition once
        // against the current version before surfacing the conflict.
        match self.update(&card).await {
            Ok(()) => Ok(card),
            Err(e) if e.is_retryable() => {
                let mut card = self
                    .get(id)
                    .await?
                    .ok_or_else(|| OrchestratorError::NotFound { entity: "card".to_string(), id: id.to_string() })?;
                card.transition_to(to)?;
                self.update(&card).await?;
                Ok(card)
            }
            Err(e) => Err(e),
        }
    }

    async fn list(&self, filter: CardFilter) -> OrchestratorResult<Vec<Card>> {
        let mut query = String::from("SELECT * FROM cards WHERE 1=1");
        let mut bindings: Vec<String> = Vec::new();

        if let Some(goal_id) = filter.goal_id {
            query.push_str(" AND goal_id = ?");
            bindings.push(goal_id.to_string());
        }
        if let Some(column) = filter.column {
            query.push_str(" AND column_name = ?");
            bindings.push(column.as_str().to_string());
        }
        if let Some(is_fix_card) = filter.is_fix_card {
            query.push_str(" AND is_fix_card = ?");
            bindings.push(i32::from(is_fix_card).to_string());
        }
        if let Some(parent_card_id) = filter.parent_card_id {
            query.push_str(" AND parent_card_id = ?");
            bindings.push(parent_card_id.to_string());
        }
        query.push_str(" ORDER BY created_at");

        let mut q = sqlx::query_as::<_, CardRow>(&query);
        for binding in &bindings {
            q = q.bind(binding);
        }

        let rows: Vec<CardRow> = q.fetch_all(&self.pool).await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn list_by_goal(&self, goal_id: Uuid) -> OrchestratorResult<Vec<Card>> {
        self.list(CardFilter { goal_id: Some(goal_id), ..Default::default() }).await
    }

    async fn list_ready(&self, goal_id: Uuid) -> OrchestratorResult<Vec<Card>> {
        let all = self.list_by_goal(goal_id).await?;
        let resolved: Vec<(Uuid, Column)> = all.iter().map(|c| (c.id, c.column)).collect();
        Ok(all
            .into_iter()
            .filter(|c| c.column.is_executable() && c.dependencies_satisfied(&resolved))
            .collect())
    }

    async fn list_fix_cards(&self, parent_card_id: Uuid) -> OrchestratorResult<Vec<Card>> {
        self.list(CardFilter {
            parent_card_id: Some(parent_card_id),
            is_fix_card: Some(true),
            ..Default::default()
        })
        .await
    }
}

#[derive(sqlx::FromRow)]
struct CardRow {
    id: String,
    goal_id: String,
    title: String,
    description: String,
    column_name: String,
    spec_path: Option<String>,
    model_plan: String,
    model_implement: String,
    model_test: String,
    model_review: String,
    parent_card_id: Option<String>,
    is_fix_card: bool,
    test_error_context: Option<String>,
    branch_name: Option<String>,
    worktree_path: Option<String>,
    base_branch: Option<String>,
    dependencies: String,
    diff_stats: Option<String>,
    archived: bool,
    created_at: String,
    completed_at: Option<String>,
    version: i64,
}

impl TryFrom<CardRow> for Card {
    type Error = OrchestratorError;

    fn try_from(row: CardRow) -> Result<Self, Self::Error> {
        let column = Column::from_str(&row.column_name).ok_or_else(|| {
            OrchestratorError::Internal(anyhow::anyhow!("invalid column: {}", row.column_name))
        })?;

        Ok(Card {
            id: super::parse_uuid(&row.id)?,
            goal_id: super::parse_uuid(&row.goal_id)?,
            title: row.title,
            description: row.description,
            column,
            spec_path: row.spec_path,
            model_plan: row.model_plan,
            model_implement: row.model_implement,
            model_test: row.model_test,
            model_review: row.model_review,
            parent_card_id: row.parent_card_id.map(|s| super::parse_uuid(&s)).transpose()?,
            is_fix_card: row.is_fix_card,
            test_error_context: row.test_error_context,
            branch_name: row.branch_name,
            worktree_path: row.worktree_path,
            base_branch: row.base_branch,
            dependencies: serde_json::from_str(&row.dependencies)?,
            diff_stats: row.diff_stats.map(|s| serde_json::from_str(&s)).transpose()?,
            archived: row.archived,
            created_at: super::parse_datetime(&row.created_at)?,
            completed_at: row.completed_at.map(|s| super::parse_datetime(&s)).transpose()?,
            version: row.version,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::{create_migrated_test_pool, SqliteGoalRepository};
    use crate::domain::models::{Goal, GoalSource};
    use crate::domain::ports::GoalRepository;

    async fn setup() -> (SqliteCardRepository, Uuid) {
        let pool = create_migrated_test_pool().await.unwrap();
        let goals = SqliteGoalRepository::new(pool.clone());
        let goal = Goal::new(
            "x",
            GoalSource { source: "cli".into(), source_id: "local".into() },
        );
        goals.create(&goal).await.unwrap();
        (SqliteCardRepository::new(pool), goal.id)
    }

    #[tokio::test]
    async fn move_column_persists_and_rejects_illegal_jump() {
        let (repo, goal_id) = setup().await;
        let card = Card::new(goal_id, "add healthz", "return 200");
        repo.create(&card).await.unwrap();

        let moved = repo.move_column(card.id, Column::Plan).await.unwrap();
        assert_eq!(moved.column, Column::Plan);

        let err = repo.move_column(card.id, Column::Done).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn move_column_retries_once_past_a_concurrent_version_bump() {
        let (repo, goal_id) = setup().await;
        let card = Card::new(goal_id, "add healthz", "return 200");
        repo.create(&card).await.unwrap();

        // Simulate a concurrent writer (e.g. the HTTP move-card endpoint)
        // bumping the row's version out from under this repo handle.
        sqlx::query("UPDATE cards SET version = version + 1 WHERE id = ?")
            .bind(card.id.to_string())
            .execute(&repo.pool)
            .await
            .unwrap();

        let moved = repo.move_column(card.id, Column::Plan).await.unwrap();
        assert_eq!(moved.column, Column::Plan);
    }

    #[tokio::test]
    async fn list_ready_respects_dependency_gate() {
        let (repo, goal_id) = setup().await;
        let dep = Card::new(goal_id, "dep", "dep desc");
        repo.create(&dep).await.unwrap();

        let mut blocked = Card::new(goal_id, "blocked", "needs dep");
        blocked.dependencies = vec![dep.id];
        repo.create(&blocked).await.unwrap();

        let ready = repo.list_ready(goal_id).await.unwrap();
        assert!(ready.iter().any(|c| c.id == dep.id));
        assert!(!ready.iter().any(|c| c.id == blocked.id));

        repo.move_column(dep.id, Column::Plan).await.unwrap();
        repo.move_column(dep.id, Column::Implement).await.unwrap();
        repo.move_column(dep.id, Column::Test).await.unwrap();
        repo.move_column(dep.id, Column::Review).await.unwrap();
        repo.move_column(dep.id, Column::Done).await.unwrap();

        let ready = repo.list_ready(goal_id).await.unwrap();
        assert!(ready.iter().any(|c| c.id == blocked.id));
    }
}
