//! Goal repository port.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::OrchestratorResult;
use crate::domain::models::{Goal, GoalStatus};

/// Repository interface for `Goal` persistence.
#[async_trait]
pub trait GoalRepository: Send + Sync {
    /// Create a new goal.
    async fn create(&self, goal: &Goal) -> OrchestratorResult<()>;

    /// Get a goal by id.
    async fn get(&self, id: Uuid) -> OrchestratorResult<Option<Goal>>;

    /// Replace a goal, enforcing the optimistic-concurrency `version` check.
    /// Returns `StoreConflict` if the stored version has moved on.
    async fn update(&self, goal: &Goal) -> OrchestratorResult<()>;

    /// List goals in a given status, oldest-created first.
    async fn list_by_status(&self, status: GoalStatus) -> OrchestratorResult<Vec<Goal>>;

    /// The single oldest `PENDING` goal, if any — candidate for promotion.
    async fn oldest_pending(&self) -> OrchestratorResult<Option<Goal>>;

    /// All goals currently `ACTIVE`.
    async fn list_active(&self) -> OrchestratorResult<Vec<Goal>>;
}
