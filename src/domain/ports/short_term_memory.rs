//! ShortTermMemory port: a TTL-bounded, append-only log of recent tick
//! activity consulted during READ/QUERY. Expiry is not tied to writes —
//! `cleanup_expired` is an independent operation the orchestrator invokes
//! once per tick.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::errors::OrchestratorResult;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub tick: i64,
    pub summary: String,
    pub created_at: DateTime<Utc>,
}

/// The small digest READ assembles for THINK: the active goal (if any), how
/// many goals are still pending, and the tail of recent step activity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryContext {
    pub active_goal_id: Option<Uuid>,
    pub pending_goal_count: usize,
    pub recent_steps: Vec<MemoryEntry>,
}

#[async_trait]
pub trait ShortTermMemory: Send + Sync {
    /// Append an entry. Does not prune — see `cleanup_expired`.
    async fn append(&self, entry: MemoryEntry) -> OrchestratorResult<()>;

    /// Entries still inside the TTL window, newest first.
    async fn recent(&self, limit: usize) -> OrchestratorResult<Vec<MemoryEntry>>;

    /// Assemble the READ-phase digest. Goal state isn't this port's
    /// concern, so the caller (the orchestrator, which already holds a
    /// `GoalRepository`) supplies it; this only adds the last 10 steps.
    async fn context_summary(
        &self,
        active_goal_id: Option<Uuid>,
        pending_goal_count: usize,
    ) -> OrchestratorResult<MemoryContext> {
        Ok(MemoryContext { active_goal_id, pending_goal_count, recent_steps: self.recent(10).await? })
    }

    /// Remove all entries past their TTL. Invoked periodically (once per
    /// tick), independent of `append`. Returns the number of rows removed.
    async fn cleanup_expired(&self) -> OrchestratorResult<u64>;
}
