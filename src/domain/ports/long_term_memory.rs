//! LongTermMemory port: vector-store-backed retrieval over past `Learning`s.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::OrchestratorResult;
use crate::domain::models::{Learning, LearningOutcome};

#[derive(Debug, Clone, PartialEq)]
pub struct LearningMatch {
    pub learning: Learning,
    pub score: f32,
}

/// Point-count liveness summary returned by `LongTermMemory::stats`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectionStats {
    pub points_count: u64,
}

#[async_trait]
pub trait LongTermMemory: Send + Sync {
    /// Embed and store a learning. Idempotent on `learning.id`.
    async fn store(&self, learning: &Learning) -> OrchestratorResult<()>;

    /// Embed `query` and return the nearest learnings by cosine similarity
    /// whose score is at or above `threshold`, highest score first,
    /// capped at `limit`, optionally restricted to a single `outcome`.
    async fn query(
        &self,
        query: &str,
        limit: usize,
        threshold: f32,
        outcome_filter: Option<LearningOutcome>,
    ) -> OrchestratorResult<Vec<LearningMatch>>;

    async fn get(&self, id: Uuid) -> OrchestratorResult<Option<Learning>>;

    /// Remove a learning by id. Idempotent: removing an absent id is not
    /// an error.
    async fn delete(&self, id: Uuid) -> OrchestratorResult<()>;

    /// Liveness probe against the underlying vector store.
    async fn health_check(&self) -> OrchestratorResult<bool>;

    /// Point count in the collection, for operator visibility.
    async fn stats(&self) -> OrchestratorResult<CollectionStats>;
}
