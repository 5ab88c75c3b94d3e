//! Execution and ExecutionLog repository port.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::OrchestratorResult;
use crate::domain::models::{Execution, ExecutionLog};

#[async_trait]
pub trait ExecutionRepository: Send + Sync {
    /// Create an execution. If another execution for the same card is
    /// still `is_active`, the adapter atomically clears it first — at
    /// most one active execution per card holds at all times.
    async fn create(&self, execution: &Execution) -> OrchestratorResult<()>;

    async fn get(&self, id: Uuid) -> OrchestratorResult<Option<Execution>>;

    async fn update(&self, execution: &Execution) -> OrchestratorResult<()>;

    /// The currently active execution for a card, if any.
    async fn active_for_card(&self, card_id: Uuid) -> OrchestratorResult<Option<Execution>>;

    /// All executions for a card, most recent first.
    async fn list_by_card(&self, card_id: Uuid) -> OrchestratorResult<Vec<Execution>>;

    /// Append a log entry. The adapter rejects out-of-order `sequence`
    /// values; callers drive sequencing through `LogSequencer`.
    async fn append_log(&self, log: &ExecutionLog) -> OrchestratorResult<()>;

    /// Logs for an execution, ordered by sequence.
    async fn list_logs(&self, execution_id: Uuid) -> OrchestratorResult<Vec<ExecutionLog>>;
}
