//! OrchestratorAction / OrchestratorLog repository port.

use async_trait::async_trait;

use crate::domain::errors::OrchestratorResult;
use crate::domain::models::{OrchestratorAction, OrchestratorLog};

#[async_trait]
pub trait OrchestratorLogRepository: Send + Sync {
    async fn record_action(&self, action: &OrchestratorAction) -> OrchestratorResult<()>;

    async fn record_log(&self, log: &OrchestratorLog) -> OrchestratorResult<()>;

    /// Most recent actions, newest first, capped at `limit`.
    async fn recent_actions(&self, limit: usize) -> OrchestratorResult<Vec<OrchestratorAction>>;

    /// Most recent log lines, newest first, capped at `limit`.
    async fn recent_logs(&self, limit: usize) -> OrchestratorResult<Vec<OrchestratorLog>>;

    /// The tick number of the most recently recorded action, used to
    /// resume tick numbering across restarts.
    async fn last_tick(&self) -> OrchestratorResult<i64>;
}
