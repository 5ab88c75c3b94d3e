//! UsageBudget port: the fail-closed gate THINK consults before deciding
//! anything other than `Wait`.

use async_trait::async_trait;

use crate::domain::errors::OrchestratorResult;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BudgetSnapshot {
    pub session_pct: f64,
    pub daily_pct: f64,
}

impl BudgetSnapshot {
    pub fn is_blocked(self, block_pct: f64) -> bool {
        self.session_pct >= block_pct || self.daily_pct >= block_pct
    }
}

#[async_trait]
pub trait UsageBudget: Send + Sync {
    /// Current usage as a percentage of the configured session/daily caps.
    /// Implementations cache this for `cache_ttl_secs` (§4.5) and MUST
    /// return a blocked-looking snapshot (100%/100%) rather than propagate
    /// an error when the upstream cost probe is unreachable — the gate is
    /// fail-closed.
    async fn snapshot(&self) -> OrchestratorResult<BudgetSnapshot>;

    /// Record tokens/cost spent by one execution against the running
    /// session and daily totals.
    async fn record_spend(&self, tokens: i64, cost: f64) -> OrchestratorResult<()>;
}
