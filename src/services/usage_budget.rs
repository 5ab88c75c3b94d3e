//! SQLite-backed UsageBudget: tracks session/daily spend and exposes a
//! cached, fail-closed snapshot to the orchestrator loop.
//!
//! Grounded on the teacher's budget tracker: a cached aggregate pressure
//! snapshot refreshed on a TTL rather than recomputed every call, with
//! configurable thresholds. Unlike the teacher's multi-window tracker this
//! gate only needs two windows (session, daily) per the data model.

use chrono::{NaiveDate, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{instrument, warn};

use async_trait::async_trait;

use crate::domain::errors::OrchestratorResult;
use crate::domain::models::BudgetConfig;
use crate::domain::ports::{BudgetSnapshot, UsageBudget};

/// Session/daily hard caps the percentages in `BudgetSnapshot` are relative to.
#[derive(Debug, Clone, Copy)]
pub struct BudgetCaps {
    pub session_token_cap: i64,
    pub daily_token_cap: i64,
}

struct Cached {
    snapshot: BudgetSnapshot,
    fetched_at: Instant,
}

pub struct SqliteUsageBudget {
    pool: SqlitePool,
    config: BudgetConfig,
    caps: BudgetCaps,
    cache: Arc<RwLock<Option<Cached>>>,
}

impl SqliteUsageBudget {
    pub fn new(pool: SqlitePool, config: BudgetConfig, caps: BudgetCaps) -> Self {
        Self { pool, config, caps, cache: Arc::new(RwLock::new(None)) }
    }

    async fn row(&self) -> OrchestratorResult<(i64, i64, String)> {
        let row: Option<(i64, i64, String)> =
            sqlx::query_as("SELECT session_tokens, daily_tokens, day FROM budget_spend WHERE id = 1")
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.unwrap_or((0, 0, String::new())))
    }

    async fn compute_snapshot(&self) -> OrchestratorResult<BudgetSnapshot> {
        let today = Utc::now().date_naive().to_string();
        let (session_tokens, daily_tokens, day) = self.row().await?;
        let daily_tokens = if day == today { daily_tokens } else { 0 };

        let session_pct = percentage(session_tokens, self.caps.session_token_cap);
        let daily_pct = percentage(daily_tokens, self.caps.daily_token_cap);
        Ok(BudgetSnapshot { session_pct, daily_pct })
    }
}

fn percentage(spent: i64, cap: i64) -> f64 {
    if cap <= 0 {
        return 100.0;
    }
    (spent as f64 / cap as f64) * 100.0
}

#[async_trait]
impl UsageBudget for SqliteUsageBudget {
    #[instrument(skip(self))]
    async fn snapshot(&self) -> OrchestratorResult<BudgetSnapshot> {
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.fetched_at.elapsed().as_secs() < self.config.cache_ttl_secs {
                    return Ok(cached.snapshot);
                }
            }
        }

        // Fail-closed: if the underlying query errors, report as if both
        // windows are exhausted rather than bubbling the error up — THINK
        // must never mistake "don't know" for "safe to spend".
        let snapshot = match self.compute_snapshot().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "usage budget probe failed, failing closed");
                BudgetSnapshot { session_pct: 100.0, daily_pct: 100.0 }
            }
        };

        let mut cache = self.cache.write().await;
        *cache = Some(Cached { snapshot, fetched_at: Instant::now() });
        Ok(snapshot)
    }

    #[instrument(skip(self))]
    async fn record_spend(&self, tokens: i64, cost: f64) -> OrchestratorResult<()> {
        let today = Utc::now().date_naive();
        let (session_tokens, daily_tokens, day) = self.row().await?;
        let same_day = NaiveDate::parse_from_str(&day, "%Y-%m-%d").ok() == Some(today);
        let new_daily_tokens = if same_day { daily_tokens + tokens } else { tokens };

        sqlx::query(
            r#"INSERT INTO budget_spend (id, session_tokens, session_cost, daily_tokens, daily_cost, day, updated_at)
               VALUES (1, ?, ?, ?, ?, ?, ?)
               ON CONFLICT(id) DO UPDATE SET
                 session_tokens = session_tokens + excluded.session_tokens,
                 session_cost = session_cost + excluded.session_cost,
                 daily_tokens = excluded.daily_tokens,
                 daily_cost = CASE WHEN day = excluded.day THEN daily_cost + excluded.daily_cost ELSE excluded.daily_cost END,
                 day = excluded.day,
                 updated_at = excluded.updated_at"#,
        )
        .bind(tokens)
        .bind(cost)
        .bind(new_daily_tokens)
        .bind(cost)
        .bind(today.to_string())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        let mut cache = self.cache.write().await;
        *cache = None;
        let _ = session_tokens;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_migrated_test_pool;

    fn config() -> BudgetConfig {
        BudgetConfig { warn_pct: 80.0, block_pct: 95.0, cache_ttl_secs: 30, session_token_cap: 1_000, daily_token_cap: 10_000 }
    }

    fn caps() -> BudgetCaps {
        BudgetCaps { session_token_cap: 1_000, daily_token_cap: 10_000 }
    }

    #[tokio::test]
    async fn snapshot_starts_at_zero() {
        let pool = create_migrated_test_pool().await.unwrap();
        let budget = SqliteUsageBudget::new(pool, config(), caps());
        let snapshot = budget.snapshot().await.unwrap();
        assert_eq!(snapshot.session_pct, 0.0);
        assert!(!snapshot.is_blocked(95.0));
    }

    #[tokio::test]
    async fn record_spend_raises_session_pct() {
        let pool = create_migrated_test_pool().await.unwrap();
        let budget = SqliteUsageBudget::new(pool, config(), caps());
        budget.record_spend(500, 1.0).await.unwrap();

        let snapshot = budget.snapshot().await.unwrap();
        assert!((snapshot.session_pct - 50.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn block_threshold_trips_at_cap() {
        let pool = create_migrated_test_pool().await.unwrap();
        let budget = SqliteUsageBudget::new(pool, config(), caps());
        budget.record_spend(950, 2.0).await.unwrap();

        let snapshot = budget.snapshot().await.unwrap();
        assert!(snapshot.is_blocked(config().block_pct));
    }
}
