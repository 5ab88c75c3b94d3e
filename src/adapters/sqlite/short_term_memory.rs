//! SQLite implementation of the ShortTermMemory port.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::errors::OrchestratorResult;
use crate::domain::ports::{MemoryEntry, ShortTermMemory};

#[derive(Clone)]
pub struct SqliteShortTermMemory {
    pool: SqlitePool,
    ttl: Duration,
}

impl SqliteShortTermMemory {
    pub fn new(pool: SqlitePool, ttl_secs: i64) -> Self {
        Self { pool, ttl: Duration::seconds(ttl_secs) }
    }
}

#[async_trait]
impl ShortTermMemory for SqliteShortTermMemory {
    async fn append(&self, entry: MemoryEntry) -> OrchestratorResult<()> {
        sqlx::query("INSERT INTO short_term_memory (id, tick, summary, created_at) VALUES (?, ?, ?, ?)")
            .bind(Uuid::new_v4().to_string())
            .bind(entry.tick)
            .bind(&entry.summary)
            .bind(entry.created_at.to_rfc3339())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn cleanup_expired(&self) -> OrchestratorResult<u64> {
        let cutoff = Utc::now() - self.ttl;
        let result = sqlx::query("DELETE FROM short_term_memory WHERE created_at < ?")
            .bind(cutoff.to_rfc3339())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn recent(&self, limit: usize) -> OrchestratorResult<Vec<MemoryEntry>> {
        let cutoff = Utc::now() - self.ttl;
        let rows: Vec<(i64, String, String)> = sqlx::query_as(
            "SELECT tick, summary, created_at FROM short_term_memory WHERE created_at >= ? ORDER BY created_at DESC LIMIT ?",
        )
        .bind(cutoff.to_rfc3339())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(tick, summary, created_at)| {
                Ok(MemoryEntry { tick, summary, created_at: super::parse_datetime(&created_at)? })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sqlite::create_migrated_test_pool;

    #[tokio::test]
    async fn recent_returns_entries_within_ttl() {
        let pool = create_migrated_test_pool().await.unwrap();
        let memory = SqliteShortTermMemory::new(pool, 3600);
        memory
            .append(MemoryEntry { tick: 1, summary: "waited on budget".into(), created_at: Utc::now() })
            .await
            .unwrap();

        let entries = memory.recent(10).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].summary, "waited on budget");
    }

    #[tokio::test]
    async fn append_does_not_prune_expired_entries() {
        let pool = create_migrated_test_pool().await.unwrap();
        let memory = SqliteShortTermMemory::new(pool.clone(), 1);

        let stale_created_at = Utc::now() - Duration::seconds(10);
        sqlx::query("INSERT INTO short_term_memory (id, tick, summary, created_at) VALUES (?, ?, ?, ?)")
            .bind(Uuid::new_v4().to_string())
            .bind(1_i64)
            .bind("stale")
            .bind(stale_created_at.to_rfc3339())
            .execute(&pool)
            .await
            .unwrap();

        memory
            .append(MemoryEntry { tick: 2, summary: "fresh".into(), created_at: Utc::now() })
            .await
            .unwrap();

        // append() no longer prunes; the stale row is still there until
        // cleanup_expired() runs, though recent() already excludes it by cutoff.
        let row_count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM short_term_memory")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(row_count.0, 2);

        let entries = memory.recent(10).await.unwrap();
        assert!(entries.iter().all(|e| e.summary != "stale"));
    }

    #[tokio::test]
    async fn cleanup_expired_removes_stale_rows_and_reports_the_count() {
        let pool = create_migrated_test_pool().await.unwrap();
        let memory = SqliteShortTermMemory::new(pool.clone(), 1);

        let stale_created_at = Utc::now() - Duration::seconds(10);
        sqlx::query("INSERT INTO short_term_memory (id, tick, summary, created_at) VALUES (?, ?, ?, ?)")
            .bind(Uuid::new_v4().to_string())
            .bind(1_i64)
            .bind("stale")
            .bind(stale_created_at.to_rfc3339())
            .execute(&pool)
            .await
            .unwrap();
        memory
            .append(MemoryEntry { tick: 2, summary: "fresh".into(), created_at: Utc::now() })
            .await
            .unwrap();

        let removed = memory.cleanup_expired().await.unwrap();
        assert_eq!(removed, 1);

        let row_count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM short_term_memory")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(row_count.0, 1);
    }
}
