//! Runtime configuration shape.
//!
//! Populated by `crate::config::ConfigLoader` (figment: defaults -> project
//! YAML -> local YAML -> env vars). Kept in `domain::models` rather than in
//! the `config` module because ports and services depend on its shape
//! directly, not on how it was loaded.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

fn default_database_url() -> String {
    "sqlite:cardforge.db".to_string()
}

const fn default_max_connections() -> u32 {
    5
}

const fn default_busy_timeout_ms() -> u64 {
    5_000
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

/// Fail-closed budget thresholds (§4.5): at or above `warn_pct` the loop
/// still runs; at or above `block_pct` every tick decides `Wait`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BudgetConfig {
    #[serde(default = "default_warn_pct")]
    pub warn_pct: f64,
    #[serde(default = "default_block_pct")]
    pub block_pct: f64,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_session_token_cap")]
    pub session_token_cap: i64,
    #[serde(default = "default_daily_token_cap")]
    pub daily_token_cap: i64,
}

const fn default_warn_pct() -> f64 {
    80.0
}

const fn default_block_pct() -> f64 {
    95.0
}

const fn default_cache_ttl_secs() -> u64 {
    30
}

const fn default_session_token_cap() -> i64 {
    500_000
}

const fn default_daily_token_cap() -> i64 {
    5_000_000
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            warn_pct: default_warn_pct(),
            block_pct: default_block_pct(),
            cache_ttl_secs: default_cache_ttl_secs(),
            session_token_cap: default_session_token_cap(),
            daily_token_cap: default_daily_token_cap(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorktreeConfig {
    #[serde(default = "default_worktree_root")]
    pub root: String,
    #[serde(default = "default_max_concurrent_worktrees")]
    pub max_concurrent: usize,
}

fn default_worktree_root() -> String {
    ".worktrees".to_string()
}

const fn default_max_concurrent_worktrees() -> usize {
    4
}

impl Default for WorktreeConfig {
    fn default() -> Self {
        Self { root: default_worktree_root(), max_concurrent: default_max_concurrent_worktrees() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default = "default_short_term_ttl_secs")]
    pub short_term_ttl_secs: i64,
    /// Minimum cosine similarity a learning must score to be returned from
    /// a `LongTermMemory::query` retrieval (spec.md §4.4's `threshold`).
    #[serde(default = "default_long_term_query_threshold")]
    pub long_term_query_threshold: f32,
}

const fn default_short_term_ttl_secs() -> i64 {
    86_400
}

const fn default_long_term_query_threshold() -> f32 {
    0.75
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            short_term_ttl_secs: default_short_term_ttl_secs(),
            long_term_query_threshold: default_long_term_query_threshold(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorStoreConfig {
    #[serde(default = "default_vector_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default = "default_collection")]
    pub collection: String,
    /// Dimensionality of `embedding_model`'s output vectors, used to
    /// lazily create the collection on first use (spec.md §4.4's
    /// "Operational contract").
    #[serde(default = "default_vector_size")]
    pub vector_size: u64,
}

fn default_vector_endpoint() -> String {
    "http://localhost:6333".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_collection() -> String {
    "cardforge_learnings".to_string()
}

const fn default_vector_size() -> u64 {
    1536
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            endpoint: default_vector_endpoint(),
            embedding_model: default_embedding_model(),
            collection: default_collection(),
            vector_size: default_vector_size(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Path to the primary back-end's CLI executable (defaults to the
    /// name in `PATH`).
    #[serde(default = "default_primary_cli_path")]
    pub primary_cli_path: String,
    #[serde(default = "default_agent_model_prefix")]
    pub primary_model_prefix: String,
    /// Path to the secondary back-end's CLI executable; `None` disables it
    /// and every model is routed to the primary back-end.
    #[serde(default)]
    pub secondary_cli_path: Option<String>,
    #[serde(default)]
    pub secondary_model_prefix: Option<String>,
    #[serde(default = "default_agent_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_primary_cli_path() -> String {
    "claude".to_string()
}

fn default_agent_model_prefix() -> String {
    "claude".to_string()
}

const fn default_agent_timeout_secs() -> u64 {
    1_800
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            primary_cli_path: default_primary_cli_path(),
            primary_model_prefix: default_agent_model_prefix(),
            secondary_cli_path: None,
            secondary_model_prefix: None,
            timeout_secs: default_agent_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

fn default_bind_addr() -> String {
    "127.0.0.1:8080".to_string()
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub budget: BudgetConfig,
    #[serde(default)]
    pub worktree: WorktreeConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub vector_store: VectorStoreConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub http: HttpConfig,
    /// `ORCHESTRATOR_ENABLED` — when false, the loop never ticks and only
    /// the HTTP Command API (manual single-stage execution) is available.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_loop_interval_secs")]
    pub loop_interval_secs: u64,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
}

const fn default_enabled() -> bool {
    true
}

const fn default_loop_interval_secs() -> u64 {
    10
}

fn default_log_dir() -> String {
    "logs".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            budget: BudgetConfig::default(),
            worktree: WorktreeConfig::default(),
            memory: MemoryConfig::default(),
            vector_store: VectorStoreConfig::default(),
            agent: AgentConfig::default(),
            http: HttpConfig::default(),
            enabled: default_enabled(),
            loop_interval_secs: default_loop_interval_secs(),
            log_dir: default_log_dir(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_defaults_are_fail_closed_ordering() {
        let b = BudgetConfig::default();
        assert!(b.warn_pct < b.block_pct);
        assert!(b.block_pct <= 100.0);
    }
}
