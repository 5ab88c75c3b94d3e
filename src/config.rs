//! Hierarchical configuration loading via `figment`.
//!
//! Precedence (lowest to highest):
//! 1. Programmatic defaults (`Config::default()`)
//! 2. `.cardforge/config.yaml` (project config)
//! 3. `.cardforge/local.yaml` (optional local overrides, gitignored)
//! 4. `CARDFORGE_*` environment variables (highest priority)

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::models::Config;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("budget.warn_pct ({0}) must be less than budget.block_pct ({1})")]
    BudgetOrdering(f64, f64),

    #[error("budget.block_pct ({0}) must not exceed 100.0")]
    BudgetOutOfRange(f64),

    #[error("worktree.max_concurrent must be at least 1")]
    InvalidWorktreeConcurrency,

    #[error("agent.primary_cli_path cannot be empty")]
    EmptyAgentCliPath,

    #[error("loop_interval_secs must be at least 1")]
    InvalidLoopInterval,

    #[error("memory.long_term_query_threshold ({0}) must be between 0.0 and 1.0")]
    InvalidQueryThreshold(f32),

    #[error("vector_store.vector_size must be at least 1")]
    InvalidVectorSize,
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn load() -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(".cardforge/config.yaml"))
            .merge(Yaml::file(".cardforge/local.yaml"))
            .merge(Env::prefixed("CARDFORGE_").split("__"))
            .extract()
            .context("failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .with_context(|| format!("failed to load config from {}", path.as_ref().display()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.budget.warn_pct >= config.budget.block_pct {
            return Err(ConfigError::BudgetOrdering(config.budget.warn_pct, config.budget.block_pct));
        }
        if config.budget.block_pct > 100.0 {
            return Err(ConfigError::BudgetOutOfRange(config.budget.block_pct));
        }
        if config.worktree.max_concurrent == 0 {
            return Err(ConfigError::InvalidWorktreeConcurrency);
        }
        if config.agent.primary_cli_path.is_empty() {
            return Err(ConfigError::EmptyAgentCliPath);
        }
        if config.loop_interval_secs == 0 {
            return Err(ConfigError::InvalidLoopInterval);
        }
        if !(0.0..=1.0).contains(&config.memory.long_term_query_threshold) {
            return Err(ConfigError::InvalidQueryThreshold(config.memory.long_term_query_threshold));
        }
        if config.vector_store.vector_size == 0 {
            return Err(ConfigError::InvalidVectorSize);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        ConfigLoader::validate(&Config::default()).unwrap();
    }

    #[test]
    fn rejects_inverted_budget_thresholds() {
        let mut config = Config::default();
        config.budget.warn_pct = 99.0;
        config.budget.block_pct = 90.0;
        assert!(matches!(ConfigLoader::validate(&config), Err(ConfigError::BudgetOrdering(_, _))));
    }

    #[test]
    fn rejects_zero_worktree_concurrency() {
        let mut config = Config::default();
        config.worktree.max_concurrent = 0;
        assert!(matches!(ConfigLoader::validate(&config), Err(ConfigError::InvalidWorktreeConcurrency)));
    }

    #[test]
    fn rejects_out_of_range_query_threshold() {
        let mut config = Config::default();
        config.memory.long_term_query_threshold = 1.5;
        assert!(matches!(ConfigLoader::validate(&config), Err(ConfigError::InvalidQueryThreshold(_))));
    }

    #[test]
    fn rejects_zero_vector_size() {
        let mut config = Config::default();
        config.vector_store.vector_size = 0;
        assert!(matches!(ConfigLoader::validate(&config), Err(ConfigError::InvalidVectorSize)));
    }
}
