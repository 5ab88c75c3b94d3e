//! Git-worktree-backed implementation of the WorktreeManager port.
//!
//! Each card gets its own worktree and `agent/<short-id>-<timestamp>`
//! branch, created off the repository's default branch. The concurrent
//! worktree budget only counts branches with the `agent/` prefix, so
//! worktrees a human created by hand don't starve the orchestrator.
//!
//! Worktree directories are named from only the first 8 hex characters of
//! the card id (`.worktrees/card-<short-id>`), so the card<->path mapping
//! is not recoverable from `git worktree list` alone; the `worktrees`
//! table is the source of truth, `git worktree list` is only used to
//! detect entries git itself still thinks are live.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use sqlx::SqlitePool;
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::domain::errors::{OrchestratorError, OrchestratorResult};
use crate::domain::ports::{Worktree, WorktreeManager};

pub struct GitWorktreeManager {
    project_path: PathBuf,
    worktrees_dir: PathBuf,
    max_concurrent: usize,
    pool: SqlitePool,
    /// Serializes worktree creation/removal; `git worktree add` is not
    /// safe to run concurrently against the same repository.
    lock: Mutex<()>,
}

impl GitWorktreeManager {
    pub fn new(
        project_path: impl Into<PathBuf>,
        worktree_root: impl AsRef<Path>,
        max_concurrent: usize,
        pool: SqlitePool,
    ) -> Self {
        let project_path = project_path.into();
        let worktrees_dir = project_path.join(worktree_root.as_ref());
        Self { project_path, worktrees_dir, max_concurrent, pool, lock: Mutex::new(()) }
    }

    async fn run_git(&self, args: &[&str]) -> OrchestratorResult<(bool, String, String)> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.project_path)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| OrchestratorError::WorktreeVcsFail(e.to_string()))?;

        Ok((
            output.status.success(),
            String::from_utf8_lossy(&output.stdout).to_string(),
            String::from_utf8_lossy(&output.stderr).to_string(),
        ))
    }

    /// Default-branch probing order: remote HEAD, then local config,
    /// then literal `main`/`master` existence, finally `"main"`.
    async fn default_branch(&self) -> OrchestratorResult<String> {
        let (ok, stdout, _) = self.run_git(&["symbolic-ref", "refs/remotes/origin/HEAD"]).await?;
        if ok {
            let branch = stdout.trim().trim_start_matches("refs/remotes/origin/");
            if !branch.is_empty() {
                return Ok(branch.to_string());
            }
        }

        let (ok, stdout, _) = self.run_git(&["config", "--get", "init.defaultBranch"]).await?;
        if ok && !stdout.trim().is_empty() {
            return Ok(stdout.trim().to_string());
        }

        for candidate in ["main", "master"] {
            let (ok, _, _) = self.run_git(&["rev-parse", "--verify", candidate]).await?;
            if ok {
                return Ok(candidate.to_string());
            }
        }

        Ok("main".to_string())
    }

    async fn branch_exists(&self, branch: &str) -> OrchestratorResult<bool> {
        let (_, stdout, _) = self.run_git(&["branch", "--list", branch]).await?;
        Ok(!stdout.trim().is_empty())
    }

    async fn cleanup_stale_branch(&self, branch: &str) -> OrchestratorResult<()> {
        if self.branch_exists(branch).await? {
            self.run_git(&["branch", "-D", branch]).await?;
        }
        Ok(())
    }

    fn short_id(card_id: Uuid) -> String {
        card_id.to_string()[..8].to_string()
    }

    fn worktree_path(&self, card_id: Uuid) -> PathBuf {
        self.worktrees_dir.join(format!("card-{}", Self::short_id(card_id)))
    }

    /// Paths `git worktree list --porcelain` currently reports as live.
    async fn git_known_paths(&self) -> OrchestratorResult<HashSet<String>> {
        let (_, stdout, _) = self.run_git(&["worktree", "list", "--porcelain"]).await?;
        Ok(stdout
            .lines()
            .filter_map(|line| line.strip_prefix("worktree "))
            .map(ToString::to_string)
            .collect())
    }
}

#[async_trait]
impl WorktreeManager for GitWorktreeManager {
    #[instrument(skip(self), fields(card_id = %card_id))]
    async fn create(&self, card_id: Uuid, base_branch: Option<String>) -> OrchestratorResult<Worktree> {
        let _guard = self.lock.lock().await;

        let (is_repo, _, _) = self.run_git(&["rev-parse", "--is-inside-work-tree"]).await?;
        if !is_repo {
            return Ok(Worktree {
                card_id,
                branch_name: "none".to_string(),
                path: self.project_path.to_string_lossy().to_string(),
                base_branch: "none".to_string(),
            });
        }

        let active = self.active().await?;
        let agent_prefixed = active.iter().filter(|w| w.branch_name.starts_with("agent/")).count();
        if agent_prefixed >= self.max_concurrent {
            return Err(OrchestratorError::WorktreeLimit { active: agent_prefixed, max: self.max_concurrent });
        }

        tokio::fs::create_dir_all(&self.worktrees_dir)
            .await
            .map_err(|e| OrchestratorError::WorktreeVcsFail(e.to_string()))?;

        let base_branch = match base_branch {
            Some(branch) => branch,
            None => self.default_branch().await?,
        };
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| OrchestratorError::Internal(anyhow::anyhow!(e)))?
            .as_secs();
        let branch_name = format!("agent/{}-{timestamp}", Self::short_id(card_id));
        let worktree_path = self.worktree_path(card_id);

        if worktree_path.exists() {
            self.run_git(&["worktree", "remove", &worktree_path.to_string_lossy(), "--force"]).await?;
        }
        self.cleanup_stale_branch(&branch_name).await?;

        let (ok, _, stderr) = self
            .run_git(&["worktree", "add", &worktree_path.to_string_lossy(), "-b", &branch_name, &base_branch])
            .await?;

        if !ok {
            return Err(OrchestratorError::WorktreeVcsFail(stderr));
        }

        let worktree = Worktree {
            card_id,
            branch_name,
            path: worktree_path.to_string_lossy().to_string(),
            base_branch,
        };

        sqlx::query(
            "INSERT OR REPLACE INTO worktrees (card_id, branch_name, path, base_branch, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(card_id.to_string())
        .bind(&worktree.branch_name)
        .bind(&worktree.path)
        .bind(&worktree.base_branch)
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        info!(branch = %worktree.branch_name, path = %worktree.path, "worktree created");
        Ok(worktree)
    }

    #[instrument(skip(self), fields(card_id = %card_id))]
    async fn remove(&self, card_id: Uuid, delete_branch: bool) -> OrchestratorResult<()> {
        let _guard = self.lock.lock().await;

        let row: Option<(String, String)> =
            sqlx::query_as("SELECT path, branch_name FROM worktrees WHERE card_id = ?")
                .bind(card_id.to_string())
                .fetch_optional(&self.pool)
                .await?;

        let Some((path, branch_name)) = row else {
            return Ok(());
        };

        if Path::new(&path).exists() {
            let (ok, _, stderr) = self.run_git(&["worktree", "remove", &path, "--force"]).await?;
            if !ok {
                warn!(%stderr, "failed to remove worktree");
                return Err(OrchestratorError::WorktreeVcsFail(stderr));
            }
        }

        if delete_branch {
            let (ok, _, stderr) = self.run_git(&["branch", "-D", &branch_name]).await?;
            if !ok {
                warn!(%stderr, "failed to delete branch");
            }
        }

        sqlx::query("DELETE FROM worktrees WHERE card_id = ?")
            .bind(card_id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn active(&self) -> OrchestratorResult<Vec<Worktree>> {
        let rows: Vec<(String, String, String, String)> =
            sqlx::query_as("SELECT card_id, branch_name, path, base_branch FROM worktrees")
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter()
            .map(|(card_id, branch_name, path, base_branch)| {
                Ok(Worktree { card_id: crate::adapters::sqlite::parse_uuid(&card_id)?, branch_name, path, base_branch })
            })
            .collect()
    }

    async fn recover_state(&self) -> OrchestratorResult<()> {
        let merge_head = self.project_path.join(".git").join("MERGE_HEAD");
        if merge_head.exists() {
            self.run_git(&["merge", "--abort"]).await?;
        }

        let rebase_dir = self.project_path.join(".git").join("rebase-merge");
        if rebase_dir.exists() {
            self.run_git(&["rebase", "--abort"]).await?;
        }

        let known_to_git = self.git_known_paths().await?;
        let tracked = self.active().await?;
        for worktree in &tracked {
            let still_live = Path::new(&worktree.path).exists() && known_to_git.contains(&worktree.path);
            if !still_live {
                debug!(path = %worktree.path, "pruning stale worktree record");
                sqlx::query("DELETE FROM worktrees WHERE card_id = ?")
                    .bind(worktree.card_id.to_string())
                    .execute(&self.pool)
                    .await?;
            }
        }
        self.run_git(&["worktree", "prune"]).await?;

        Ok(())
    }

    async fn cleanup_orphans(&self, active_card_ids: &[Uuid]) -> OrchestratorResult<usize> {
        let active_set: HashSet<Uuid> = active_card_ids.iter().copied().collect();
        let tracked = self.active().await?;
        let mut removed = 0;
        for worktree in tracked {
            if !active_set.contains(&worktree.card_id) {
                debug!(card_id = %worktree.card_id, "removing orphaned worktree");
                self.remove(worktree.card_id, true).await?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worktree_path_uses_short_id() {
        let card_id = Uuid::new_v4();
        let short = GitWorktreeManager::short_id(card_id);
        let path = PathBuf::from(".worktrees").join(format!("card-{short}"));
        assert!(path.to_string_lossy().contains(&short));
    }
}
