//! WorktreeManager port: git worktree lifecycle for isolating a card's work.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::OrchestratorResult;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Worktree {
    pub card_id: Uuid,
    pub branch_name: String,
    pub path: String,
    pub base_branch: String,
}

#[async_trait]
pub trait WorktreeManager: Send + Sync {
    /// Create an isolated worktree for `card_id` on a new branch named
    /// `agent/<short-id>-<timestamp>`, branched from `base_branch` if given,
    /// else the repository's default branch. Returns `WorktreeLimit` if the
    /// concurrent-worktree budget is exhausted, `WorktreeVCSFail` if the
    /// underlying git commands fail. If the host repository isn't under
    /// version control, degrades to returning the project root unmodified
    /// with `branch_name = "none"`.
    async fn create(&self, card_id: Uuid, base_branch: Option<String>) -> OrchestratorResult<Worktree>;

    /// Remove a worktree and, if `delete_branch` is set, its branch.
    async fn remove(&self, card_id: Uuid, delete_branch: bool) -> OrchestratorResult<()>;

    /// Currently tracked worktrees.
    async fn active(&self) -> OrchestratorResult<Vec<Worktree>>;

    /// Reconcile in-memory/DB worktree state against what `git worktree
    /// list` actually reports, pruning entries for directories that no
    /// longer exist. Called once at startup.
    async fn recover_state(&self) -> OrchestratorResult<()>;

    /// Remove every tracked worktree whose card is no longer in
    /// `active_card_ids` — orphans left behind by a crash or a manually
    /// cancelled goal. Returns the number removed.
    async fn cleanup_orphans(&self, active_card_ids: &[Uuid]) -> OrchestratorResult<usize>;
}
