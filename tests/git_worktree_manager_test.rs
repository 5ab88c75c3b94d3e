//! `GitWorktreeManager` against a real, throwaway git repository — the
//! one port where an in-memory mock would exercise nothing, since the
//! whole point is shelling out to the real `git worktree` machinery.

use std::process::Command;

use cardforge::adapters::sqlite::create_migrated_test_pool;
use cardforge::adapters::git::GitWorktreeManager;
use cardforge::domain::ports::WorktreeManager;
use tempfile::TempDir;
use uuid::Uuid;

fn init_repo() -> TempDir {
    let dir = TempDir::new().expect("tempdir");
    let run = |args: &[&str]| {
        let status = Command::new("git").args(args).current_dir(dir.path()).status().expect("git invocation");
        assert!(status.success(), "git {args:?} failed");
    };
    run(&["init", "--initial-branch=main"]);
    run(&["config", "user.email", "test@cardforge.local"]);
    run(&["config", "user.name", "cardforge tests"]);
    std::fs::write(dir.path().join("README.md"), "cardforge test repo\n").unwrap();
    run(&["add", "."]);
    run(&["commit", "-m", "initial commit"]);
    dir
}

#[tokio::test]
async fn create_then_remove_round_trips_a_worktree() {
    let repo = init_repo();
    let pool = create_migrated_test_pool().await.unwrap();
    let manager = GitWorktreeManager::new(repo.path(), ".worktrees", 4, pool);

    let card_id = Uuid::new_v4();
    let worktree = manager.create(card_id).await.unwrap();
    assert_eq!(worktree.base_branch, "main");
    assert!(worktree.branch_name.starts_with("agent/"));
    assert!(std::path::Path::new(&worktree.path).is_dir());

    let active = manager.active().await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].card_id, card_id);

    manager.remove(card_id, true).await.unwrap();
    assert!(!std::path::Path::new(&worktree.path).exists());
    assert!(manager.active().await.unwrap().is_empty());
}

#[tokio::test]
async fn create_fails_past_the_concurrent_worktree_limit() {
    let repo = init_repo();
    let pool = create_migrated_test_pool().await.unwrap();
    let manager = GitWorktreeManager::new(repo.path(), ".worktrees", 1, pool);

    manager.create(Uuid::new_v4()).await.unwrap();
    let err = manager.create(Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(err, cardforge::domain::errors::OrchestratorError::WorktreeLimit { .. }));
}

#[tokio::test]
async fn recover_state_prunes_records_for_deleted_directories() {
    let repo = init_repo();
    let pool = create_migrated_test_pool().await.unwrap();
    let manager = GitWorktreeManager::new(repo.path(), ".worktrees", 4, pool);

    let card_id = Uuid::new_v4();
    let worktree = manager.create(card_id).await.unwrap();
    std::fs::remove_dir_all(&worktree.path).unwrap();

    manager.recover_state().await.unwrap();
    assert!(manager.active().await.unwrap().is_empty());
}
