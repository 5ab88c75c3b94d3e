//! Domain error taxonomy for the orchestrator.
//!
//! Each variant is a stable identifier (not a string fragment) so callers —
//! the HTTP layer, the orchestrator loop, tests — can match on error kind
//! rather than parse messages.

use thiserror::Error;
use uuid::Uuid;

/// Errors raised by the core orchestrator subsystems.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// `CardStore.move` would violate the column transition graph.
    #[error("Invalid transition from '{from}' to '{to}'. Allowed: [{allowed}]")]
    InvalidTransition {
        from: String,
        to: String,
        allowed: String,
    },

    /// A stage requires `spec_path` but the card has none.
    #[error("Card {0} has no spec_path; cannot run this stage")]
    MissingSpec(Uuid),

    /// The concurrent-worktree budget is exhausted.
    #[error("Worktree budget exhausted: {active}/{max} agent-prefixed worktrees active")]
    WorktreeLimit { active: usize, max: usize },

    /// The underlying VCS command failed.
    #[error("Worktree VCS command failed: {0}")]
    WorktreeVcsFail(String),

    /// Session or daily usage is at or above the configured threshold.
    #[error("Usage budget exceeded: session={session_pct:.1}% daily={daily_pct:.1}%")]
    BudgetExceeded { session_pct: f64, daily_pct: f64 },

    /// The agent back-end emitted an `Error` event or timed out.
    #[error("Agent error: {0}")]
    AgentError(String),

    /// The test stage's heuristic detected a failing test run.
    #[error("Test failure detected for card {0}")]
    TestFailure(Uuid),

    /// A cancellation signal interrupted an in-flight stage.
    #[error("Cancelled: {0}")]
    CancelledByClient(String),

    /// A concurrent write to the same row lost the optimistic-lock race.
    #[error("Store conflict on {entity} {id}")]
    StoreConflict { entity: String, id: String },

    /// Entity not found.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Anything below the stable taxonomy — infrastructure failures that
    /// don't need a stable identifier at the API boundary.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl OrchestratorError {
    /// Whether this error should be retried exactly once transparently
    /// (§7 Recovery policy: only `StoreConflict` is retried).
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreConflict { .. })
    }

    /// Stable string identifier used in HTTP error envelopes and logs.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::InvalidTransition { .. } => "InvalidTransition",
            Self::MissingSpec(_) => "MissingSpec",
            Self::WorktreeLimit { .. } => "WorktreeLimit",
            Self::WorktreeVcsFail(_) => "WorktreeVCSFail",
            Self::BudgetExceeded { .. } => "BudgetExceeded",
            Self::AgentError(_) => "AgentError",
            Self::TestFailure(_) => "TestFailure",
            Self::CancelledByClient(_) => "CancelledByClient",
            Self::StoreConflict { .. } => "StoreConflict",
            Self::NotFound { .. } => "NotFound",
            Self::Internal(_) => "Internal",
        }
    }
}

impl From<sqlx::Error> for OrchestratorError {
    fn from(err: sqlx::Error) -> Self {
        Self::Internal(anyhow::anyhow!(err))
    }
}

impl From<serde_json::Error> for OrchestratorError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(anyhow::anyhow!(err))
    }
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_transition_message() {
        let err = OrchestratorError::InvalidTransition {
            from: "backlog".into(),
            to: "review".into(),
            allowed: "plan".into(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid transition from 'backlog' to 'review'. Allowed: [plan]"
        );
        assert_eq!(err.kind(), "InvalidTransition");
    }

    #[test]
    fn only_store_conflict_is_retryable() {
        assert!(OrchestratorError::StoreConflict {
            entity: "card".into(),
            id: "1".into()
        }
        .is_retryable());
        assert!(!OrchestratorError::MissingSpec(Uuid::nil()).is_retryable());
    }
}
