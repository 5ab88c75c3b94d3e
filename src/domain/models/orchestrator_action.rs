//! OrchestratorAction / OrchestratorLog domain models.
//!
//! Every tick's THINK phase produces exactly one `Decision`; ACT executes
//! it; RECORD persists it as an `OrchestratorLog` row. These rows are the
//! audit trail an operator reads to answer "why did the loop do that".

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The mutually exclusive outcomes of THINK, in the priority order the
/// loop evaluates them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Decision {
    /// Budget is unsafe; do nothing this tick.
    Wait { reason: String },
    /// Split a pending goal into cards.
    Decompose { goal_id: Uuid },
    /// Spawn a fix-card for a card whose test stage failed.
    CreateFix { parent_card_id: Uuid },
    /// Drive one executable, dependency-satisfied card forward one stage.
    ExecuteCard { card_id: Uuid },
    /// Drive several independent cards forward concurrently.
    ExecuteCardsParallel { card_ids: Vec<Uuid> },
    /// All of a goal's cards reached a terminal column; finalize the goal.
    CompleteGoal { goal_id: Uuid },
    /// Promote the oldest `PENDING` goal to `ACTIVE`.
    PromotePendingGoal { goal_id: Uuid },
}

impl Decision {
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Wait { .. } => "wait",
            Self::Decompose { .. } => "decompose",
            Self::CreateFix { .. } => "create_fix",
            Self::ExecuteCard { .. } => "execute_card",
            Self::ExecuteCardsParallel { .. } => "execute_cards_parallel",
            Self::CompleteGoal { .. } => "complete_goal",
            Self::PromotePendingGoal { .. } => "promote_pending_goal",
        }
    }
}

/// One tick's audit record: the decision THINK made and the result ACT
/// produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorAction {
    pub id: Uuid,
    pub tick: i64,
    pub decision: Decision,
    pub outcome: Option<String>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl OrchestratorAction {
    pub fn new(tick: i64, decision: Decision) -> Self {
        Self {
            id: Uuid::new_v4(),
            tick,
            decision,
            outcome: None,
            error: None,
            created_at: Utc::now(),
        }
    }

    pub fn succeeded(mut self, outcome: impl Into<String>) -> Self {
        self.outcome = Some(outcome.into());
        self
    }

    pub fn failed(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// A free-text line appended to the orchestrator's rolling log file, kept
/// in the store too so the HTTP API can serve it without tailing a file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorLog {
    pub id: Uuid,
    pub tick: i64,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

impl OrchestratorLog {
    pub fn new(tick: i64, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tick,
            message: message.into(),
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decision_kind_matches_variant() {
        assert_eq!(Decision::Wait { reason: "budget".into() }.kind(), "wait");
        assert_eq!(
            Decision::ExecuteCard { card_id: Uuid::nil() }.kind(),
            "execute_card"
        );
    }

    #[test]
    fn action_records_success_then_failure_are_mutually_exclusive_in_practice() {
        let action = OrchestratorAction::new(1, Decision::Wait { reason: "budget".into() })
            .succeeded("no-op");
        assert_eq!(action.outcome.as_deref(), Some("no-op"));
        assert!(action.error.is_none());
    }
}
