//! Card domain model.
//!
//! A card is one unit of work that moves through the fixed SDLC column
//! graph `backlog -> plan -> implement -> test -> review -> done`, with
//! `cancelled` reachable from any column and `{completed, archived}`
//! reachable only from `done`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::errors::{OrchestratorError, OrchestratorResult};

/// A card's position in the software development life-cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Column {
    Backlog,
    Plan,
    Implement,
    Test,
    Review,
    Done,
    Completed,
    Archived,
    Cancelled,
}

impl Column {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Backlog => "backlog",
            Self::Plan => "plan",
            Self::Implement => "implement",
            Self::Test => "test",
            Self::Review => "review",
            Self::Done => "done",
            Self::Completed => "completed",
            Self::Archived => "archived",
            Self::Cancelled => "cancelled",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "backlog" => Some(Self::Backlog),
            "plan" => Some(Self::Plan),
            "implement" => Some(Self::Implement),
            "test" => Some(Self::Test),
            "review" => Some(Self::Review),
            "done" => Some(Self::Done),
            "completed" => Some(Self::Completed),
            "archived" => Some(Self::Archived),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Columns reachable in one transition from `self`.
    ///
    /// Mirrors the directed graph in the data model: the SDLC chain plus
    /// "any column -> cancelled" plus "done <-> archived".
    pub fn valid_transitions(self) -> &'static [Column] {
        match self {
            Self::Backlog => &[Self::Plan, Self::Cancelled],
            Self::Plan => &[Self::Implement, Self::Cancelled],
            Self::Implement => &[Self::Test, Self::Cancelled],
            Self::Test => &[Self::Review, Self::Cancelled],
            Self::Review => &[Self::Done, Self::Cancelled],
            Self::Done => &[Self::Completed, Self::Archived, Self::Cancelled],
            Self::Archived => &[Self::Done],
            Self::Completed => &[],
            Self::Cancelled => &[],
        }
    }

    pub fn can_transition_to(self, to: Column) -> bool {
        self.valid_transitions().contains(&to)
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Archived | Self::Cancelled)
    }

    /// Columns the `WorkflowEngine` is willing to dispatch work for:
    /// anything before `done` that isn't `cancelled`.
    pub const fn is_executable(self) -> bool {
        matches!(
            self,
            Self::Backlog | Self::Plan | Self::Implement | Self::Test | Self::Review
        )
    }
}

/// A unit of work executed end-to-end through the SDLC.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Card {
    pub id: Uuid,
    pub goal_id: Uuid,
    pub title: String,
    pub description: String,
    pub column: Column,
    pub spec_path: Option<String>,
    pub model_plan: String,
    pub model_implement: String,
    pub model_test: String,
    pub model_review: String,
    pub parent_card_id: Option<Uuid>,
    pub is_fix_card: bool,
    pub test_error_context: Option<String>,
    pub branch_name: Option<String>,
    pub worktree_path: Option<String>,
    pub base_branch: Option<String>,
    pub dependencies: Vec<Uuid>,
    pub diff_stats: Option<serde_json::Value>,
    pub archived: bool,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub version: i64,
}

impl Card {
    /// Construct a new card in `backlog`, inheriting model selection from
    /// a default profile (callers typically overwrite `model_*` with the
    /// goal's configured per-stage profiles).
    pub fn new(goal_id: Uuid, title: impl Into<String>, description: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            goal_id,
            title: title.into(),
            description: description.into(),
            column: Column::Backlog,
            spec_path: None,
            model_plan: "sonnet-default".to_string(),
            model_implement: "sonnet-default".to_string(),
            model_test: "sonnet-default".to_string(),
            model_review: "sonnet-default".to_string(),
            parent_card_id: None,
            is_fix_card: false,
            test_error_context: None,
            branch_name: None,
            worktree_path: None,
            base_branch: None,
            dependencies: Vec::new(),
            diff_stats: None,
            archived: false,
            created_at: now,
            completed_at: None,
            version: 1,
        }
    }

    /// Build a fix-card for `parent`, inheriting its model selection.
    pub fn new_fix_card(
        parent: &Card,
        description: impl Into<String>,
        test_error_context: Option<String>,
    ) -> Self {
        let mut card = Self::new(parent.goal_id, format!("Fix: {}", parent.title), description);
        card.parent_card_id = Some(parent.id);
        card.is_fix_card = true;
        card.test_error_context = test_error_context;
        card.model_plan = parent.model_plan.clone();
        card.model_implement = parent.model_implement.clone();
        card.model_test = parent.model_test.clone();
        card.model_review = parent.model_review.clone();
        card
    }

    /// Validate and apply a column transition, stamping `completed_at` the
    /// first time the card enters `done`. Does not persist — callers go
    /// through `CardRepository::move_column` for the durable, serialized
    /// version of this check.
    pub fn transition_to(&mut self, to: Column) -> OrchestratorResult<()> {
        if !self.column.can_transition_to(to) {
            return Err(OrchestratorError::InvalidTransition {
                from: self.column.as_str().to_string(),
                to: to.as_str().to_string(),
                allowed: self
                    .column
                    .valid_transitions()
                    .iter()
                    .map(|c| c.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
            });
        }
        self.column = to;
        if to == Column::Done && self.completed_at.is_none() {
            self.completed_at = Some(Utc::now());
        }
        self.version += 1;
        Ok(())
    }

    /// Whether every dependency id is `done` (or further along), per the
    /// dependency-gating invariant.
    pub fn dependencies_satisfied(&self, resolved: &[(Uuid, Column)]) -> bool {
        self.dependencies.iter().all(|dep| {
            resolved
                .iter()
                .any(|(id, col)| id == dep && matches!(col, Column::Done | Column::Completed))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card() -> Card {
        Card::new(Uuid::new_v4(), "Add healthz", "return 200")
    }

    #[test]
    fn sdlc_happy_path_transitions() {
        let mut c = card();
        for to in [
            Column::Plan,
            Column::Implement,
            Column::Test,
            Column::Review,
            Column::Done,
        ] {
            c.transition_to(to).unwrap();
        }
        assert_eq!(c.column, Column::Done);
        assert!(c.completed_at.is_some());
    }

    #[test]
    fn illegal_transition_is_rejected() {
        let mut c = card();
        let err = c.transition_to(Column::Review).unwrap_err();
        match err {
            OrchestratorError::InvalidTransition { from, to, .. } => {
                assert_eq!(from, "backlog");
                assert_eq!(to, "review");
            }
            _ => panic!("wrong error variant"),
        }
        // column is unchanged on a rejected transition
        assert_eq!(c.column, Column::Backlog);
    }

    #[test]
    fn any_column_can_cancel() {
        for col in [
            Column::Backlog,
            Column::Plan,
            Column::Implement,
            Column::Test,
            Column::Review,
            Column::Done,
        ] {
            assert!(col.can_transition_to(Column::Cancelled));
        }
    }

    #[test]
    fn done_and_archived_is_bidirectional() {
        assert!(Column::Done.can_transition_to(Column::Archived));
        assert!(Column::Archived.can_transition_to(Column::Done));
    }

    #[test]
    fn terminal_columns_have_no_outgoing_edges() {
        assert!(Column::Completed.valid_transitions().is_empty());
        assert!(Column::Cancelled.valid_transitions().is_empty());
    }

    #[test]
    fn completed_at_is_stamped_exactly_once() {
        let mut c = card();
        c.column = Column::Review;
        c.transition_to(Column::Done).unwrap();
        let first_stamp = c.completed_at;
        // re-entering done via archived/done round trip should not clobber it
        c.transition_to(Column::Archived).unwrap();
        c.transition_to(Column::Done).unwrap();
        assert_eq!(c.completed_at, first_stamp);
    }

    #[test]
    fn fix_card_inherits_parent_identity_and_models() {
        let mut parent = card();
        parent.model_plan = "opus-4".to_string();
        let fix = Card::new_fix_card(&parent, "assertion error in test_foo", None);
        assert_eq!(fix.parent_card_id, Some(parent.id));
        assert!(fix.is_fix_card);
        assert_eq!(fix.model_plan, "opus-4");
        assert_eq!(fix.column, Column::Backlog);
    }

    #[test]
    fn dependencies_satisfied_requires_all_done() {
        let mut c = card();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        c.dependencies = vec![a, b];
        assert!(!c.dependencies_satisfied(&[(a, Column::Done)]));
        assert!(c.dependencies_satisfied(&[(a, Column::Done), (b, Column::Completed)]));
        assert!(!c.dependencies_satisfied(&[(a, Column::Test), (b, Column::Done)]));
    }
}
