//! Goal domain model.
//!
//! A goal is a user intent, decomposed by the orchestrator into one or more
//! cards. Unlike the donor system's convergent goals, a goal here is a
//! one-shot unit of work: it is born `PENDING`, is promoted to `ACTIVE`
//! when picked up by the loop, and ends in `COMPLETED` or `FAILED`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::errors::{OrchestratorError, OrchestratorResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalStatus {
    Pending,
    Active,
    Completed,
    Failed,
}

impl Default for GoalStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl GoalStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "active" => Some(Self::Active),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// A goal in `Completed`/`Failed` never changes status again.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub const fn can_transition_to(self, to: Self) -> bool {
        matches!(
            (self, to),
            (Self::Pending, Self::Active)
                | (Self::Active, Self::Completed)
                | (Self::Active, Self::Failed)
        )
    }
}

/// Provenance of a goal: where it was submitted from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoalSource {
    pub source: String,
    pub source_id: String,
}

/// A user intent decomposed into a dependency graph of cards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Goal {
    pub id: Uuid,
    pub description: String,
    pub status: GoalStatus,
    pub source: GoalSource,
    pub card_ids: Vec<Uuid>,
    pub learning_text: Option<String>,
    pub learning_id: Option<Uuid>,
    pub total_tokens: i64,
    pub total_cost: f64,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub version: i64,
}

impl Goal {
    pub fn new(description: impl Into<String>, source: GoalSource) -> Self {
        Self {
            id: Uuid::new_v4(),
            description: description.into(),
            status: GoalStatus::Pending,
            source,
            card_ids: Vec::new(),
            learning_text: None,
            learning_id: None,
            total_tokens: 0,
            total_cost: 0.0,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            version: 1,
        }
    }

    pub fn transition_to(&mut self, to: GoalStatus) -> OrchestratorResult<()> {
        if !self.status.can_transition_to(to) {
            return Err(OrchestratorError::InvalidTransition {
                from: self.status.as_str().to_string(),
                to: to.as_str().to_string(),
                allowed: "see GoalStatus::can_transition_to".to_string(),
            });
        }
        self.status = to;
        match to {
            GoalStatus::Active => self.started_at = Some(Utc::now()),
            GoalStatus::Completed | GoalStatus::Failed => {
                self.completed_at = Some(Utc::now());
            }
            GoalStatus::Pending => {}
        }
        self.version += 1;
        Ok(())
    }

    /// Append a card id. `card_ids` is monotonic: cards are only appended,
    /// never removed.
    pub fn add_card(&mut self, card_id: Uuid) {
        self.card_ids.push(card_id);
    }

    pub fn record_learning(&mut self, learning_id: Uuid, learning_text: impl Into<String>) {
        self.learning_id = Some(learning_id);
        self.learning_text = Some(learning_text.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> GoalSource {
        GoalSource {
            source: "cli".to_string(),
            source_id: "local".to_string(),
        }
    }

    #[test]
    fn goal_starts_pending() {
        let g = Goal::new("add healthz", source());
        assert_eq!(g.status, GoalStatus::Pending);
        assert!(g.card_ids.is_empty());
    }

    #[test]
    fn terminal_goal_never_transitions_again() {
        let mut g = Goal::new("x", source());
        g.transition_to(GoalStatus::Active).unwrap();
        g.transition_to(GoalStatus::Completed).unwrap();
        assert!(g.status.is_terminal());
        assert!(g.transition_to(GoalStatus::Failed).is_err());
        assert!(g.transition_to(GoalStatus::Active).is_err());
    }

    #[test]
    fn card_ids_is_append_only() {
        let mut g = Goal::new("x", source());
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        g.add_card(a);
        g.add_card(b);
        assert_eq!(g.card_ids, vec![a, b]);
    }
}
