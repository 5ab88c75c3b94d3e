//! Learning domain model.
//!
//! A Learning is the LEARN phase's distillation of one completed goal into
//! a short text blob embedded and stored in `LongTermMemory` for later
//! retrieval during QUERY.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LearningOutcome {
    Success,
    Partial,
    Failed,
}

impl LearningOutcome {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Partial => "partial",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Learning {
    pub id: Uuid,
    pub goal_id: Uuid,
    pub outcome: LearningOutcome,
    pub text: String,
    /// Embedding dimensionality is owned by the adapter; the domain model
    /// only carries the vector once computed, never the model id.
    pub embedding: Option<Vec<f32>>,
    pub created_at: DateTime<Utc>,
}

impl Learning {
    pub fn new(goal_id: Uuid, outcome: LearningOutcome, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            goal_id,
            outcome,
            text: text.into(),
            embedding: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn learning_starts_without_embedding() {
        let l = Learning::new(Uuid::new_v4(), LearningOutcome::Success, "retried build twice");
        assert!(l.embedding.is_none());
        assert_eq!(l.outcome.as_str(), "success");
    }

    #[test]
    fn with_embedding_attaches_vector() {
        let l = Learning::new(Uuid::new_v4(), LearningOutcome::Partial, "flaky test")
            .with_embedding(vec![0.1, 0.2, 0.3]);
        assert_eq!(l.embedding.unwrap().len(), 3);
    }
}
