//! Card repository port.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::OrchestratorResult;
use crate::domain::models::{Card, Column};

/// Filter criteria for listing cards.
#[derive(Debug, Clone, Default)]
pub struct CardFilter {
    pub goal_id: Option<Uuid>,
    pub column: Option<Column>,
    pub is_fix_card: Option<bool>,
    pub parent_card_id: Option<Uuid>,
}

/// Repository interface for `Card` persistence.
#[async_trait]
pub trait CardRepository: Send + Sync {
    /// Create a new card.
    async fn create(&self, card: &Card) -> OrchestratorResult<()>;

    /// Get a card by id.
    async fn get(&self, id: Uuid) -> OrchestratorResult<Option<Card>>;

    /// Replace a card, enforcing the optimistic-concurrency `version` check.
    async fn update(&self, card: &Card) -> OrchestratorResult<()>;

    /// Validate and persist a column transition atomically, returning the
    /// updated card. Returns `InvalidTransition` or `StoreConflict`.
    async fn move_column(&self, id: Uuid, to: Column) -> OrchestratorResult<Card>;

    /// List cards matching the filter.
    async fn list(&self, filter: CardFilter) -> OrchestratorResult<Vec<Card>>;

    /// All cards belonging to a goal.
    async fn list_by_goal(&self, goal_id: Uuid) -> OrchestratorResult<Vec<Card>>;

    /// Cards in an executable column whose dependencies already resolved,
    /// ordered oldest-created first — THINK's candidate pool for
    /// `ExecuteCard`/`ExecuteCardsParallel`.
    async fn list_ready(&self, goal_id: Uuid) -> OrchestratorResult<Vec<Card>>;

    /// Fix-cards spawned from a given parent card.
    async fn list_fix_cards(&self, parent_card_id: Uuid) -> OrchestratorResult<Vec<Card>>;

    /// The parent's currently active (non-terminal) fix-card, if any.
    async fn get_active_fix_card(&self, parent_card_id: Uuid) -> OrchestratorResult<Option<Card>> {
        Ok(self.list_fix_cards(parent_card_id).await?.into_iter().find(|c| c.column.is_executable()))
    }

    /// Idempotently spawn (or return the existing) fix-card for `parent_id`:
    /// returns the active fix-card if one already exists, otherwise creates
    /// one inheriting the parent's model selection and persists `context`
    /// onto both the new fix-card and the parent (so
    /// `cards_awaiting_fix`-style gates can see it on the parent too).
    async fn create_fix_card(
        &self,
        parent_id: Uuid,
        description: String,
        context: Option<String>,
    ) -> OrchestratorResult<Card> {
        if let Some(existing) = self.get_active_fix_card(parent_id).await? {
            return Ok(existing);
        }

        let mut parent = self
            .get(parent_id)
            .await?
            .ok_or_else(|| crate::domain::errors::OrchestratorError::NotFound {
                entity: "card".to_string(),
                id: parent_id.to_string(),
            })?;

        let fix = Card::new_fix_card(&parent, description, context.clone());
        self.create(&fix).await?;

        if context.is_some() && parent.test_error_context != context {
            parent.test_error_context = context;
            self.update(&parent).await?;
        }

        Ok(fix)
    }
}
