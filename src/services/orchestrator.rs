//! The Orchestrator Loop: one tick = READ, QUERY, THINK, ACT, RECORD, LEARN.
//!
//! THINK is kept as a standalone, synchronous, pure function (`think`) over
//! a plain `ThinkInput` snapshot so it can be unit tested without touching
//! any store — the loop itself (`Orchestrator::tick`) is the only place
//! that performs I/O, mirroring the teacher's separation between a
//! deterministic engine (`WorkflowEngine`) and the service that drives it
//! with real repositories.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::domain::errors::OrchestratorResult;
use crate::domain::models::{
    Card, Column, Decision, Goal, GoalStatus, Learning, LearningOutcome, OrchestratorAction,
    OrchestratorLog,
};
use crate::domain::ports::{
    BudgetSnapshot, CardRepository, GoalRepository, LearningMatch, LongTermMemory, MemoryContext,
    MemoryEntry, OrchestratorLogRepository, ShortTermMemory, UsageBudget, WorktreeManager,
};
use crate::services::decomposer::Decomposer;
use crate::services::event_bus::{EventBus, OrchestratorEvent};
use crate::services::workflow_engine::{WorkflowEngine, WorkflowOutcome};

/// The frozen snapshot THINK decides over. Everything here was gathered
/// during READ/QUERY; THINK itself never touches a store.
#[derive(Debug, Clone)]
pub struct ThinkInput {
    pub context: MemoryContext,
    pub learnings: Vec<LearningMatch>,
    pub budget: BudgetSnapshot,
    pub block_pct: f64,
    pub active_goal: Option<Goal>,
    pub active_goal_cards: Vec<Card>,
    pub cards_awaiting_fix: Vec<Uuid>,
    pub ready_card_ids: Vec<Uuid>,
    pub worktrees_active: usize,
    pub worktrees_max: usize,
    pub oldest_pending_goal: Option<Goal>,
}

/// Pure decision function: priority order from spec §4.7 THINK, first match
/// wins. No I/O, no side effects, fully reproducible from `input`.
pub fn think(input: &ThinkInput) -> Decision {
    if input.budget.is_blocked(input.block_pct) {
        return Decision::Wait {
            reason: format!(
                "usage budget blocked: session={:.1}% daily={:.1}%",
                input.budget.session_pct, input.budget.daily_pct
            ),
        };
    }

    if let Some(goal) = &input.active_goal {
        if input.active_goal_cards.is_empty() {
            return Decision::Decompose { goal_id: goal.id };
        }

        if let Some(&parent_card_id) = input.cards_awaiting_fix.first() {
            return Decision::CreateFix { parent_card_id };
        }

        if !input.ready_card_ids.is_empty() {
            if input.worktrees_active >= input.worktrees_max {
                return Decision::Wait { reason: "worktree budget exhausted".to_string() };
            }
            return if input.ready_card_ids.len() > 1 {
                Decision::ExecuteCardsParallel { card_ids: input.ready_card_ids.clone() }
            } else {
                Decision::ExecuteCard { card_id: input.ready_card_ids[0] }
            };
        }

        if input
            .active_goal_cards
            .iter()
            .all(|c| matches!(c.column, Column::Done | Column::Completed))
        {
            return Decision::CompleteGoal { goal_id: goal.id };
        }

        return Decision::Wait { reason: "active goal has no eligible work this tick".to_string() };
    }

    if let Some(goal) = &input.oldest_pending_goal {
        return Decision::PromotePendingGoal { goal_id: goal.id };
    }

    Decision::Wait { reason: "no active or pending goal".to_string() }
}

pub struct Orchestrator {
    goals: Arc<dyn GoalRepository>,
    cards: Arc<dyn CardRepository>,
    logs: Arc<dyn OrchestratorLogRepository>,
    short_term: Arc<dyn ShortTermMemory>,
    long_term: Arc<dyn LongTermMemory>,
    budget: Arc<dyn UsageBudget>,
    worktrees: Arc<dyn WorktreeManager>,
    event_bus: Arc<EventBus>,
    workflow: Arc<WorkflowEngine>,
    decomposer: Arc<Decomposer>,
    block_pct: f64,
    worktrees_max: usize,
    long_term_query_threshold: f32,
    tick: AtomicI64,
    single_flight: Mutex<()>,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        goals: Arc<dyn GoalRepository>,
        cards: Arc<dyn CardRepository>,
        logs: Arc<dyn OrchestratorLogRepository>,
        short_term: Arc<dyn ShortTermMemory>,
        long_term: Arc<dyn LongTermMemory>,
        budget: Arc<dyn UsageBudget>,
        worktrees: Arc<dyn WorktreeManager>,
        event_bus: Arc<EventBus>,
        workflow: Arc<WorkflowEngine>,
        decomposer: Arc<Decomposer>,
        block_pct: f64,
        worktrees_max: usize,
        long_term_query_threshold: f32,
        starting_tick: i64,
    ) -> Self {
        Self {
            goals,
            cards,
            logs,
            short_term,
            long_term,
            budget,
            worktrees,
            event_bus,
            workflow,
            decomposer,
            block_pct,
            worktrees_max,
            long_term_query_threshold,
            tick: AtomicI64::new(starting_tick),
            single_flight: Mutex::new(()),
        }
    }

    /// Run exactly one tick. A lock is held for the whole tick so callers
    /// (the loop timer and any out-of-band "run a tick" CLI command) never
    /// overlap.
    #[instrument(skip(self))]
    pub async fn tick(&self) -> OrchestratorResult<OrchestratorAction> {
        let _guard = self.single_flight.lock().await;
        let tick = self.tick.fetch_add(1, Ordering::SeqCst);

        // READ
        self.short_term.cleanup_expired().await?;

        let active_goals = self.goals.list_active().await?;
        let active_goal = active_goals.into_iter().next();

        let (active_goal_cards, cards_awaiting_fix, ready_card_ids) = match &active_goal {
            Some(goal) => {
                let cards = self.cards.list_by_goal(goal.id).await?;
                let awaiting_fix = self.cards_awaiting_fix(&cards).await?;
                let ready = self.cards.list_ready(goal.id).await?.into_iter().map(|c| c.id).collect();
                (cards, awaiting_fix, ready)
            }
            None => (Vec::new(), Vec::new(), Vec::new()),
        };

        let pending_goal_count = self.goals.list_by_status(GoalStatus::Pending).await?.len();
        let context = self.short_term.context_summary(active_goal.as_ref().map(|g| g.id), pending_goal_count).await?;

        // QUERY
        let learnings: Vec<LearningMatch> = match &active_goal {
            Some(goal) => self
                .long_term
                .query(&goal.description, 3, self.long_term_query_threshold, None)
                .await
                .unwrap_or_default(),
            None => Vec::new(),
        };

        let budget = self.budget.snapshot().await?;
        let worktrees_active = self.worktrees.active().await?.len();
        let oldest_pending_goal = self.goals.oldest_pending().await?;

        let input = ThinkInput {
            context,
            learnings,
            budget,
            block_pct: self.block_pct,
            active_goal: active_goal.clone(),
            active_goal_cards,
            cards_awaiting_fix,
            ready_card_ids,
            worktrees_active,
            worktrees_max: self.worktrees_max,
            oldest_pending_goal,
        };

        // THINK
        let decision = think(&input);
        self.event_bus.publish(OrchestratorEvent::TickDecided {
            tick,
            decision: decision.clone(),
            at: chrono::Utc::now(),
        });

        // ACT
        let mut action = OrchestratorAction::new(tick, decision.clone());
        let mut completed_goal: Option<Goal> = None;

        match self.act(decision).await {
            Ok((outcome, goal)) => {
                action = action.succeeded(outcome);
                completed_goal = goal;
            }
            Err(err) => {
                warn!(%tick, error = %err, "tick ACT phase failed");
                action = action.failed(err.to_string());
            }
        }

        // RECORD
        self.logs.record_action(&action).await?;
        let log = OrchestratorLog::new(tick, action.outcome.clone().or_else(|| action.error.clone()).unwrap_or_default());
        self.logs.record_log(&log).await?;
        self.short_term
            .append(MemoryEntry { tick, summary: log.message.clone(), created_at: log.created_at })
            .await?;

        // LEARN
        if let Some(goal) = completed_goal {
            self.learn(goal).await?;
        }

        info!(%tick, decision = %action.decision.kind(), "tick complete");
        Ok(action)
    }

    async fn cards_awaiting_fix(&self, cards: &[Card]) -> OrchestratorResult<Vec<Uuid>> {
        let mut result = Vec::new();
        for card in cards.iter().filter(|c| c.column == Column::Test) {
            let fix_cards = self.cards.list_fix_cards(card.id).await?;
            let has_active_fix = fix_cards.iter().any(|f| f.column.is_executable());
            let has_test_error = card.test_error_context.is_some();
            if has_test_error && !has_active_fix {
                result.push(card.id);
            }
        }
        Ok(result)
    }

    /// Dispatch the THINK decision. Returns a human-readable outcome string
    /// plus the completed `Goal`, if this call finalized one (LEARN reads
    /// that back).
    async fn act(&self, decision: Decision) -> OrchestratorResult<(String, Option<Goal>)> {
        match decision {
            Decision::Wait { reason } => Ok((format!("waited: {reason}"), None)),

            Decision::Decompose { goal_id } => {
                let mut goal = self.require_goal(goal_id).await?;
                let cards = self.decomposer.decompose(&goal).await?;
                let count = cards.len();
                for card in &cards {
                    self.cards.create(card).await?;
                    goal.add_card(card.id);
                }
                self.goals.update(&goal).await?;
                Ok((format!("decomposed goal {goal_id} into {count} cards"), None))
            }

            Decision::CreateFix { parent_card_id } => {
                let already_active = self.cards.get_active_fix_card(parent_card_id).await?.is_some();
                let parent = self.cards.get(parent_card_id).await?.ok_or_else(|| {
                    crate::domain::errors::OrchestratorError::NotFound {
                        entity: "card".to_string(),
                        id: parent_card_id.to_string(),
                    }
                })?;
                let fix = self
                    .cards
                    .create_fix_card(parent_card_id, "Fix failing test".to_string(), parent.test_error_context.clone())
                    .await?;
                if !already_active {
                    let mut goal = self.require_goal(parent.goal_id).await?;
                    goal.add_card(fix.id);
                    self.goals.update(&goal).await?;
                }
                Ok((format!("fix-card {} active for card {parent_card_id}", fix.id), None))
            }

            Decision::ExecuteCard { card_id } => {
                let outcome = self.workflow.run(card_id).await?;
                self.settle_workflow_outcome(card_id, &outcome).await?;
                Ok((format!("card {card_id}: {}", describe_outcome(&outcome)), None))
            }

            Decision::ExecuteCardsParallel { card_ids } => {
                let results = join_all(card_ids.iter().map(|&id| self.workflow.run(id))).await;
                let mut summaries = Vec::new();
                for (id, result) in card_ids.iter().zip(results) {
                    match result {
                        Ok(outcome) => {
                            self.settle_workflow_outcome(*id, &outcome).await?;
                            summaries.push(format!("{id}: {}", describe_outcome(&outcome)));
                        }
                        Err(err) => summaries.push(format!("{id}: error {err}")),
                    }
                }
                Ok((format!("parallel execution: [{}]", summaries.join(", ")), None))
            }

            Decision::CompleteGoal { goal_id } => {
                let mut goal = self.require_goal(goal_id).await?;
                goal.transition_to(GoalStatus::Completed)?;
                self.goals.update(&goal).await?;
                self.event_bus.publish(OrchestratorEvent::GoalCompleted { goal_id, at: chrono::Utc::now() });
                Ok((format!("goal {goal_id} completed"), Some(goal)))
            }

            Decision::PromotePendingGoal { goal_id } => {
                let mut goal = self.require_goal(goal_id).await?;
                goal.transition_to(GoalStatus::Active)?;
                self.goals.update(&goal).await?;
                Ok((format!("promoted goal {goal_id} to active"), None))
            }
        }
    }

    async fn settle_workflow_outcome(&self, card_id: Uuid, outcome: &WorkflowOutcome) -> OrchestratorResult<()> {
        if let WorkflowOutcome::Completed { usage, cost } = outcome {
            self.budget.record_spend(usage.total_tokens, *cost).await?;
            if let Some(card) = self.cards.get(card_id).await? {
                let mut goal = self.require_goal(card.goal_id).await?;
                goal.total_tokens += usage.total_tokens;
                goal.total_cost += cost;
                self.goals.update(&goal).await?;
            }
        }
        Ok(())
    }

    async fn require_goal(&self, goal_id: Uuid) -> OrchestratorResult<Goal> {
        self.goals
            .get(goal_id)
            .await?
            .ok_or_else(|| crate::domain::errors::OrchestratorError::NotFound { entity: "goal".to_string(), id: goal_id.to_string() })
    }

    async fn learn(&self, goal: Goal) -> OrchestratorResult<()> {
        let outcome = if goal.error.is_some() { LearningOutcome::Failed } else { LearningOutcome::Success };
        let text = format!(
            "Goal '{}' finished with {} cards, outcome={:?}, tokens={}, cost=${:.2}",
            goal.description,
            goal.card_ids.len(),
            outcome,
            goal.total_tokens,
            goal.total_cost
        );
        let learning = Learning::new(goal.id, outcome, text.clone());
        self.long_term.store(&learning).await?;

        let mut goal = goal;
        goal.record_learning(learning.id, text);
        self.goals.update(&goal).await?;
        Ok(())
    }
}

fn describe_outcome(outcome: &WorkflowOutcome) -> String {
    match outcome {
        WorkflowOutcome::NoOp => "no-op".to_string(),
        WorkflowOutcome::Completed { usage, cost } => format!("completed ({} tokens, ${cost:.4})", usage.total_tokens),
        WorkflowOutcome::StageFailed { stage, error } => format!("stage {} failed: {error}", stage.as_str()),
        WorkflowOutcome::TestFailed { fix_card_id } => format!("test failed, fix-card {fix_card_id}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::GoalSource;

    fn goal() -> Goal {
        Goal::new("add healthz", GoalSource { source: "cli".to_string(), source_id: "local".to_string() })
    }

    fn base_input() -> ThinkInput {
        ThinkInput {
            context: MemoryContext::default(),
            learnings: Vec::new(),
            budget: BudgetSnapshot { session_pct: 10.0, daily_pct: 10.0 },
            block_pct: 95.0,
            active_goal: None,
            active_goal_cards: Vec::new(),
            cards_awaiting_fix: Vec::new(),
            ready_card_ids: Vec::new(),
            worktrees_active: 0,
            worktrees_max: 10,
            oldest_pending_goal: None,
        }
    }

    #[test]
    fn blocked_budget_always_waits() {
        let mut input = base_input();
        input.budget = BudgetSnapshot { session_pct: 99.0, daily_pct: 10.0 };
        input.active_goal = Some(goal());
        assert!(matches!(think(&input), Decision::Wait { .. }));
    }

    #[test]
    fn active_goal_without_cards_decomposes() {
        let mut input = base_input();
        input.active_goal = Some(goal());
        assert!(matches!(think(&input), Decision::Decompose { .. }));
    }

    #[test]
    fn unfixed_test_failure_takes_priority_over_ready_cards() {
        let mut input = base_input();
        let g = goal();
        input.active_goal_cards = vec![Card::new(g.id, "x", "y")];
        input.cards_awaiting_fix = vec![Uuid::new_v4()];
        input.ready_card_ids = vec![Uuid::new_v4()];
        input.active_goal = Some(g);
        assert!(matches!(think(&input), Decision::CreateFix { .. }));
    }

    #[test]
    fn single_ready_card_executes_alone() {
        let mut input = base_input();
        let g = goal();
        let card_id = Uuid::new_v4();
        input.active_goal_cards = vec![Card::new(g.id, "x", "y")];
        input.ready_card_ids = vec![card_id];
        input.active_goal = Some(g);
        match think(&input) {
            Decision::ExecuteCard { card_id: id } => assert_eq!(id, card_id),
            other => panic!("expected ExecuteCard, got {other:?}"),
        }
    }

    #[test]
    fn multiple_ready_cards_execute_in_parallel() {
        let mut input = base_input();
        let g = goal();
        input.active_goal_cards = vec![Card::new(g.id, "x", "y")];
        input.ready_card_ids = vec![Uuid::new_v4(), Uuid::new_v4()];
        input.active_goal = Some(g);
        assert!(matches!(think(&input), Decision::ExecuteCardsParallel { .. }));
    }

    #[test]
    fn worktree_budget_exhaustion_downgrades_to_wait() {
        let mut input = base_input();
        let g = goal();
        input.active_goal_cards = vec![Card::new(g.id, "x", "y")];
        input.ready_card_ids = vec![Uuid::new_v4()];
        input.worktrees_active = 10;
        input.worktrees_max = 10;
        input.active_goal = Some(g);
        assert!(matches!(think(&input), Decision::Wait { .. }));
    }

    #[test]
    fn all_cards_done_completes_goal() {
        let mut input = base_input();
        let g = goal();
        let mut card = Card::new(g.id, "x", "y");
        card.column = Column::Done;
        input.active_goal_cards = vec![card];
        input.active_goal = Some(g);
        assert!(matches!(think(&input), Decision::CompleteGoal { .. }));
    }

    #[test]
    fn no_active_goal_promotes_oldest_pending() {
        let mut input = base_input();
        input.oldest_pending_goal = Some(goal());
        assert!(matches!(think(&input), Decision::PromotePendingGoal { .. }));
    }

    #[test]
    fn nothing_to_do_waits() {
        let input = base_input();
        assert!(matches!(think(&input), Decision::Wait { .. }));
    }
}
