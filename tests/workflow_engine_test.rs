//! End-to-end `WorkflowEngine` coverage using in-memory mock ports —
//! no real git, HTTP, or database involved. Exercises the full
//! plan -> implement -> test -> review -> done progression, a mid-stage
//! agent error, and the test-failure fix-card path.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use cardforge::domain::errors::{OrchestratorError, OrchestratorResult};
use cardforge::domain::models::{Card, Column, Execution, ExecutionLog, StageCommand, TokenUsage};
use cardforge::domain::ports::{
    AgentAdapter, CardFilter, CardRepository, Event, ExecutionRepository, StageRequest, Worktree,
    WorktreeManager,
};
use cardforge::services::{EventBus, SingleStageOutcome, WorkflowEngine, WorkflowOutcome};
use futures::stream;
use uuid::Uuid;

#[derive(Default)]
struct MockCards {
    cards: Mutex<HashMap<Uuid, Card>>,
}

#[async_trait]
impl CardRepository for MockCards {
    async fn create(&self, card: &Card) -> OrchestratorResult<()> {
        self.cards.lock().unwrap().insert(card.id, card.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> OrchestratorResult<Option<Card>> {
        Ok(self.cards.lock().unwrap().get(&id).cloned())
    }

    async fn update(&self, card: &Card) -> OrchestratorResult<()> {
        self.cards.lock().unwrap().insert(card.id, card.clone());
        Ok(())
    }

    async fn move_column(&self, id: Uuid, to: Column) -> OrchestratorResult<Card> {
        let mut cards = self.cards.lock().unwrap();
        let card = cards.get_mut(&id).ok_or_else(|| OrchestratorError::NotFound {
            entity: "card".to_string(),
            id: id.to_string(),
        })?;
        card.transition_to(to)?;
        Ok(card.clone())
    }

    async fn list(&self, _filter: CardFilter) -> OrchestratorResult<Vec<Card>> {
        Ok(self.cards.lock().unwrap().values().cloned().collect())
    }

    async fn list_by_goal(&self, goal_id: Uuid) -> OrchestratorResult<Vec<Card>> {
        Ok(self.cards.lock().unwrap().values().filter(|c| c.goal_id == goal_id).cloned().collect())
    }

    async fn list_ready(&self, _goal_id: Uuid) -> OrchestratorResult<Vec<Card>> {
        Ok(Vec::new())
    }

    async fn list_fix_cards(&self, parent_card_id: Uuid) -> OrchestratorResult<Vec<Card>> {
        Ok(self
            .cards
            .lock()
            .unwrap()
            .values()
            .filter(|c| c.parent_card_id == Some(parent_card_id))
            .cloned()
            .collect())
    }
}

#[derive(Default)]
struct MockExecutions {
    executions: Mutex<HashMap<Uuid, Execution>>,
    logs: Mutex<Vec<ExecutionLog>>,
}

#[async_trait]
impl ExecutionRepository for MockExecutions {
    async fn create(&self, execution: &Execution) -> OrchestratorResult<()> {
        self.executions.lock().unwrap().insert(execution.id, execution.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> OrchestratorResult<Option<Execution>> {
        Ok(self.executions.lock().unwrap().get(&id).cloned())
    }

    async fn update(&self, execution: &Execution) -> OrchestratorResult<()> {
        self.executions.lock().unwrap().insert(execution.id, execution.clone());
        Ok(())
    }

    async fn active_for_card(&self, card_id: Uuid) -> OrchestratorResult<Option<Execution>> {
        Ok(self.executions.lock().unwrap().values().find(|e| e.card_id == card_id && e.is_active).cloned())
    }

    async fn list_by_card(&self, card_id: Uuid) -> OrchestratorResult<Vec<Execution>> {
        let mut found: Vec<_> =
            self.executions.lock().unwrap().values().filter(|e| e.card_id == card_id).cloned().collect();
        found.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(found)
    }

    async fn append_log(&self, log: &ExecutionLog) -> OrchestratorResult<()> {
        self.logs.lock().unwrap().push(log.clone());
        Ok(())
    }

    async fn list_logs(&self, execution_id: Uuid) -> OrchestratorResult<Vec<ExecutionLog>> {
        Ok(self.logs.lock().unwrap().iter().filter(|l| l.execution_id == execution_id).cloned().collect())
    }
}

#[derive(Default)]
struct MockWorktrees;

#[async_trait]
impl WorktreeManager for MockWorktrees {
    async fn create(&self, card_id: Uuid, base_branch: Option<String>) -> OrchestratorResult<Worktree> {
        Ok(Worktree {
            card_id,
            branch_name: format!("agent/{card_id}"),
            path: format!("/tmp/worktrees/{card_id}"),
            base_branch: base_branch.unwrap_or_else(|| "main".to_string()),
        })
    }

    async fn remove(&self, _card_id: Uuid, _delete_branch: bool) -> OrchestratorResult<()> {
        Ok(())
    }

    async fn active(&self) -> OrchestratorResult<Vec<Worktree>> {
        Ok(Vec::new())
    }

    async fn recover_state(&self) -> OrchestratorResult<()> {
        Ok(())
    }

    async fn cleanup_orphans(&self, _active_card_ids: &[Uuid]) -> OrchestratorResult<usize> {
        Ok(0)
    }
}

/// Emits a fixed event script for every stage, keyed by `StageCommand`.
/// Plan emits a spec-path discovery event; everything else can be told to
/// emit a plain success or a test-failure marker.
struct ScriptedAgent {
    scripts: Mutex<HashMap<&'static str, Vec<Event>>>,
}

impl ScriptedAgent {
    fn new() -> Self {
        let mut scripts = HashMap::new();
        scripts.insert(
            StageCommand::Plan.as_str(),
            vec![
                Event::Text { content: "Writing spec to specs/add-healthz.md".to_string() },
                Event::Result { usage: TokenUsage::new(100, 50) },
            ],
        );
        for command in [StageCommand::Implement, StageCommand::Review] {
            scripts.insert(
                command.as_str(),
                vec![
                    Event::ToolUse { name: "edit_file".to_string(), input: serde_json::json!({"path": "src/main.rs"}) },
                    Event::Result { usage: TokenUsage::new(200, 80) },
                ],
            );
        }
        scripts.insert(
            StageCommand::TestImplementation.as_str(),
            vec![
                Event::Text { content: "all tests passed".to_string() },
                Event::Result { usage: TokenUsage::new(60, 20) },
            ],
        );
        Self { scripts: Mutex::new(scripts) }
    }

    fn fail_tests(&self) {
        self.scripts.lock().unwrap().insert(
            StageCommand::TestImplementation.as_str(),
            vec![Event::Text { content: "2 tests failed: assertion error on line 42".to_string() }],
        );
    }

    fn set_script(&self, command: StageCommand, events: Vec<Event>) {
        self.scripts.lock().unwrap().insert(command.as_str(), events);
    }
}

#[async_trait]
impl AgentAdapter for ScriptedAgent {
    async fn run_stage(&self, request: StageRequest) -> OrchestratorResult<futures::stream::BoxStream<'static, Event>> {
        let command = if request.prompt.starts_with("/plan") {
            StageCommand::Plan
        } else if request.prompt.starts_with(StageCommand::Implement.as_str()) {
            StageCommand::Implement
        } else if request.prompt.starts_with(StageCommand::TestImplementation.as_str()) {
            StageCommand::TestImplementation
        } else {
            StageCommand::Review
        };
        let events = self.scripts.lock().unwrap().get(command.as_str()).cloned().unwrap_or_default();
        Ok(Box::pin(stream::iter(events)))
    }
}

fn build_engine(agent: Arc<ScriptedAgent>) -> (Arc<MockCards>, Arc<MockExecutions>, Arc<WorkflowEngine>) {
    let cards = Arc::new(MockCards::default());
    let executions = Arc::new(MockExecutions::default());
    let worktrees: Arc<dyn WorktreeManager> = Arc::new(MockWorktrees::default());
    let agent: Arc<dyn AgentAdapter> = agent;
    let event_bus = Arc::new(EventBus::default());
    let card_port: Arc<dyn CardRepository> = cards.clone();
    let execution_port: Arc<dyn ExecutionRepository> = executions.clone();
    let engine = Arc::new(WorkflowEngine::new(card_port, execution_port, worktrees, agent, event_bus));
    (cards, executions, engine)
}

#[tokio::test]
async fn run_drives_a_card_through_every_stage_to_done() {
    let agent = Arc::new(ScriptedAgent::new());
    let (cards, executions, engine) = build_engine(agent);

    let card = Card::new(Uuid::new_v4(), "Add healthz", "return 200 on GET /healthz");
    cards.create(&card).await.unwrap();

    let outcome = engine.run(card.id).await.unwrap();
    match outcome {
        WorkflowOutcome::Completed { usage, .. } => assert!(usage.total_tokens > 0),
        other => panic!("expected Completed, got {other:?}"),
    }

    let final_card = cards.get(card.id).await.unwrap().unwrap();
    assert_eq!(final_card.column, Column::Done);
    assert_eq!(final_card.spec_path.as_deref(), Some("specs/add-healthz.md"));
    assert!(final_card.completed_at.is_some());

    let history = executions.list_by_card(card.id).await.unwrap();
    assert_eq!(history.len(), 4, "one execution per stage");
    assert!(history.iter().all(|e| !e.is_active), "all stages closed out");
}

#[tokio::test]
async fn run_stops_and_spawns_a_fix_card_on_test_failure() {
    let agent = Arc::new(ScriptedAgent::new());
    agent.fail_tests();
    let (cards, _executions, engine) = build_engine(agent);

    let card = Card::new(Uuid::new_v4(), "Add healthz", "return 200 on GET /healthz");
    cards.create(&card).await.unwrap();

    let outcome = engine.run(card.id).await.unwrap();
    let fix_card_id = match outcome {
        WorkflowOutcome::TestFailed { fix_card_id } => fix_card_id,
        other => panic!("expected TestFailed, got {other:?}"),
    };

    let final_card = cards.get(card.id).await.unwrap().unwrap();
    assert_eq!(final_card.column, Column::Test, "column holds at the failing stage");

    let fix_cards = cards.list_fix_cards(card.id).await.unwrap();
    assert_eq!(fix_cards.len(), 1);
    assert_eq!(fix_cards[0].id, fix_card_id);
    assert!(fix_cards[0].is_fix_card);
    assert_eq!(fix_cards[0].parent_card_id, Some(card.id));
}

#[tokio::test]
async fn run_single_stage_lets_an_operator_rerun_just_one_stage() {
    let agent = Arc::new(ScriptedAgent::new());
    let (cards, _executions, engine) = build_engine(agent);

    let mut card = Card::new(Uuid::new_v4(), "Add healthz", "return 200 on GET /healthz");
    card.spec_path = Some("specs/add-healthz.md".to_string());
    cards.create(&card).await.unwrap();

    let (updated, outcome) =
        engine.run_single_stage(card.id, StageCommand::Implement, None, None).await.unwrap();
    assert_eq!(updated.column, Column::Implement);
    match outcome {
        SingleStageOutcome::Success { usage, .. } => assert!(usage.total_tokens > 0),
        other => panic!("expected Success, got {other:?}"),
    }
}

#[tokio::test]
async fn run_resumes_at_the_failing_stage_instead_of_skipping_it() {
    let agent = Arc::new(ScriptedAgent::new());
    agent.fail_tests();
    let (cards, executions, engine) = build_engine(agent.clone());

    let card = Card::new(Uuid::new_v4(), "Add healthz", "return 200 on GET /healthz");
    cards.create(&card).await.unwrap();

    let outcome = engine.run(card.id).await.unwrap();
    assert!(matches!(outcome, WorkflowOutcome::TestFailed { .. }));

    let stalled = cards.get(card.id).await.unwrap().unwrap();
    assert_eq!(stalled.column, Column::Test, "card holds at Test after the failure");

    agent.set_script(
        StageCommand::TestImplementation,
        vec![
            Event::Text { content: "all tests passed".to_string() },
            Event::Result { usage: TokenUsage::new(60, 20) },
        ],
    );

    let outcome = engine.run(card.id).await.unwrap();
    assert!(matches!(outcome, WorkflowOutcome::Completed { .. }), "expected Completed, got {outcome:?}");

    let test_runs = executions
        .list_by_card(card.id)
        .await
        .unwrap()
        .into_iter()
        .filter(|e| e.command == StageCommand::TestImplementation)
        .count();
    assert_eq!(test_runs, 2, "Test must re-run on resume, not be skipped in favor of Review");
}

#[tokio::test]
async fn run_reports_stage_failed_when_the_card_is_missing_a_spec_path() {
    let agent = Arc::new(ScriptedAgent::new());
    // Swap Plan's reply for one that never mentions a specs/*.md path, so
    // Implement has nothing to work from.
    agent.set_script(
        StageCommand::Plan,
        vec![
            Event::Text { content: "thinking it over, no file yet".to_string() },
            Event::Result { usage: TokenUsage::new(10, 5) },
        ],
    );
    let (cards, _executions, engine) = build_engine(agent);

    let card = Card::new(Uuid::new_v4(), "Add healthz", "return 200 on GET /healthz");
    cards.create(&card).await.unwrap();

    let outcome = engine.run(card.id).await.unwrap();
    match outcome {
        WorkflowOutcome::StageFailed { stage, .. } => assert_eq!(stage, StageCommand::Implement),
        other => panic!("expected StageFailed, got {other:?}"),
    }
}
