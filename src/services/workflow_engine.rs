//! WorkflowEngine: drives one card end-to-end through
//! `plan -> implement -> test -> review -> done`, resumable from whatever
//! column the card is currently sitting in.
//!
//! Grounded on the teacher's `WorkflowEngine<T: TaskRepository>` shape (a
//! thin service wrapping a repository generic plus an `EventBus`, driven by
//! reading persisted state and re-entering at the right step) but the state
//! machine itself follows the card/column/stage model instead of the
//! teacher's workflow-template phases.

use std::sync::Arc;

use futures::StreamExt;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::domain::errors::{OrchestratorError, OrchestratorResult};
use crate::domain::models::{
    Card, Column, Execution, ExecutionLog, LogSequencer, LogType, StageCommand, TokenUsage,
};
use crate::domain::ports::{
    AgentAdapter, CardRepository, Event as AgentEvent, ExecutionRepository, StageRequest, WorktreeManager,
};
use crate::services::cost::estimate_cost;
use crate::services::event_bus::{EventBus, OrchestratorEvent};

/// The four stages the engine drives, in order, each paired with the
/// column it moves the card into before running.
const STAGES: &[(Column, StageCommand)] = &[
    (Column::Plan, StageCommand::Plan),
    (Column::Implement, StageCommand::Implement),
    (Column::Test, StageCommand::TestImplementation),
    (Column::Review, StageCommand::Review),
];

static SPEC_PATH_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"specs/[\w\-]+\.md").expect("static regex"));

static TEST_FAILURE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(test failed|assertion error|tests? (failed|failing)|FAIL\b)").expect("static regex")
});

/// What one `run()` call accomplished. The card's column reflects the
/// engine's progress regardless of which variant is returned — a failure
/// never rolls the column back.
#[derive(Debug, Clone)]
pub enum WorkflowOutcome {
    /// Card was already in a terminal column; nothing to do.
    NoOp,
    /// All remaining stages succeeded; card moved to `done`.
    Completed { usage: TokenUsage, cost: f64 },
    /// A non-test stage's adapter run failed.
    StageFailed { stage: StageCommand, error: String },
    /// The test stage detected a failure and spawned (or reused) a fix-card.
    TestFailed { fix_card_id: Uuid },
}

pub struct WorkflowEngine {
    cards: Arc<dyn CardRepository>,
    executions: Arc<dyn ExecutionRepository>,
    worktrees: Arc<dyn WorktreeManager>,
    agent: Arc<dyn AgentAdapter>,
    event_bus: Arc<EventBus>,
}

impl WorkflowEngine {
    pub fn new(
        cards: Arc<dyn CardRepository>,
        executions: Arc<dyn ExecutionRepository>,
        worktrees: Arc<dyn WorktreeManager>,
        agent: Arc<dyn AgentAdapter>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self { cards, executions, worktrees, agent, event_bus }
    }

    #[instrument(skip(self), fields(card_id = %card_id))]
    pub async fn run(&self, card_id: Uuid) -> OrchestratorResult<WorkflowOutcome> {
        let mut card = self
            .cards
            .get(card_id)
            .await?
            .ok_or_else(|| OrchestratorError::NotFound { entity: "card".to_string(), id: card_id.to_string() })?;

        if card.column.is_terminal() || card.column == Column::Done {
            return Ok(WorkflowOutcome::NoOp);
        }

        let working_dir = self.resolve_working_dir(&mut card).await?;

        let mut total_usage = TokenUsage::default();
        let mut total_cost = 0.0_f64;

        for &(target_column, command) in STAGES {
            if !stage_is_pending(card.column, target_column) {
                continue;
            }

            card = self.cards.move_column(card.id, target_column).await?;
            self.event_bus.publish(OrchestratorEvent::CardMoved {
                card_id: card.id,
                from: previous_column(target_column),
                to: target_column,
                at: chrono::Utc::now(),
            });

            let prompt = match self.build_prompt(&card, command) {
                Ok(p) => p,
                Err(err) => return Ok(WorkflowOutcome::StageFailed { stage: command, error: err.to_string() }),
            };

            let model = model_for_stage(&card, command);
            let execution = Execution::start(card.id, command, target_column.as_str(), model.clone());
            self.executions.create(&execution).await?;

            let run_result = self
                .run_stage(&execution, &working_dir, &model, &prompt, command, &mut card)
                .await?;

            match run_result {
                StageRunResult::Success { usage, cost } => {
                    total_usage = TokenUsage::new(
                        total_usage.input_tokens + usage.input_tokens,
                        total_usage.output_tokens + usage.output_tokens,
                    );
                    total_cost += cost;
                }
                StageRunResult::AgentError(message) => {
                    return Ok(WorkflowOutcome::StageFailed { stage: command, error: message });
                }
                StageRunResult::TestFailed { fix_card_id } => {
                    return Ok(WorkflowOutcome::TestFailed { fix_card_id });
                }
            }
        }

        let card = self.cards.move_column(card.id, Column::Done).await?;
        self.event_bus.publish(OrchestratorEvent::CardMoved {
            card_id: card.id,
            from: Column::Review,
            to: Column::Done,
            at: chrono::Utc::now(),
        });

        Ok(WorkflowOutcome::Completed { usage: total_usage, cost: total_cost })
    }

    /// Manually drive exactly one stage, independent of the autonomous
    /// tick loop — the substrate for the HTTP `execute-plan` /
    /// `execute-implement` / `execute-test` / `execute-review` endpoints
    /// (spec §6), which let an operator invoke a single stage and get its
    /// logs back synchronously rather than waiting on THINK to schedule it.
    #[instrument(skip(self, spec_path_override, model_override), fields(card_id = %card_id))]
    pub async fn run_single_stage(
        &self,
        card_id: Uuid,
        command: StageCommand,
        spec_path_override: Option<String>,
        model_override: Option<String>,
    ) -> OrchestratorResult<(Card, SingleStageOutcome)> {
        let mut card = self
            .cards
            .get(card_id)
            .await?
            .ok_or_else(|| OrchestratorError::NotFound { entity: "card".to_string(), id: card_id.to_string() })?;

        if let Some(spec_path) = spec_path_override {
            card.spec_path = Some(spec_path);
            self.cards.update(&card).await?;
        }

        let working_dir = self.resolve_working_dir(&mut card).await?;
        let target_column = column_for_stage(command);

        if card.column != target_column {
            let from = card.column;
            card = self.cards.move_column(card.id, target_column).await?;
            self.event_bus.publish(OrchestratorEvent::CardMoved {
                card_id: card.id,
                from,
                to: target_column,
                at: chrono::Utc::now(),
            });
        }

        let prompt = self.build_prompt(&card, command)?;
        let model = model_override.unwrap_or_else(|| model_for_stage(&card, command));
        let execution = Execution::start(card.id, command, target_column.as_str(), model.clone());
        self.executions.create(&execution).await?;

        let result = self.run_stage(&execution, &working_dir, &model, &prompt, command, &mut card).await?;
        let outcome = match result {
            StageRunResult::Success { usage, cost } => SingleStageOutcome::Success { usage, cost },
            StageRunResult::AgentError(message) => SingleStageOutcome::AgentError(message),
            StageRunResult::TestFailed { fix_card_id } => SingleStageOutcome::TestFailed { fix_card_id },
        };
        Ok((card, outcome))
    }

    async fn resolve_working_dir(&self, card: &mut Card) -> OrchestratorResult<String> {
        if let Some(path) = &card.worktree_path {
            return Ok(path.clone());
        }

        let worktree = self.worktrees.create(card.id, None).await?;
        card.branch_name = Some(worktree.branch_name.clone());
        card.worktree_path = Some(worktree.path.clone());
        card.base_branch = Some(worktree.base_branch.clone());
        self.cards.update(card).await?;
        Ok(worktree.path)
    }

    fn build_prompt(&self, card: &Card, command: StageCommand) -> OrchestratorResult<String> {
        match command {
            StageCommand::Plan => Ok(format!("/plan {}: {}", card.title, card.description)),
            _ => {
                let spec_path = card
                    .spec_path
                    .clone()
                    .ok_or_else(|| OrchestratorError::MissingSpec(card.id))?;
                Ok(format!("{} {spec_path}", command.as_str()))
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_stage(
        &self,
        execution: &Execution,
        working_dir: &str,
        model: &str,
        prompt: &str,
        command: StageCommand,
        card: &mut Card,
    ) -> OrchestratorResult<StageRunResult> {
        let mut execution = execution.clone();
        let mut sequencer = LogSequencer::new(execution.id);
        let mut text_buffer = String::new();
        let mut usage = TokenUsage::default();
        let mut discovered_spec_path: Option<String> = None;
        let mut agent_error: Option<String> = None;

        let request = StageRequest {
            model: model.to_string(),
            working_dir: working_dir.to_string(),
            command: Some(command),
            prompt: prompt.to_string(),
            title: card.title.clone(),
            description: card.description.clone(),
            spec_path: card.spec_path.clone(),
        };
        let mut stream = self.agent.run_stage(request).await?;

        while let Some(event) = stream.next().await {
            let log = self.log_for_event(&mut sequencer, &event);
            self.executions.append_log(&log).await?;
            self.event_bus.publish(OrchestratorEvent::ExecutionLogAppended {
                execution_id: execution.id,
                sequence: log.sequence,
                content: log.content.clone(),
                at: log.timestamp,
            });

            match event {
                AgentEvent::Text { content } => {
                    text_buffer.push_str(&content);
                    if command == StageCommand::Plan && discovered_spec_path.is_none() {
                        discovered_spec_path = extract_spec_path_from_text(&content);
                    }
                }
                AgentEvent::ToolUse { input, .. } => {
                    if command == StageCommand::Plan && discovered_spec_path.is_none() {
                        discovered_spec_path = extract_spec_path_from_tool_input(&input);
                    }
                }
                AgentEvent::Result { usage: reported } => usage = reported,
                AgentEvent::Error { message } => {
                    agent_error = Some(message);
                    break;
                }
            }
        }

        if let Some(message) = agent_error {
            execution.close_error(message.clone());
            self.executions.update(&execution).await?;
            warn!(card_id = %card.id, stage = command.as_str(), %message, "stage execution failed");
            return Ok(StageRunResult::AgentError(message));
        }

        if command == StageCommand::TestImplementation && TEST_FAILURE_RE.is_match(&text_buffer) {
            execution.close_error("test failure detected");
            self.executions.update(&execution).await?;

            let fix_card = self
                .cards
                .create_fix_card(card.id, format!("Test failure on card {}", card.id), Some(text_buffer.clone()))
                .await?;
            return Ok(StageRunResult::TestFailed { fix_card_id: fix_card.id });
        }

        let cost = estimate_cost(model, usage);
        execution.close_success(usage, cost);
        self.executions.update(&execution).await?;

        if command == StageCommand::Plan {
            if let Some(path) = discovered_spec_path {
                card.spec_path = Some(path);
                self.cards.update(card).await?;
            }
        }

        info!(card_id = %card.id, stage = command.as_str(), tokens = usage.total_tokens, "stage completed");
        Ok(StageRunResult::Success { usage, cost })
    }

    fn log_for_event(&self, sequencer: &mut LogSequencer, event: &AgentEvent) -> ExecutionLog {
        match event {
            AgentEvent::Text { content } => sequencer.next(LogType::Text, content.clone()),
            AgentEvent::ToolUse { name, input } => sequencer.next(LogType::Tool, format!("{name}: {input}")),
            AgentEvent::Result { usage } => sequencer.next(LogType::Result, format!("{usage:?}")),
            AgentEvent::Error { message } => sequencer.next(LogType::Error, message.clone()),
        }
    }
}

enum StageRunResult {
    Success { usage: TokenUsage, cost: f64 },
    AgentError(String),
    TestFailed { fix_card_id: Uuid },
}

/// Outcome of `WorkflowEngine::run_single_stage`, the HTTP layer's
/// manual-invocation counterpart to `StageRunResult`.
#[derive(Debug, Clone)]
pub enum SingleStageOutcome {
    Success { usage: TokenUsage, cost: f64 },
    AgentError(String),
    TestFailed { fix_card_id: Uuid },
}

const fn column_for_stage(command: StageCommand) -> Column {
    match command {
        StageCommand::Plan => Column::Plan,
        StageCommand::Implement => Column::Implement,
        StageCommand::TestImplementation => Column::Test,
        StageCommand::Review => Column::Review,
    }
}

/// Whether `target` is a stage the engine still needs to run, given the
/// card's current column. A card resumed at the column it previously
/// stopped in (e.g. after a test failure) must re-run that stage rather
/// than skip straight to the next one, so `target` counts as pending
/// whenever it is at or after `current` in the SDLC chain.
fn stage_is_pending(current: Column, target: Column) -> bool {
    stage_rank(target) >= stage_rank(current)
}

const fn stage_rank(column: Column) -> i8 {
    match column {
        Column::Backlog => 0,
        Column::Plan => 1,
        Column::Implement => 2,
        Column::Test => 3,
        Column::Review => 4,
        Column::Done | Column::Completed | Column::Archived | Column::Cancelled => 5,
    }
}

const fn previous_column(target: Column) -> Column {
    match target {
        Column::Plan => Column::Backlog,
        Column::Implement => Column::Plan,
        Column::Test => Column::Implement,
        Column::Review => Column::Test,
        other => other,
    }
}

fn model_for_stage(card: &Card, command: StageCommand) -> String {
    match command {
        StageCommand::Plan => card.model_plan.clone(),
        StageCommand::Implement => card.model_implement.clone(),
        StageCommand::TestImplementation => card.model_test.clone(),
        StageCommand::Review => card.model_review.clone(),
    }
}

fn extract_spec_path_from_text(text: &str) -> Option<String> {
    SPEC_PATH_RE.find(text).map(|m| m.as_str().to_string())
}

fn extract_spec_path_from_tool_input(input: &serde_json::Value) -> Option<String> {
    let path = input.get("file_path").or_else(|| input.get("path"))?.as_str()?;
    if path.contains("specs/") && path.ends_with(".md") {
        Some(path.to_string())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_rank_orders_sdlc_chain() {
        assert!(stage_rank(Column::Backlog) < stage_rank(Column::Plan));
        assert!(stage_rank(Column::Review) < stage_rank(Column::Done));
    }

    #[test]
    fn pending_stage_skips_already_passed_ones() {
        assert!(stage_is_pending(Column::Implement, Column::Test));
        assert!(!stage_is_pending(Column::Implement, Column::Plan));
    }

    #[test]
    fn pending_stage_re_runs_the_column_a_card_stopped_in() {
        // A card stopped at Test (e.g. a prior failure) must re-run Test on
        // resume instead of jumping straight to Review.
        assert!(stage_is_pending(Column::Test, Column::Test));
    }

    #[test]
    fn spec_path_is_extracted_from_streamed_text() {
        let text = "I've written the plan to specs/add-healthz.md for review.";
        assert_eq!(extract_spec_path_from_text(text), Some("specs/add-healthz.md".to_string()));
    }

    #[test]
    fn spec_path_is_extracted_from_tool_input() {
        let input = serde_json::json!({ "file_path": "specs/rate-limit.md", "content": "..." });
        assert_eq!(extract_spec_path_from_tool_input(&input), Some("specs/rate-limit.md".to_string()));
    }

    #[test]
    fn tool_input_without_specs_prefix_is_ignored() {
        let input = serde_json::json!({ "file_path": "src/main.rs" });
        assert_eq!(extract_spec_path_from_tool_input(&input), None);
    }

    #[test]
    fn test_failure_marker_is_detected_case_insensitively() {
        assert!(TEST_FAILURE_RE.is_match("TEST FAILED: assertion error in test_foo"));
        assert!(TEST_FAILURE_RE.is_match("2 tests failing in suite"));
        assert!(!TEST_FAILURE_RE.is_match("all tests passed, 42 green"));
    }
}
