//! Execution and ExecutionLog domain models.
//!
//! An Execution is one invocation of an SDLC stage on a card. At most one
//! Execution per card is ever `is_active`; logs within an Execution are
//! strictly sequence-numbered.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The SDLC stage command an Execution ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StageCommand {
    #[serde(rename = "/plan")]
    Plan,
    #[serde(rename = "/implement")]
    Implement,
    #[serde(rename = "/test-implementation")]
    TestImplementation,
    #[serde(rename = "/review")]
    Review,
}

impl StageCommand {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Plan => "/plan",
            Self::Implement => "/implement",
            Self::TestImplementation => "/test-implementation",
            Self::Review => "/review",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Running,
    Success,
    Error,
}

/// One typed, ordered entry in an Execution's log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogType {
    Info,
    Text,
    Tool,
    Result,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionLog {
    pub id: Uuid,
    pub execution_id: Uuid,
    pub sequence: i64,
    pub log_type: LogType,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Token/cost totals recorded on an Execution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub total_tokens: i64,
}

impl TokenUsage {
    pub const fn new(input_tokens: i64, output_tokens: i64) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens + output_tokens,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    pub id: Uuid,
    pub card_id: Uuid,
    pub command: StageCommand,
    pub status: ExecutionStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub workflow_stage: String,
    pub workflow_error: Option<String>,
    pub usage: TokenUsage,
    pub cost: f64,
    pub model: String,
    pub is_active: bool,
}

impl Execution {
    pub fn start(card_id: Uuid, command: StageCommand, workflow_stage: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            card_id,
            command,
            status: ExecutionStatus::Running,
            started_at: Utc::now(),
            completed_at: None,
            workflow_stage: workflow_stage.into(),
            workflow_error: None,
            usage: TokenUsage::default(),
            cost: 0.0,
            model: model.into(),
            is_active: true,
        }
    }

    pub fn close_success(&mut self, usage: TokenUsage, cost: f64) {
        self.usage = usage;
        self.cost = cost;
        self.status = ExecutionStatus::Success;
        self.completed_at = Some(Utc::now());
        self.is_active = false;
    }

    pub fn close_error(&mut self, error: impl Into<String>) {
        self.workflow_error = Some(error.into());
        self.status = ExecutionStatus::Error;
        self.completed_at = Some(Utc::now());
        self.is_active = false;
    }
}

/// Builds gap-free, strictly increasing `ExecutionLog` entries for a single
/// Execution. Owned exclusively by the stage runner that drives that
/// Execution — never shared across concurrent writers.
#[derive(Debug)]
pub struct LogSequencer {
    execution_id: Uuid,
    next_sequence: i64,
}

impl LogSequencer {
    pub const fn new(execution_id: Uuid) -> Self {
        Self {
            execution_id,
            next_sequence: 1,
        }
    }

    pub fn next(&mut self, log_type: LogType, content: impl Into<String>) -> ExecutionLog {
        let entry = ExecutionLog {
            id: Uuid::new_v4(),
            execution_id: self.execution_id,
            sequence: self.next_sequence,
            log_type,
            content: content.into(),
            timestamp: Utc::now(),
        };
        self.next_sequence += 1;
        entry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_sequence_is_gap_free_and_monotone() {
        let mut seq = LogSequencer::new(Uuid::new_v4());
        let a = seq.next(LogType::Info, "starting");
        let b = seq.next(LogType::Text, "working");
        let c = seq.next(LogType::Result, "done");
        assert_eq!([a.sequence, b.sequence, c.sequence], [1, 2, 3]);
    }

    #[test]
    fn execution_closes_success_clears_active() {
        let mut exec = Execution::start(Uuid::new_v4(), StageCommand::Plan, "plan", "sonnet-default");
        assert!(exec.is_active);
        exec.close_success(TokenUsage::new(100, 50), 0.01);
        assert!(!exec.is_active);
        assert_eq!(exec.status, ExecutionStatus::Success);
        assert_eq!(exec.usage.total_tokens, 150);
    }

    #[test]
    fn execution_closes_error_clears_active() {
        let mut exec = Execution::start(Uuid::new_v4(), StageCommand::TestImplementation, "test", "gemini-default");
        exec.close_error("agent crashed");
        assert!(!exec.is_active);
        assert_eq!(exec.status, ExecutionStatus::Error);
        assert_eq!(exec.workflow_error.as_deref(), Some("agent crashed"));
    }

    mod token_usage_properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn total_is_always_the_sum_of_its_parts(
                input in 0i64..1_000_000_000,
                output in 0i64..1_000_000_000,
            ) {
                let usage = TokenUsage::new(input, output);
                prop_assert_eq!(usage.total_tokens, input + output);
                prop_assert_eq!(usage.input_tokens, input);
                prop_assert_eq!(usage.output_tokens, output);
            }
        }
    }
}
