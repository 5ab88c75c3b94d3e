pub mod card;
pub mod config;
pub mod execution;
pub mod goal;
pub mod learning;
pub mod orchestrator_action;

pub use card::{Card, Column};
pub use config::{
    AgentConfig, BudgetConfig, Config, DatabaseConfig, HttpConfig, MemoryConfig, VectorStoreConfig,
    WorktreeConfig,
};
pub use execution::{Execution, ExecutionLog, ExecutionStatus, LogSequencer, LogType, StageCommand, TokenUsage};
pub use goal::{Goal, GoalSource, GoalStatus};
pub use learning::{Learning, LearningOutcome};
pub use orchestrator_action::{Decision, OrchestratorAction, OrchestratorLog};
