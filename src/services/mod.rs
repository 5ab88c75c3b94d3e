pub mod cost;
pub mod decomposer;
pub mod event_bus;
pub mod orchestrator;
pub mod usage_budget;
pub mod workflow_engine;

pub use cost::estimate_cost;
pub use decomposer::Decomposer;
pub use event_bus::{EventBus, OrchestratorEvent};
pub use orchestrator::{think, Orchestrator, ThinkInput};
pub use usage_budget::SqliteUsageBudget;
pub use workflow_engine::{SingleStageOutcome, WorkflowEngine, WorkflowOutcome};
