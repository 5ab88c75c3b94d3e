//! Shared axum state: the handful of ports and services the Command API
//! and WebSocket API need, held behind `Arc` the same way `AppState` is
//! built in the teacher's MCP HTTP servers.

use std::sync::Arc;

use crate::domain::ports::{CardRepository, ExecutionRepository, GoalRepository, WorktreeManager};
use crate::services::{EventBus, WorkflowEngine};

#[derive(Clone)]
pub struct AppState {
    pub goals: Arc<dyn GoalRepository>,
    pub cards: Arc<dyn CardRepository>,
    pub executions: Arc<dyn ExecutionRepository>,
    pub worktrees: Arc<dyn WorktreeManager>,
    pub workflow: Arc<WorkflowEngine>,
    pub event_bus: Arc<EventBus>,
}
