//! HTTP request/response DTOs: camelCase wire shapes translated to/from the
//! snake_case domain models at the boundary, the same separation the
//! teacher keeps between its `TaskResponse` and `Task`.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::models::{Card, Column, Execution, ExecutionLog, Goal, TokenUsage};
use crate::domain::ports::Worktree;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEnvelope {
    pub success: bool,
    pub error: String,
    pub kind: String,
}

impl ErrorEnvelope {
    pub fn new(kind: impl Into<String>, error: impl Into<String>) -> Self {
        Self { success: false, error: error.into(), kind: kind.into() }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CardDto {
    pub id: Uuid,
    pub goal_id: Uuid,
    pub title: String,
    pub description: String,
    pub column: String,
    pub spec_path: Option<String>,
    pub is_fix_card: bool,
    pub parent_card_id: Option<Uuid>,
    pub branch_name: Option<String>,
    pub worktree_path: Option<String>,
    pub dependencies: Vec<Uuid>,
    pub created_at: String,
    pub completed_at: Option<String>,
}

impl From<Card> for CardDto {
    fn from(card: Card) -> Self {
        Self {
            id: card.id,
            goal_id: card.goal_id,
            title: card.title,
            description: card.description,
            column: card.column.as_str().to_string(),
            spec_path: card.spec_path,
            is_fix_card: card.is_fix_card,
            parent_card_id: card.parent_card_id,
            branch_name: card.branch_name,
            worktree_path: card.worktree_path,
            dependencies: card.dependencies,
            created_at: card.created_at.to_rfc3339(),
            completed_at: card.completed_at.map(|dt| dt.to_rfc3339()),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalDto {
    pub id: Uuid,
    pub description: String,
    pub status: String,
    pub card_ids: Vec<Uuid>,
    pub total_tokens: i64,
    pub total_cost: f64,
    pub created_at: String,
}

impl From<Goal> for GoalDto {
    fn from(goal: Goal) -> Self {
        Self {
            id: goal.id,
            description: goal.description,
            status: goal.status.as_str().to_string(),
            card_ids: goal.card_ids,
            total_tokens: goal.total_tokens,
            total_cost: goal.total_cost,
            created_at: goal.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsageDto {
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub total_tokens: i64,
}

impl From<TokenUsage> for TokenUsageDto {
    fn from(usage: TokenUsage) -> Self {
        Self { input_tokens: usage.input_tokens, output_tokens: usage.output_tokens, total_tokens: usage.total_tokens }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionDto {
    pub id: Uuid,
    pub card_id: Uuid,
    pub command: String,
    pub status: String,
    pub workflow_stage: String,
    pub workflow_error: Option<String>,
    pub model: String,
    pub is_active: bool,
    pub usage: TokenUsageDto,
    pub cost: f64,
    pub started_at: String,
    pub completed_at: Option<String>,
}

impl From<Execution> for ExecutionDto {
    fn from(execution: Execution) -> Self {
        Self {
            id: execution.id,
            card_id: execution.card_id,
            command: execution.command.as_str().to_string(),
            status: format!("{:?}", execution.status).to_lowercase(),
            workflow_stage: execution.workflow_stage,
            workflow_error: execution.workflow_error,
            model: execution.model,
            is_active: execution.is_active,
            usage: execution.usage.into(),
            cost: execution.cost,
            started_at: execution.started_at.to_rfc3339(),
            completed_at: execution.completed_at.map(|dt| dt.to_rfc3339()),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogDto {
    pub sequence: i64,
    pub log_type: String,
    pub content: String,
    pub timestamp: String,
}

impl From<ExecutionLog> for LogDto {
    fn from(log: ExecutionLog) -> Self {
        Self {
            sequence: log.sequence,
            log_type: format!("{:?}", log.log_type).to_lowercase(),
            content: log.content,
            timestamp: log.timestamp.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchDto {
    pub card_id: Uuid,
    pub branch_name: String,
    pub path: String,
    pub base_branch: String,
}

impl From<Worktree> for BranchDto {
    fn from(worktree: Worktree) -> Self {
        Self {
            card_id: worktree.card_id,
            branch_name: worktree.branch_name,
            path: worktree.path,
            base_branch: worktree.base_branch,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutePlanRequest {
    pub card_id: Uuid,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteStageRequest {
    pub card_id: Uuid,
    pub spec_path: String,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteStageResponse {
    pub success: bool,
    pub card_id: Uuid,
    pub result: String,
    pub logs: Vec<LogDto>,
    pub spec_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fix_card_created: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fix_card_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogsResponse {
    pub execution: Option<ExecutionDto>,
    pub logs: Vec<LogDto>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryResponse {
    pub executions: Vec<ExecutionDto>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveCardRequest {
    pub column_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceRequest {
    #[serde(default)]
    pub base_branch: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceResponse {
    pub success: bool,
    pub branch: BranchDto,
}

pub fn parse_column(s: &str) -> Option<Column> {
    Column::from_str(s)
}
