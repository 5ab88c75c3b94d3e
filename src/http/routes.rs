//! The Command API: one `axum::Router` implementing spec §6's HTTP
//! surface. Handlers translate DTOs at the boundary and delegate to
//! `WorkflowEngine`/repositories; the uniform error envelope mirrors the
//! teacher's `(StatusCode, Json<ErrorResponse>)` handler return shape.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::instrument;
use uuid::Uuid;

use crate::domain::errors::OrchestratorError;
use crate::domain::models::StageCommand;
use crate::domain::ports::CardFilter;
use crate::http::dto::{
    parse_column, BranchDto, CardDto, ErrorEnvelope, ExecutePlanRequest, ExecuteStageRequest,
    ExecuteStageResponse, GoalDto, HistoryResponse, LogDto, LogsResponse, MoveCardRequest,
    WorkspaceRequest, WorkspaceResponse,
};
use crate::http::state::AppState;
use crate::http::ws;
use crate::services::SingleStageOutcome;

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/execute-plan", post(execute_plan))
        .route("/api/execute-implement", post(execute_implement))
        .route("/api/execute-test", post(execute_test))
        .route("/api/execute-review", post(execute_review))
        .route("/api/logs/{card_id}", get(get_logs))
        .route("/api/logs/{card_id}/history", get(get_logs_history))
        .route("/api/cards/{id}/move", patch(move_card))
        .route("/api/cards/{id}/workspace", post(create_workspace))
        .route("/api/branches", get(list_branches))
        .route("/api/cleanup-orphan-worktrees", post(cleanup_orphan_worktrees))
        .route("/api/goals/{id}", get(get_goal))
        .route("/api/cards/ws", get(ws::cards_ws))
        .route("/api/execution/ws/{card_id}", get(ws::execution_ws))
        .route("/health", get(health))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
}

async fn health() -> &'static str {
    "ok"
}

fn error_response(err: OrchestratorError) -> Response {
    let status = match &err {
        OrchestratorError::InvalidTransition { .. } | OrchestratorError::MissingSpec(_) => StatusCode::BAD_REQUEST,
        OrchestratorError::NotFound { .. } => StatusCode::NOT_FOUND,
        OrchestratorError::StoreConflict { .. } | OrchestratorError::WorktreeLimit { .. } => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(ErrorEnvelope::new(err.kind(), err.to_string()))).into_response()
}

async fn stage_response(
    state: &AppState,
    card_id: Uuid,
    command: StageCommand,
    spec_path: Option<String>,
    model: Option<String>,
) -> Result<ExecuteStageResponse, OrchestratorError> {
    let (card, outcome) = state.workflow.run_single_stage(card_id, command, spec_path, model).await?;
    let recent = state.executions.list_by_card(card_id).await?;
    let logs = match recent.first() {
        Some(execution) => state.executions.list_logs(execution.id).await?.into_iter().map(LogDto::from).collect(),
        None => Vec::new(),
    };

    let (success, result, fix_card_created, fix_card_id) = match outcome {
        SingleStageOutcome::Success { usage, cost } => {
            (true, format!("{} tokens, ${cost:.4}", usage.total_tokens), None, None)
        }
        SingleStageOutcome::AgentError(message) => (false, message, None, None),
        SingleStageOutcome::TestFailed { fix_card_id } => {
            (false, "test failure detected".to_string(), Some(true), Some(fix_card_id))
        }
    };

    Ok(ExecuteStageResponse {
        success,
        card_id: card.id,
        result,
        logs,
        spec_path: card.spec_path,
        fix_card_created,
        fix_card_id,
    })
}

#[instrument(skip(state, req))]
async fn execute_plan(State(state): State<Arc<AppState>>, Json(req): Json<ExecutePlanRequest>) -> Response {
    let result = async {
        let mut card = state
            .cards
            .get(req.card_id)
            .await?
            .ok_or_else(|| OrchestratorError::NotFound { entity: "card".to_string(), id: req.card_id.to_string() })?;
        card.title = req.title;
        if let Some(description) = req.description {
            card.description = description;
        }
        state.cards.update(&card).await?;
        stage_response(&state, req.card_id, StageCommand::Plan, None, req.model).await
    }
    .await;

    match result {
        Ok(resp) => Json(resp).into_response(),
        Err(err) => error_response(err),
    }
}

async fn execute_stage(state: Arc<AppState>, req: ExecuteStageRequest, command: StageCommand) -> Response {
    match stage_response(&state, req.card_id, command, Some(req.spec_path), req.model).await {
        Ok(resp) => Json(resp).into_response(),
        Err(err) => error_response(err),
    }
}

async fn execute_implement(State(state): State<Arc<AppState>>, Json(req): Json<ExecuteStageRequest>) -> Response {
    execute_stage(state, req, StageCommand::Implement).await
}

async fn execute_test(State(state): State<Arc<AppState>>, Json(req): Json<ExecuteStageRequest>) -> Response {
    execute_stage(state, req, StageCommand::TestImplementation).await
}

async fn execute_review(State(state): State<Arc<AppState>>, Json(req): Json<ExecuteStageRequest>) -> Response {
    execute_stage(state, req, StageCommand::Review).await
}

async fn get_logs(State(state): State<Arc<AppState>>, Path(card_id): Path<Uuid>) -> Response {
    let result = async {
        let active = state.executions.active_for_card(card_id).await?;
        let logs = match &active {
            Some(execution) => state.executions.list_logs(execution.id).await?.into_iter().map(LogDto::from).collect(),
            None => Vec::new(),
        };
        Ok::<_, OrchestratorError>(LogsResponse { execution: active.map(Into::into), logs })
    }
    .await;

    match result {
        Ok(resp) => Json(resp).into_response(),
        Err(err) => error_response(err),
    }
}

async fn get_logs_history(State(state): State<Arc<AppState>>, Path(card_id): Path<Uuid>) -> Response {
    match state.executions.list_by_card(card_id).await {
        Ok(executions) => Json(HistoryResponse { executions: executions.into_iter().map(Into::into).collect() }).into_response(),
        Err(err) => error_response(err),
    }
}

async fn move_card(State(state): State<Arc<AppState>>, Path(id): Path<Uuid>, Json(req): Json<MoveCardRequest>) -> Response {
    let result = async {
        let column = parse_column(&req.column_id).ok_or_else(|| OrchestratorError::InvalidTransition {
            from: "unknown".to_string(),
            to: req.column_id.clone(),
            allowed: "backlog, plan, implement, test, review, done, completed, archived, cancelled".to_string(),
        })?;
        let before = state
            .cards
            .get(id)
            .await?
            .ok_or_else(|| OrchestratorError::NotFound { entity: "card".to_string(), id: id.to_string() })?
            .column;
        let card = state.cards.move_column(id, column).await?;
        state.event_bus.publish(crate::services::OrchestratorEvent::CardMoved {
            card_id: id,
            from: before,
            to: column,
            at: chrono::Utc::now(),
        });
        Ok::<_, OrchestratorError>(card)
    }
    .await;

    match result {
        Ok(card) => Json(CardDto::from(card)).into_response(),
        Err(err) => error_response(err),
    }
}

async fn create_workspace(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<WorkspaceRequest>,
) -> Response {
    match state.worktrees.create(id, req.base_branch).await {
        Ok(worktree) => Json(WorkspaceResponse { success: true, branch: BranchDto::from(worktree) }).into_response(),
        Err(err) => error_response(err),
    }
}

async fn list_branches(State(state): State<Arc<AppState>>) -> Response {
    match state.worktrees.active().await {
        Ok(worktrees) => Json(worktrees.into_iter().map(BranchDto::from).collect::<Vec<_>>()).into_response(),
        Err(err) => error_response(err),
    }
}

async fn cleanup_orphan_worktrees(State(state): State<Arc<AppState>>) -> Response {
    let active_ids = match state.cards.list(CardFilter::default()).await {
        Ok(cards) => cards.into_iter().filter(|c| c.column.is_executable()).map(|c| c.id).collect::<Vec<_>>(),
        Err(err) => return error_response(err),
    };

    match state.worktrees.cleanup_orphans(&active_ids).await {
        Ok(removed) => Json(serde_json::json!({ "success": true, "removed": removed })).into_response(),
        Err(err) => error_response(err),
    }
}

async fn get_goal(State(state): State<Arc<AppState>>, Path(id): Path<Uuid>) -> Response {
    match state.goals.get(id).await {
        Ok(Some(goal)) => Json(GoalDto::from(goal)).into_response(),
        Ok(None) => error_response(OrchestratorError::NotFound { entity: "goal".to_string(), id: id.to_string() }),
        Err(err) => error_response(err),
    }
}

