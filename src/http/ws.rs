//! WebSocket fan-out: `/api/cards/ws` streams card/tick events, and
//! `/api/execution/ws/{cardId}` streams one card's live execution log.
//! Both are thin translations of `OrchestratorEvent` broadcasts onto a
//! websocket — delivery is best-effort, matching `EventBus::publish`.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::response::Response;
use tracing::debug;
use uuid::Uuid;

use crate::http::state::AppState;
use crate::services::OrchestratorEvent;

pub async fn cards_ws(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| handle_cards_socket(socket, state))
}

async fn handle_cards_socket(mut socket: WebSocket, state: Arc<AppState>) {
    let mut rx = state.event_bus.subscribe();
    loop {
        tokio::select! {
            event = rx.recv() => {
                let event = match event {
                    Ok(event) => event,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "cards_ws subscriber lagged, dropping missed events");
                        continue;
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                };
                if !matches!(event, OrchestratorEvent::TickDecided { .. } | OrchestratorEvent::CardMoved { .. } | OrchestratorEvent::GoalCompleted { .. }) {
                    continue;
                }
                let Ok(payload) = serde_json::to_string(&event) else { continue };
                if socket.send(Message::Text(payload.into())).await.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(_)) => break,
                }
            }
        }
    }
}

pub async fn execution_ws(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Path(card_id): Path<Uuid>,
) -> Response {
    ws.on_upgrade(move |socket| handle_execution_socket(socket, state, card_id))
}

async fn handle_execution_socket(mut socket: WebSocket, state: Arc<AppState>, card_id: Uuid) {
    let execution_id = match state.executions.active_for_card(card_id).await {
        Ok(Some(execution)) => execution.id,
        Ok(None) => {
            let _ = socket.send(Message::Text("{\"error\":\"no active execution for card\"}".into())).await;
            return;
        }
        Err(err) => {
            let _ = socket.send(Message::Text(format!("{{\"error\":\"{err}\"}}").into())).await;
            return;
        }
    };

    let mut rx = state.event_bus.subscribe();
    loop {
        tokio::select! {
            event = rx.recv() => {
                let event = match event {
                    Ok(event) => event,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "execution_ws subscriber lagged, dropping missed events");
                        continue;
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                };
                let OrchestratorEvent::ExecutionLogAppended { execution_id: id, .. } = &event else { continue };
                if *id != execution_id {
                    continue;
                }
                let Ok(payload) = serde_json::to_string(&event) else { continue };
                if socket.send(Message::Text(payload.into())).await.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(_)) => break,
                }
            }
        }
    }
}
