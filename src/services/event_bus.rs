//! EventBus: best-effort push notifications over a broadcast channel.
//!
//! Modeled after the teacher's broadcast-based event bus, pared down to
//! what this orchestrator's external interfaces need: a WebSocket fan-out
//! of tick decisions, card moves and execution events. Delivery is
//! best-effort — a lagging subscriber misses events rather than slowing
//! down the orchestrator loop.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::domain::models::{Column, Decision};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrchestratorEvent {
    TickDecided { tick: i64, decision: Decision, at: DateTime<Utc> },
    CardMoved { card_id: Uuid, from: Column, to: Column, at: DateTime<Utc> },
    ExecutionLogAppended { execution_id: Uuid, sequence: i64, content: String, at: DateTime<Utc> },
    GoalCompleted { goal_id: Uuid, at: DateTime<Utc> },
}

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<OrchestratorEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OrchestratorEvent> {
        self.sender.subscribe()
    }

    /// Publish is best-effort: `Err` only happens when there are zero
    /// subscribers, which is not an error condition for this bus.
    pub fn publish(&self, event: OrchestratorEvent) {
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        bus.publish(OrchestratorEvent::GoalCompleted { goal_id: Uuid::nil(), at: Utc::now() });

        let event = rx.recv().await.unwrap();
        assert!(matches!(event, OrchestratorEvent::GoalCompleted { .. }));
    }

    #[tokio::test]
    async fn publish_without_subscribers_does_not_panic() {
        let bus = EventBus::new(16);
        bus.publish(OrchestratorEvent::GoalCompleted { goal_id: Uuid::nil(), at: Utc::now() });
    }

    #[test]
    fn recv_stays_pending_until_a_message_is_published() {
        let bus = EventBus::new(16);
        let rx = bus.subscribe();
        let mut task = tokio_test::task::spawn(async move {
            let mut rx = rx;
            rx.recv().await
        });

        tokio_test::assert_pending!(task.poll());
        bus.publish(OrchestratorEvent::GoalCompleted { goal_id: Uuid::nil(), at: Utc::now() });
        tokio_test::assert_ready!(task.poll());
    }
}
