//! `cardforge logs <card-id>` — tail an execution's log.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use uuid::Uuid;

use crate::domain::ports::ExecutionRepository;

pub async fn handle_tail(executions: &Arc<dyn ExecutionRepository>, card_id: Uuid, follow: bool) -> Result<()> {
    let Some(execution) = executions.active_for_card(card_id).await? else {
        println!("no active execution for card {card_id}");
        return Ok(());
    };

    let mut printed = 0i64;
    loop {
        let logs = executions.list_logs(execution.id).await?;
        for log in logs.iter().filter(|l| l.sequence > printed) {
            println!("[{}] {:?} {}", log.timestamp.to_rfc3339(), log.log_type, log.content);
            printed = log.sequence;
        }

        if !follow {
            break;
        }

        match executions.get(execution.id).await? {
            Some(current) if current.is_active => tokio::time::sleep(Duration::from_millis(500)).await,
            _ => break,
        }
    }

    Ok(())
}
