//! `cardforge tick` — run exactly one orchestrator tick.

use std::sync::Arc;

use anyhow::Result;

use crate::cli::output::{output, CommandOutput};
use crate::services::Orchestrator;

#[derive(Debug, serde::Serialize)]
pub struct TickOutput {
    pub tick: i64,
    pub decision: String,
    pub outcome: Option<String>,
    pub error: Option<String>,
}

impl CommandOutput for TickOutput {
    fn to_human(&self) -> String {
        match (&self.outcome, &self.error) {
            (Some(outcome), _) => format!("tick {} [{}]: {outcome}", self.tick, self.decision),
            (None, Some(error)) => format!("tick {} [{}]: error: {error}", self.tick, self.decision),
            (None, None) => format!("tick {} [{}]: no outcome recorded", self.tick, self.decision),
        }
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

pub async fn handle_tick(orchestrator: &Arc<Orchestrator>, json: bool) -> Result<()> {
    let action = orchestrator.tick().await?;
    output(
        &TickOutput {
            tick: action.tick,
            decision: action.decision.kind().to_string(),
            outcome: action.outcome.clone(),
            error: action.error.clone(),
        },
        json,
    );
    Ok(())
}
