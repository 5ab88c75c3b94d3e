//! Routes a stage request to the primary or secondary back-end by the
//! requested model's prefix, the one `AgentAdapter` the rest of the crate
//! depends on.

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::adapters::agent::{PrimaryAgentAdapter, SecondaryAgentAdapter};
use crate::domain::errors::{OrchestratorError, OrchestratorResult};
use crate::domain::ports::{AgentAdapter, Event, StageRequest};

pub struct DualAgentAdapter {
    primary: PrimaryAgentAdapter,
    secondary: Option<SecondaryAgentAdapter>,
}

impl DualAgentAdapter {
    pub fn new(primary: PrimaryAgentAdapter, secondary: Option<SecondaryAgentAdapter>) -> Self {
        Self { primary, secondary }
    }
}

#[async_trait]
impl AgentAdapter for DualAgentAdapter {
    async fn run_stage(&self, request: StageRequest) -> OrchestratorResult<BoxStream<'static, Event>> {
        if self.primary.matches(&request.model) {
            return self.primary.run_stage(request).await;
        }
        if let Some(secondary) = &self.secondary {
            if secondary.matches(&request.model) {
                return secondary.run_stage(request).await;
            }
        }
        Err(OrchestratorError::AgentError(format!(
            "no configured back-end matches model prefix for '{}'",
            request.model
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn run_stage_rejects_unmatched_model_prefix() {
        let adapter = DualAgentAdapter::new(PrimaryAgentAdapter::new("claude", "sonnet-", Duration::from_secs(5)), None);
        let request = StageRequest {
            model: "gpt-4".to_string(),
            working_dir: ".".to_string(),
            command: None,
            prompt: "hi".to_string(),
            title: String::new(),
            description: String::new(),
            spec_path: None,
        };
        assert!(adapter.run_stage(request).await.is_err());
    }
}
