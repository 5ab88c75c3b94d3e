//! AgentAdapter port: the LLM back-end boundary. A single stage invocation
//! streams a sequence of `Event`s and resolves to a final `Outcome`.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::domain::errors::OrchestratorResult;
use crate::domain::models::{StageCommand, TokenUsage};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    Text { content: String },
    ToolUse { name: String, input: serde_json::Value },
    Result { usage: TokenUsage },
    Error { message: String },
}

/// Everything a back-end needs to run one stage. `prompt` is the short
/// command-string form sent verbatim to the primary back-end; the
/// secondary back-end ignores it and builds its own natural-language
/// brief from `command`/`title`/`description`/`spec_path` instead (spec
/// §6's stage prompt contract specifies distinct prompt shapes per
/// back-end). `command` is `None` for requests that don't correspond to
/// one of the four SDLC stages (the goal decomposer); the secondary
/// back-end falls back to sending `prompt` verbatim in that case.
#[derive(Debug, Clone)]
pub struct StageRequest {
    pub model: String,
    pub working_dir: String,
    pub command: Option<StageCommand>,
    pub prompt: String,
    pub title: String,
    pub description: String,
    pub spec_path: Option<String>,
}

#[async_trait]
pub trait AgentAdapter: Send + Sync {
    /// Run one stage invocation, streaming its events as they arrive.
    /// Picks the primary or secondary back-end by matching `request.model`
    /// against the configured model-id prefixes.
    async fn run_stage(&self, request: StageRequest) -> OrchestratorResult<BoxStream<'static, Event>>;
}
