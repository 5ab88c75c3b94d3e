//! Primary-back-end implementation of the AgentAdapter port.
//!
//! Shells out to the primary back-end's CLI in "stream-json" mode and
//! parses its stdout as newline-delimited JSON events, following the
//! donor's `infrastructure::substrates::claude_code::ClaudeCodeSubstrate`
//! subprocess-invocation shape (spawn, write the prompt to stdin, drop
//! stdin, read stdout) combined with the donor's
//! `infrastructure::claude::streaming` event-parsing shape (one structured
//! event per line instead of one long transcript).

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use backoff::future::retry;
use backoff::ExponentialBackoffBuilder;
use futures::stream::{self, BoxStream, StreamExt};
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{instrument, warn};

use crate::adapters::agent::ALLOWED_TOOLS;
use crate::domain::errors::{OrchestratorError, OrchestratorResult};
use crate::domain::models::TokenUsage;
use crate::domain::ports::{AgentAdapter, Event, StageRequest};

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireEvent {
    Text { content: String },
    ToolUse { name: String, input: serde_json::Value },
    Result { input_tokens: i64, output_tokens: i64 },
    Error { message: String },
}

impl From<WireEvent> for Event {
    fn from(wire: WireEvent) -> Self {
        match wire {
            WireEvent::Text { content } => Event::Text { content },
            WireEvent::ToolUse { name, input } => Event::ToolUse { name, input },
            WireEvent::Result { input_tokens, output_tokens } => {
                Event::Result { usage: TokenUsage::new(input_tokens, output_tokens) }
            }
            WireEvent::Error { message } => Event::Error { message },
        }
    }
}

pub struct PrimaryAgentAdapter {
    cli_path: String,
    model_prefix: String,
    timeout: Duration,
}

impl PrimaryAgentAdapter {
    pub fn new(cli_path: impl Into<String>, model_prefix: impl Into<String>, timeout: Duration) -> Self {
        Self { cli_path: cli_path.into(), model_prefix: model_prefix.into(), timeout }
    }

    pub fn matches(&self, model: &str) -> bool {
        model.starts_with(&self.model_prefix)
    }

    async fn is_cli_available(&self) -> bool {
        Command::new(&self.cli_path)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|status| status.success())
            .unwrap_or(false)
    }

    fn build_command(&self, request: &StageRequest) -> Command {
        let mut cmd = Command::new(&self.cli_path);
        cmd.current_dir(&request.working_dir)
            .arg("--model")
            .arg(&request.model)
            .arg("--print")
            .arg("--output-format")
            .arg("stream-json")
            .arg("--allowedTools")
            .arg(ALLOWED_TOOLS.join(","))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }
}

#[async_trait]
impl AgentAdapter for PrimaryAgentAdapter {
    #[instrument(skip(self, request), fields(model = %request.model))]
    async fn run_stage(&self, request: StageRequest) -> OrchestratorResult<BoxStream<'static, Event>> {
        let backoff = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(200))
            .with_max_elapsed_time(Some(Duration::from_secs(5)))
            .build();

        if !self.is_cli_available().await {
            return Err(OrchestratorError::AgentError(format!(
                "primary back-end CLI not found at '{}'",
                self.cli_path
            )));
        }

        let mut child = retry(backoff, || async {
            self.build_command(&request).spawn().map_err(|e| {
                warn!(error = %e, "failed to spawn primary back-end, retrying");
                backoff::Error::transient(e)
            })
        })
        .await
        .map_err(|e| OrchestratorError::AgentError(format!("failed to spawn primary back-end: {e}")))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| OrchestratorError::AgentError("failed to open primary back-end stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| OrchestratorError::AgentError("failed to open primary back-end stdout".to_string()))?;

        stdin
            .write_all(request.prompt.as_bytes())
            .await
            .map_err(|e| OrchestratorError::AgentError(format!("failed to write prompt: {e}")))?;
        drop(stdin);

        let timeout_duration = self.timeout;
        let mut lines = BufReader::new(stdout).lines();
        let mut events = Vec::new();

        let read_result = timeout(timeout_duration, async {
            while let Some(line) = lines.next_line().await.map_err(|e| e.to_string())? {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<WireEvent>(&line) {
                    Ok(wire) => events.push(Event::from(wire)),
                    Err(_) => events.push(Event::Text { content: line }),
                }
            }
            Ok::<_, String>(())
        })
        .await;

        match read_result {
            Err(_) => {
                let _ = child.kill().await;
                events.push(Event::Error { message: "timed out".to_string() });
            }
            Ok(Err(message)) => events.push(Event::Error { message }),
            Ok(Ok(())) => {
                let _ = child.wait().await;
            }
        }

        Ok(stream::iter(events).boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_picks_by_model_prefix() {
        let adapter = PrimaryAgentAdapter::new("claude", "sonnet-", Duration::from_secs(30));
        assert!(adapter.matches("sonnet-default"));
        assert!(!adapter.matches("gemini-pro"));
    }
}
