//! Secondary-back-end implementation of the AgentAdapter port.
//!
//! Shells out to the secondary back-end's CLI with an auto-approval flag
//! and a full natural-language brief embedded as stdin, streaming stdout
//! lines as `Text` events. Grounded on the same subprocess-invocation
//! shape as `PrimaryAgentAdapter` (donor's `ClaudeCodeSubstrate`), but the
//! secondary back-end has no structured event protocol, so every line is
//! a `Text` event and no `Result` is ever emitted (token totals default
//! to 0, per spec).

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::time::timeout;

use crate::domain::errors::{OrchestratorError, OrchestratorResult};
use crate::domain::models::StageCommand;
use crate::domain::ports::{AgentAdapter, Event, StageRequest};

pub struct SecondaryAgentAdapter {
    cli_path: String,
    model_prefix: String,
    timeout: Duration,
}

impl SecondaryAgentAdapter {
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
}

/// Each stage's full natural-language brief for the secondary back-end,
/// since it has no notion of the primary's short slash-command prompts.
fn natural_language_prompt(request: &StageRequest) -> String {
    let Some(command) = request.command else {
        return request.prompt.clone();
    };

    match command {
        StageCommand::Plan => format!(
            "You are planning the implementation of a piece of work titled \"{}\".\n\
             Description: {}\n\n\
             Write a complete implementation plan to a new markdown file under specs/ \
             in this repository, covering the approach, the files you expect to touch, \
             and how you will verify the result. State the path you wrote at the end of \
             your response.",
            request.title, request.description
        ),
        StageCommand::Implement => format!(
            "Implement the plan written at {}.\n\
             Make every code change the plan calls for, staying within its scope. \
             Do not modify the plan file itself.",
            request.spec_path.as_deref().unwrap_or("the card's spec file")
        ),
        StageCommand::TestImplementation => format!(
            "Run the test suite covering the implementation described at {}.\n\
             Report whether the tests pass. If any test fails, quote the failure output \
             verbatim so it can be diagnosed.",
            request.spec_path.as_deref().unwrap_or("the card's spec file")
        ),
        StageCommand::Review => format!(
            "Review the changes made for the plan at {}.\n\
             Check correctness against the plan, look for security issues, and flag \
             anything that doesn't match this repository's conventions.",
            request.spec_path.as_deref().unwrap_or("the card's spec file")
        ),
    }
}

#[async_trait]
impl AgentAdapter for SecondaryAgentAdapter {
    async fn run_stage(&self, request: StageRequest) -> OrchestratorResult<BoxStream<'static, Event>> {
        if !self.is_cli_available().await {
            return Err(OrchestratorError::AgentError(format!(
                "secondary back-end CLI not found at '{}'",
                self.cli_path
            )));
        }

        let prompt = natural_language_prompt(&request);

        let mut child = Command::new(&self.cli_path)
            .current_dir(&request.working_dir)
            .arg("--model")
            .arg(&request.model)
            .arg("--yolo")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| OrchestratorError::AgentError(format!("failed to spawn secondary back-end: {e}")))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| OrchestratorError::AgentError("failed to open secondary back-end stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| OrchestratorError::AgentError("failed to open secondary back-end stdout".to_string()))?;

        stdin
            .write_all(prompt.as_bytes())
            .await
            .map_err(|e| OrchestratorError::AgentError(format!("failed to write prompt: {e}")))?;
        drop(stdin);

        let mut lines = BufReader::new(stdout).lines();
        let mut events = Vec::new();

        let read_result = timeout(self.timeout, async {
            while let Some(line) = lines.next_line().await.map_err(|e| e.to_string())? {
                events.push(Event::Text { content: line });
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
        let adapter = SecondaryAgentAdapter::new("gemini", "gemini-", Duration::from_secs(30));
        assert!(adapter.matches("gemini-pro"));
        assert!(!adapter.matches("sonnet-default"));
    }

    #[test]
    fn natural_language_prompt_embeds_spec_path_for_non_plan_stages() {
        let request = StageRequest {
            model: "gemini-pro".to_string(),
            working_dir: "/tmp".to_string(),
            command: Some(StageCommand::Implement),
            prompt: "/implement specs/foo.md".to_string(),
            title: "Foo".to_string(),
            description: "Do foo".to_string(),
            spec_path: Some("specs/foo.md".to_string()),
        };
        let prompt = natural_language_prompt(&request);
        assert!(prompt.contains("specs/foo.md"));
        assert!(!prompt.contains("/implement"));
    }

    #[test]
    fn natural_language_prompt_falls_back_to_raw_prompt_without_a_command() {
        let request = StageRequest {
            model: "gemini-pro".to_string(),
            working_dir: ".".to_string(),
            command: None,
            prompt: "decompose this goal".to_string(),
            title: String::new(),
            description: String::new(),
            spec_path: None,
        };
        assert_eq!(natural_language_prompt(&request), "decompose this goal");
    }
}
