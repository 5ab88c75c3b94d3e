//! Decomposer: turns a goal description into an ordered, dependency-linked
//! set of cards by asking the LLM agent for a structured breakdown.
//!
//! The decomposer is "an external decomposer (LLM)" per the data-flow
//! description (spec §4.7 ACT/DECOMPOSE) — not one of the nine named ports,
//! so it is built on top of the same `AgentAdapter` boundary the workflow
//! engine uses rather than a new port, the way the teacher's
//! `decomposition_service` style modules reuse an existing LLM port instead
//! of inventing a parallel one.

use std::sync::Arc;

use futures::StreamExt;
use serde::Deserialize;
use tracing::instrument;

use crate::domain::errors::{OrchestratorError, OrchestratorResult};
use crate::domain::models::{Card, Goal};
use crate::domain::ports::{AgentAdapter, Event, StageRequest};

#[derive(Debug, Clone, Deserialize)]
struct DecompositionEntry {
    title: String,
    description: String,
    #[allow(dead_code)]
    order: usize,
    #[serde(default)]
    dependencies: Vec<usize>,
}

pub struct Decomposer {
    agent: Arc<dyn AgentAdapter>,
    model: String,
}

impl Decomposer {
    pub fn new(agent: Arc<dyn AgentAdapter>, model: impl Into<String>) -> Self {
        Self { agent, model: model.into() }
    }

    /// Produce the goal's cards in memory, with `Card.dependencies` already
    /// resolved to sibling card ids. Callers persist each card and append
    /// its id to `goal.card_ids`.
    #[instrument(skip(self, goal), fields(goal_id = %goal.id))]
    pub async fn decompose(&self, goal: &Goal) -> OrchestratorResult<Vec<Card>> {
        let prompt = format!(
            "Decompose the following goal into an ordered list of implementation cards.\n\
             Goal: {}\n\n\
             Respond with a JSON array only, no prose, of the form:\n\
             [{{\"title\": \"...\", \"description\": \"...\", \"order\": 0, \"dependencies\": []}}, ...]\n\
             `dependencies` are zero-based indices into this same array naming earlier entries \
             that must reach `done` before this one is eligible.",
            goal.description
        );

        let request = StageRequest {
            model: self.model.clone(),
            working_dir: ".".to_string(),
            command: None,
            prompt,
            title: format!("Decompose: {}", goal.description),
            description: goal.description.clone(),
            spec_path: None,
        };
        let mut stream = self.agent.run_stage(request).await?;

        let mut buffer = String::new();
        while let Some(event) = stream.next().await {
            match event {
                Event::Text { content } => buffer.push_str(&content),
                Event::Error { message } => return Err(OrchestratorError::AgentError(message)),
                Event::ToolUse { .. } | Event::Result { .. } => {}
            }
        }

        let entries = parse_entries(&buffer)?;

        let mut cards: Vec<Card> = entries
            .iter()
            .map(|entry| Card::new(goal.id, entry.title.clone(), entry.description.clone()))
            .collect();

        for (i, entry) in entries.iter().enumerate() {
            cards[i].dependencies = entry
                .dependencies
                .iter()
                .filter_map(|&dep_index| cards.get(dep_index).map(|c| c.id))
                .collect();
        }

        Ok(cards)
    }
}

fn parse_entries(buffer: &str) -> OrchestratorResult<Vec<DecompositionEntry>> {
    let start = buffer.find('[').ok_or_else(|| OrchestratorError::AgentError("decomposer response had no JSON array".to_string()))?;
    let end = buffer
        .rfind(']')
        .ok_or_else(|| OrchestratorError::AgentError("decomposer response had no JSON array".to_string()))?;
    let json = &buffer[start..=end];
    serde_json::from_str(json).map_err(|e| OrchestratorError::Internal(anyhow::anyhow!("decomposer response was not valid JSON: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_entries_extracts_array_from_surrounding_prose() {
        let buffer = r#"Here is the breakdown:
[{"title": "Add route", "description": "wire the handler", "order": 0, "dependencies": []},
 {"title": "Add test", "description": "cover 200 response", "order": 1, "dependencies": [0]}]
Done."#;
        let entries = parse_entries(buffer).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].dependencies, vec![0]);
    }

    #[test]
    fn parse_entries_rejects_missing_array() {
        assert!(parse_entries("no json here").is_err());
    }
}
