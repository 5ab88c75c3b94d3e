//! `cardforge goal ...` commands.

use std::sync::Arc;

use anyhow::Result;
use comfy_table::{Attribute, Cell, Color};
use uuid::Uuid;

use crate::cli::output::{base_table, output, supports_color, CommandOutput};
use crate::domain::models::{Goal, GoalSource, GoalStatus};
use crate::domain::ports::GoalRepository;

#[derive(Debug, serde::Serialize)]
pub struct GoalOutput {
    pub id: String,
    pub description: String,
    pub status: String,
    pub card_count: usize,
    pub total_tokens: i64,
    pub total_cost: f64,
    pub created_at: String,
}

impl From<&Goal> for GoalOutput {
    fn from(goal: &Goal) -> Self {
        Self {
            id: goal.id.to_string(),
            description: goal.description.clone(),
            status: goal.status.as_str().to_string(),
            card_count: goal.card_ids.len(),
            total_tokens: goal.total_tokens,
            total_cost: goal.total_cost,
            created_at: goal.created_at.to_rfc3339(),
        }
    }
}

impl CommandOutput for GoalOutput {
    fn to_human(&self) -> String {
        format!(
            "Goal {} [{}]\n  {}\n  cards: {}  tokens: {}  cost: ${:.2}\n  created: {}",
            self.id, self.status, self.description, self.card_count, self.total_tokens, self.total_cost, self.created_at
        )
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

#[derive(Debug, serde::Serialize)]
pub struct GoalListOutput {
    pub goals: Vec<GoalOutput>,
}

impl CommandOutput for GoalListOutput {
    fn to_human(&self) -> String {
        if self.goals.is_empty() {
            return "No goals found.".to_string();
        }

        let use_colors = supports_color();
        let mut table = base_table();
        table.set_header(vec![
            Cell::new("ID").add_attribute(Attribute::Bold),
            Cell::new("Status").add_attribute(Attribute::Bold),
            Cell::new("Description").add_attribute(Attribute::Bold),
        ]);

        for goal in &self.goals {
            let status_cell = if use_colors {
                Cell::new(&goal.status).fg(status_color(&goal.status))
            } else {
                Cell::new(&goal.status)
            };
            table.add_row(vec![Cell::new(&goal.id[..8]), status_cell, Cell::new(&goal.description)]);
        }

        format!("{} goal(s):\n{table}", self.goals.len())
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

fn status_color(status: &str) -> Color {
    match status {
        "completed" => Color::Green,
        "active" => Color::Cyan,
        "failed" => Color::Red,
        _ => Color::Yellow,
    }
}

pub async fn handle_submit(goals: &Arc<dyn GoalRepository>, description: String, source: String, json: bool) -> Result<()> {
    let goal = Goal::new(description, GoalSource { source, source_id: String::new() });
    goals.create(&goal).await?;
    output(&GoalOutput::from(&goal), json);
    Ok(())
}

pub async fn handle_list(goals: &Arc<dyn GoalRepository>, status: Option<String>, json: bool) -> Result<()> {
    let all = match status.and_then(|s| GoalStatus::from_str(&s)) {
        Some(status) => goals.list_by_status(status).await?,
        None => {
            let mut all = Vec::new();
            for status in [GoalStatus::Pending, GoalStatus::Active, GoalStatus::Completed, GoalStatus::Failed] {
                all.extend(goals.list_by_status(status).await?);
            }
            all
        }
    };
    output(&GoalListOutput { goals: all.iter().map(GoalOutput::from).collect() }, json);
    Ok(())
}

pub async fn handle_show(goals: &Arc<dyn GoalRepository>, goal_id: Uuid, json: bool) -> Result<()> {
    match goals.get(goal_id).await? {
        Some(goal) => output(&GoalOutput::from(&goal), json),
        None => anyhow::bail!("goal {goal_id} not found"),
    }
    Ok(())
}
