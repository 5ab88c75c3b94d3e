//! `cardforge card ...` commands.

use std::sync::Arc;

use anyhow::Result;
use comfy_table::{Attribute, Cell, Color};
use uuid::Uuid;

use crate::cli::output::{base_table, output, supports_color, truncate, CommandOutput};
use crate::domain::models::Card;
use crate::domain::ports::CardRepository;

#[derive(Debug, serde::Serialize)]
pub struct CardOutput {
    pub id: String,
    pub goal_id: String,
    pub title: String,
    pub column: String,
    pub is_fix_card: bool,
    pub spec_path: Option<String>,
}

impl From<&Card> for CardOutput {
    fn from(card: &Card) -> Self {
        Self {
            id: card.id.to_string(),
            goal_id: card.goal_id.to_string(),
            title: card.title.clone(),
            column: card.column.as_str().to_string(),
            is_fix_card: card.is_fix_card,
            spec_path: card.spec_path.clone(),
        }
    }
}

impl CommandOutput for CardOutput {
    fn to_human(&self) -> String {
        format!(
            "Card {} [{}]{}\n  goal: {}\n  {}",
            self.id,
            self.column,
            if self.is_fix_card { " (fix)" } else { "" },
            self.goal_id,
            self.title
        )
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

#[derive(Debug, serde::Serialize)]
pub struct CardListOutput {
    pub cards: Vec<CardOutput>,
}

impl CommandOutput for CardListOutput {
    fn to_human(&self) -> String {
        if self.cards.is_empty() {
            return "No cards found.".to_string();
        }

        let use_colors = supports_color();
        let mut table = base_table();
        table.set_header(vec![
            Cell::new("ID").add_attribute(Attribute::Bold),
            Cell::new("Column").add_attribute(Attribute::Bold),
            Cell::new("Title").add_attribute(Attribute::Bold),
        ]);

        for card in &self.cards {
            let column_cell = if use_colors {
                Cell::new(&card.column).fg(column_color(&card.column))
            } else {
                Cell::new(&card.column)
            };
            table.add_row(vec![
                Cell::new(&card.id[..8]),
                column_cell,
                Cell::new(truncate(&card.title, 50)),
            ]);
        }

        format!("{} card(s):\n{table}", self.cards.len())
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

fn column_color(column: &str) -> Color {
    match column {
        "done" | "completed" => Color::Green,
        "implement" | "test" | "review" => Color::Cyan,
        "cancelled" => Color::DarkGrey,
        "archived" => Color::Magenta,
        _ => Color::Yellow,
    }
}

pub async fn handle_list(cards: &Arc<dyn CardRepository>, goal_id: Uuid, json: bool) -> Result<()> {
    let all = cards.list_by_goal(goal_id).await?;
    output(&CardListOutput { cards: all.iter().map(CardOutput::from).collect() }, json);
    Ok(())
}

pub async fn handle_show(cards: &Arc<dyn CardRepository>, card_id: Uuid, json: bool) -> Result<()> {
    match cards.get(card_id).await? {
        Some(card) => output(&CardOutput::from(&card), json),
        None => anyhow::bail!("card {card_id} not found"),
    }
    Ok(())
}

pub async fn handle_move(cards: &Arc<dyn CardRepository>, card_id: Uuid, column: String, json: bool) -> Result<()> {
    let Some(column) = crate::domain::models::Column::from_str(&column) else {
        anyhow::bail!("unknown column '{column}'");
    };
    let card = cards.move_column(card_id, column).await?;
    output(&CardOutput::from(&card), json);
    Ok(())
}
