//! Operator CLI: submit goals, inspect/move cards, tail logs, run a
//! single tick, or serve the HTTP API. A thin `clap` front over the same
//! ports and services the orchestrator loop uses.

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "cardforge")]
#[command(about = "Autonomous coding orchestrator", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Goal management
    #[command(subcommand)]
    Goal(GoalCommands),

    /// Card inspection and manual transitions
    #[command(subcommand)]
    Card(CardCommands),

    /// Run exactly one orchestrator tick and print the decision taken
    Tick,

    /// Tail an execution's logs for a card
    Logs {
        card_id: Uuid,
        /// Keep polling for new log lines
        #[arg(short, long)]
        follow: bool,
    },

    /// Serve the HTTP Command API and run the orchestrator loop
    Serve {
        /// Overrides `http.bind_addr`'s port; the configured bind address
        /// is used as-is when this is omitted
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[derive(Subcommand)]
pub enum GoalCommands {
    /// Submit a new goal
    Submit {
        description: String,
        /// Where this goal originated (cli, http, schedule, ...)
        #[arg(long, default_value = "cli")]
        source: String,
    },
    /// List goals
    List {
        #[arg(short, long)]
        status: Option<String>,
    },
    /// Show goal details
    Show { goal_id: Uuid },
}

#[derive(Subcommand)]
pub enum CardCommands {
    /// List cards for a goal
    List { goal_id: Uuid },
    /// Show card details
    Show { card_id: Uuid },
    /// Manually move a card to a different column
    Move { card_id: Uuid, column: String },
}
