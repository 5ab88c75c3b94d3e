//! Composition root: wires adapters to ports, builds the services, and
//! dispatches to whichever CLI subcommand the operator invoked.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use cardforge::adapters::agent::{DualAgentAdapter, PrimaryAgentAdapter, SecondaryAgentAdapter};
use cardforge::adapters::git::GitWorktreeManager;
use cardforge::adapters::sqlite::{
    initialize_database, SqliteCardRepository, SqliteExecutionRepository, SqliteGoalRepository,
    SqliteOrchestratorLogRepository, SqliteShortTermMemory,
};
use cardforge::adapters::vector::{HttpEmbeddingProvider, QdrantLongTermMemory};
use cardforge::cli::commands::{card, goal, logs, serve, tick};
use cardforge::cli::{Cli, Commands};
use cardforge::config::ConfigLoader;
use cardforge::domain::ports::{
    CardRepository, ExecutionRepository, GoalRepository, OrchestratorLogRepository, WorktreeManager,
};
use cardforge::http::AppState;
use cardforge::services::usage_budget::BudgetCaps;
use cardforge::services::{Decomposer, EventBus, Orchestrator, SqliteUsageBudget, WorkflowEngine};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = ConfigLoader::load().context("failed to load configuration")?;
    let _logging_guard = cardforge::logging::init(&config.log_dir).context("failed to initialize logging")?;

    let pool = initialize_database(&config.database.url).await.context("failed to initialize database")?;

    let goals: Arc<dyn GoalRepository> = Arc::new(SqliteGoalRepository::new(pool.clone()));
    let cards: Arc<dyn CardRepository> = Arc::new(SqliteCardRepository::new(pool.clone()));
    let executions: Arc<dyn ExecutionRepository> = Arc::new(SqliteExecutionRepository::new(pool.clone()));
    let orchestrator_logs = Arc::new(SqliteOrchestratorLogRepository::new(pool.clone()));
    let short_term = Arc::new(SqliteShortTermMemory::new(pool.clone(), config.memory.short_term_ttl_secs));

    let worktrees: Arc<dyn WorktreeManager> = Arc::new(GitWorktreeManager::new(
        ".",
        &config.worktree.root,
        config.worktree.max_concurrent,
        pool.clone(),
    ));
    worktrees.recover_state().await.context("failed to reconcile worktree state at startup")?;

    let agent_timeout = Duration::from_secs(config.agent.timeout_secs);
    let primary_agent =
        PrimaryAgentAdapter::new(config.agent.primary_cli_path.clone(), config.agent.primary_model_prefix.clone(), agent_timeout);
    let secondary_agent = match (&config.agent.secondary_cli_path, &config.agent.secondary_model_prefix) {
        (Some(cli_path), Some(prefix)) => Some(SecondaryAgentAdapter::new(cli_path.clone(), prefix.clone(), agent_timeout)),
        _ => None,
    };
    let agent = Arc::new(DualAgentAdapter::new(primary_agent, secondary_agent));

    let embedder = Arc::new(HttpEmbeddingProvider::new(
        config.vector_store.endpoint.clone(),
        config.vector_store.embedding_model.clone(),
    ));
    let long_term = Arc::new(QdrantLongTermMemory::new(
        config.vector_store.endpoint.clone(),
        config.vector_store.collection.clone(),
        config.vector_store.vector_size,
        embedder,
    ));

    let budget = Arc::new(SqliteUsageBudget::new(
        pool.clone(),
        config.budget,
        BudgetCaps {
            session_token_cap: config.budget.session_token_cap,
            daily_token_cap: config.budget.daily_token_cap,
        },
    ));

    let event_bus = Arc::new(EventBus::default());
    let workflow = Arc::new(WorkflowEngine::new(cards.clone(), executions.clone(), worktrees.clone(), agent.clone(), event_bus.clone()));
    let decomposer = Arc::new(Decomposer::new(agent.clone(), config.agent.primary_model_prefix.clone()));

    let starting_tick = orchestrator_logs.last_tick().await.context("failed to read last tick")?;
    let orchestrator = Arc::new(Orchestrator::new(
        goals.clone(),
        cards.clone(),
        orchestrator_logs.clone(),
        short_term.clone(),
        long_term.clone(),
        budget.clone(),
        worktrees.clone(),
        event_bus.clone(),
        workflow.clone(),
        decomposer.clone(),
        config.budget.block_pct,
        config.worktree.max_concurrent,
        config.memory.long_term_query_threshold,
        starting_tick,
    ));

    match cli.command {
        Commands::Goal(goal_cmd) => match goal_cmd {
            cardforge::cli::GoalCommands::Submit { description, source } => {
                goal::handle_submit(&goals, description, source, cli.json).await?;
            }
            cardforge::cli::GoalCommands::List { status } => goal::handle_list(&goals, status, cli.json).await?,
            cardforge::cli::GoalCommands::Show { goal_id } => goal::handle_show(&goals, goal_id, cli.json).await?,
        },
        Commands::Card(card_cmd) => match card_cmd {
            cardforge::cli::CardCommands::List { goal_id } => card::handle_list(&cards, goal_id, cli.json).await?,
            cardforge::cli::CardCommands::Show { card_id } => card::handle_show(&cards, card_id, cli.json).await?,
            cardforge::cli::CardCommands::Move { card_id, column } => {
                card::handle_move(&cards, card_id, column, cli.json).await?;
            }
        },
        Commands::Tick => tick::handle_tick(&orchestrator, cli.json).await?,
        Commands::Logs { card_id, follow } => logs::handle_tail(&executions, card_id, follow).await?,
        Commands::Serve { port } => {
            let state = Arc::new(AppState {
                goals: goals.clone(),
                cards: cards.clone(),
                executions: executions.clone(),
                worktrees: worktrees.clone(),
                workflow: workflow.clone(),
                event_bus: event_bus.clone(),
            });
            let bind_addr = match port {
                Some(port) => format!("0.0.0.0:{port}"),
                None => config.http.bind_addr.clone(),
            };
            serve::handle_serve(
                state,
                orchestrator,
                bind_addr,
                Duration::from_secs(config.loop_interval_secs),
                config.enabled,
            )
            .await?;
        }
    }

    Ok(())
}
