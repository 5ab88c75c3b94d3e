//! The Command API and WebSocket API (spec §6): axum on top of the same
//! ports and services the CLI and the tick loop use.

pub mod dto;
pub mod routes;
pub mod state;
pub mod ws;

pub use routes::build_router;
pub use state::AppState;
