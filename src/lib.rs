//! cardforge — an autonomous coding orchestrator.
//!
//! Decomposes goals into cards, drives each through a fixed SDLC
//! (`plan -> implement -> test -> review -> done`) inside an isolated git
//! worktree, via an LLM coding agent reached over HTTP. A tick loop
//! (`services::Orchestrator`) reads recent state, decides one action, and
//! acts — see `services::orchestrator` for the full READ/QUERY/THINK/ACT/
//! RECORD/LEARN cycle.

pub mod adapters;
pub mod cli;
pub mod config;
pub mod domain;
pub mod http;
pub mod logging;
pub mod services;
