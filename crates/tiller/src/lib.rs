#![allow(clippy::print_stdout, clippy::print_stderr)]

pub mod cli;
pub mod commands;
pub mod history;
pub mod render;
pub mod session_config;
pub mod slash;

pub use tiller_core::{AgentEvent, AgentSession, SessionConfig, TurnOutcome};
