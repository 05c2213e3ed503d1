//! CodeFlow core: a conversational code assistant.
//!
//! Each user message is classified into one of four actions (chat, generate, optimize,
//! review) and run through a small state machine that chains generation into optimization
//! and loops review/optimize until the code scores at least 90 or the retry budget runs out.
//! Sessions keep their turns and the code in play across messages.
//!
//! The entry point is [`SupervisorHandle`].

pub mod actors;
pub mod brain;
pub mod config;
pub mod error;
pub mod handlers;
pub mod memory;
pub mod models;
pub mod telemetry;
pub mod workflow;

#[cfg(test)]
mod tests;

pub use actors::supervisor::SupervisorHandle;
pub use config::AppConfig;
pub use error::AppError;
pub use models::{ModelEntry, Turn, TurnOutcome};
