//! # Actors
//!
//! Long-lived tasks reached through cloneable handles.
//!
//! - `llm`: the model gateway (OpenAI-compatible chat completions over HTTP)
//! - `supervisor`: owns the sessions and runs turns through the workflow
//! - `messages`: mailbox message types and the gateway error taxonomy
//! - `traits`: the gateway seam used by handlers and test doubles

pub mod llm;
pub mod messages;
pub mod supervisor;
pub mod traits;
