//! Test Module
//!
//! Cross-module test suites for the CodeFlow core.
//!
//! ## Test Categories
//! - `actor_tests`: scripted gateway double, supervisor over the HTTP gateway
//! - `brain_tests`: intent classification with history, review parsing, outcome shapes
//! - `workflow_tests`: the per-turn state machine end to end
//! - `supervisor_tests`: sessions, atomic commits and concurrency

pub mod supervisor_tests;
