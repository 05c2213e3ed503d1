//! # Brain Module
//!
//! Deterministic analysis around the model calls.
//!
//! ## Components
//! - `intent`: Intent classification using regex patterns (fast path)
//! - `semantic_intent`: Model-backed classification (fallback)
//! - `analyzer`: Strategy boundary and the two-tier analyzer
//! - `artifact`: The code in play and code-block extraction
//! - `review`: Review results and score extraction

pub mod analyzer;
pub mod artifact;
pub mod intent;
pub mod review;
pub mod semantic_intent;

// Re-export main types for convenience
pub use analyzer::{build_strategy, ClassifierKind, IntentAnalyzer, IntentStrategy};
pub use artifact::CodeArtifact;
pub use intent::{Intent, IntentClassifier, IntentResult};
pub use review::{parse_review, ReviewResult, PASS_THRESHOLD};
pub use semantic_intent::SemanticIntentClassifier;
