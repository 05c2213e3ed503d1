//! Intent Analyzer - selects how a message is classified.
//!
//! Uses a two-tier intent classification:
//! 1. Fast regex patterns (no backend call)
//! 2. Model-backed classification if regex confidence is low

use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::actors::messages::AppError;
use crate::actors::traits::LlmActor;
use crate::brain::intent::{IntentClassifier, IntentResult};
use crate::brain::semantic_intent::SemanticIntentClassifier;
use crate::models::Turn;

/// Regex confidence at or above which the model is not consulted.
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.6;

/// The single boundary every classification strategy sits behind.
#[async_trait]
pub trait IntentStrategy: Send + Sync {
    /// Classifies `message` given the turns that precede it.
    ///
    /// Fails with `AppError::Classification` when a backend call was needed and failed.
    async fn classify(
        &self,
        message: &str,
        history: &[Turn],
        model: &str,
    ) -> Result<IntentResult, AppError>;
}

#[async_trait]
impl IntentStrategy for IntentClassifier {
    async fn classify(
        &self,
        message: &str,
        history: &[Turn],
        _model: &str,
    ) -> Result<IntentResult, AppError> {
        Ok(IntentClassifier::classify(self, message, history))
    }
}

/// Which classification strategy to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassifierKind {
    /// Regex patterns only.
    Keyword,
    /// Always ask the model.
    Model,
    /// Regex first, model when regex is unsure.
    #[default]
    Hybrid,
}

impl FromStr for ClassifierKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "keyword" | "regex" => Ok(ClassifierKind::Keyword),
            "model" | "llm" => Ok(ClassifierKind::Model),
            "hybrid" => Ok(ClassifierKind::Hybrid),
            other => Err(AppError::Config(format!("Unknown classifier strategy: {}", other))),
        }
    }
}

/// Two-tier classifier: regex fast path, model fallback.
pub struct IntentAnalyzer<L: LlmActor> {
    keyword: IntentClassifier,
    semantic: SemanticIntentClassifier<L>,
    threshold: f32,
}

impl<L: LlmActor> IntentAnalyzer<L> {
    pub fn new(llm: Arc<L>) -> Self {
        Self::with_threshold(llm, DEFAULT_CONFIDENCE_THRESHOLD)
    }

    pub fn with_threshold(llm: Arc<L>, threshold: f32) -> Self {
        Self {
            keyword: IntentClassifier::new(),
            semantic: SemanticIntentClassifier::new(llm),
            threshold,
        }
    }
}

#[async_trait]
impl<L: LlmActor> IntentStrategy for IntentAnalyzer<L> {
    async fn classify(
        &self,
        message: &str,
        history: &[Turn],
        model: &str,
    ) -> Result<IntentResult, AppError> {
        let start = Instant::now();
        let fast = self.keyword.classify(message, history);

        if fast.confidence >= self.threshold || message.trim().is_empty() {
            debug!(intent = %fast.intent, confidence = fast.confidence, "Regex classification accepted");
            return Ok(fast);
        }

        info!(
            "Regex confidence {:.2} below {:.2} (best guess {}), asking model",
            fast.confidence, self.threshold, fast.intent
        );
        let result = self.semantic.classify(message, history, model).await?;
        debug!(elapsed_ms = start.elapsed().as_millis() as u64, "Model classification done");
        Ok(result)
    }
}

/// Builds the configured strategy over a gateway.
pub fn build_strategy<L: LlmActor>(kind: ClassifierKind, llm: Arc<L>) -> Arc<dyn IntentStrategy> {
    match kind {
        ClassifierKind::Keyword => Arc::new(IntentClassifier::new()),
        ClassifierKind::Model => Arc::new(SemanticIntentClassifier::new(llm)),
        ClassifierKind::Hybrid => Arc::new(IntentAnalyzer::new(llm)),
    }
}
