//! Model-backed intent classification.
//!
//! Asks the completion service for an action label and the source file the message
//! names, if any. Used directly when the
//! `model` strategy is configured, and as the fallback of the hybrid analyzer when
//! the regex patterns are not confident enough.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use crate::actors::messages::AppError;
use crate::actors::traits::LlmActor;
use crate::brain::analyzer::IntentStrategy;
use crate::brain::artifact::find_file_reference;
use crate::brain::intent::{Intent, IntentResult};
use crate::handlers::prompts;
use crate::models::{ChatMessage, Turn};

/// Number of most recent turns shown to the classifier.
const CLASSIFIER_HISTORY: usize = 5;

/// Intent classifier that delegates to the language model.
pub struct SemanticIntentClassifier<L: LlmActor> {
    llm: Arc<L>,
}

impl<L: LlmActor> SemanticIntentClassifier<L> {
    pub fn new(llm: Arc<L>) -> Self {
        Self { llm }
    }

    fn build_messages(message: &str, history: &[Turn]) -> Vec<ChatMessage> {
        let start = history.len().saturating_sub(CLASSIFIER_HISTORY);
        let history_str = history[start..]
            .iter()
            .map(|turn| format!("{}: {}", turn.role.as_str(), turn.content))
            .collect::<Vec<_>>()
            .join("\n");

        vec![
            ChatMessage::system(prompts::CLASSIFY_SYSTEM),
            ChatMessage::user(format!(
                "Message: {}\n\nRecent conversation:\n{}",
                message,
                if history_str.is_empty() { "(none)" } else { history_str.as_str() }
            )),
        ]
    }
}

#[async_trait]
impl<L: LlmActor> IntentStrategy for SemanticIntentClassifier<L> {
    async fn classify(
        &self,
        message: &str,
        history: &[Turn],
        model: &str,
    ) -> Result<IntentResult, AppError> {
        if message.trim().is_empty() {
            return Ok(IntentResult::unknown());
        }

        let reply = self
            .llm
            .complete(Self::build_messages(message, history), model)
            .await
            .map_err(|e| AppError::Classification(e.to_string()))?;

        let intent = parse_intent_label(&reply);
        debug!(%intent, reply_len = reply.len(), "Model classification");
        if intent == Intent::Unknown && !reply.to_lowercase().contains("unknown") {
            warn!("Classifier reply did not name an action: {:?}", reply.chars().take(80).collect::<String>());
        }

        Ok(IntentResult {
            intent,
            confidence: if intent == Intent::Unknown { 0.0 } else { 1.0 },
            matched_patterns: vec![],
            filename: parse_filename(&reply).or_else(|| find_file_reference(message)),
        })
    }
}

/// Maps a classifier reply to an intent.
///
/// Accepts a bare label, `{"intent": "<label>"}` (optionally fenced), or prose naming
/// exactly one label. Anything else is `Unknown`.
pub fn parse_intent_label(reply: &str) -> Intent {
    let cleaned = strip_fences(reply);

    if let Ok(intent) = cleaned.trim_matches(|c: char| c == '"' || c == '\'' || c == '.').parse() {
        return intent;
    }

    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(cleaned) {
        if let Some(label) = map.get("intent").or_else(|| map.get("action")).and_then(Value::as_str) {
            return label.parse().unwrap_or(Intent::Unknown);
        }
    }

    let lower = cleaned.to_lowercase();
    let mentioned: Vec<Intent> = Intent::ALL
        .into_iter()
        .filter(|intent| *intent != Intent::Unknown)
        .filter(|intent| {
            lower
                .split(|c: char| !c.is_ascii_alphanumeric())
                .any(|word| word == intent.label())
        })
        .collect();

    match mentioned.as_slice() {
        [single] => *single,
        _ => Intent::Unknown,
    }
}

/// The `filename` field of a JSON reply, unless it is null or empty.
pub fn parse_filename(reply: &str) -> Option<String> {
    let Ok(Value::Object(map)) = serde_json::from_str::<Value>(strip_fences(reply)) else {
        return None;
    };
    map.get("filename")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|name| !name.is_empty() && !name.eq_ignore_ascii_case("null"))
        .map(str::to_string)
}

fn strip_fences(reply: &str) -> &str {
    reply
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}
