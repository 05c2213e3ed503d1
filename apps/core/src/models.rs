use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::brain::artifact::CodeArtifact;
use crate::brain::intent::Intent;
use crate::brain::review::ReviewResult;
use crate::workflow::Stage;

/// The author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instructions for the model. Never stored in a session.
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One message on the wire to the completion service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }
}

/// Structured facts recorded alongside an assistant turn.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnMetadata {
    /// The action that produced the turn.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<Intent>,
    /// Score of the review of the version the turn surfaced (the best-scoring one).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_score: Option<u8>,
    /// Whether that review reached the pass threshold.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passed: Option<bool>,
    #[serde(default)]
    pub loop_exceeded: bool,
    #[serde(default)]
    pub partial_failure: bool,
}

/// A single message within a session. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<TurnMetadata>,
    pub created_at: DateTime<Utc>,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            metadata: None,
            created_at: Utc::now(),
        }
    }

    pub fn assistant(content: impl Into<String>, metadata: TurnMetadata) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            metadata: Some(metadata),
            created_at: Utc::now(),
        }
    }

    /// The wire form of this turn, used as prompt context.
    pub fn to_chat_message(&self) -> ChatMessage {
        ChatMessage {
            role: self.role,
            content: self.content.clone(),
        }
    }
}

/// An entry of the configured model list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelEntry {
    /// Name shown to people, e.g. "DeepSeek V3".
    pub display_name: String,
    /// Identifier sent to the completion service.
    pub model_id: String,
}

/// The result of processing one user turn, as seen by front-ends.
#[derive(Debug, Clone, Serialize)]
pub struct TurnOutcome {
    /// Text to show the user.
    pub response_text: String,
    /// The action that was executed.
    pub action: Intent,
    /// Review of the surfaced artifact: the best-scoring version reviewed during the turn.
    pub review: Option<ReviewResult>,
    /// The last review performed during the turn. Differs from `review` when a retry
    /// scored lower than an earlier version.
    pub last_review: Option<ReviewResult>,
    /// Set when the review/optimize loop ran out of retries below the pass threshold.
    pub loop_exceeded: bool,
    /// The session's code artifact after the turn, when the turn touched code.
    pub artifact: Option<CodeArtifact>,
    /// Workflow stages entered, in order.
    pub trace: Vec<Stage>,
    /// Description of a backend failure that cut the workflow short.
    pub partial_failure: Option<String>,
    /// Set when intent detection failed and the user was asked to rephrase.
    pub degraded: bool,
}
