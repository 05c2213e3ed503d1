//! Per-session conversation memory.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::brain::artifact::CodeArtifact;
use crate::models::Turn;

/// One conversation: its turns, its model and the code in play.
///
/// Only the supervisor mutates a session, and only through [`Session::commit`], so a turn
/// is either fully recorded (user and assistant) or not at all.
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub id: String,
    turns: Vec<Turn>,
    model_id: String,
    artifact: Option<CodeArtifact>,
    max_stored_turns: usize,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn new(id: impl Into<String>, model_id: impl Into<String>, max_stored_turns: usize) -> Self {
        Self {
            id: id.into(),
            turns: Vec::new(),
            model_id: model_id.into(),
            artifact: None,
            max_stored_turns: max_stored_turns.max(2),
            created_at: Utc::now(),
        }
    }

    /// Turns in order, oldest first.
    pub fn history(&self) -> &[Turn] {
        &self.turns
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn artifact(&self) -> Option<&CodeArtifact> {
        self.artifact.as_ref()
    }

    /// Appends a completed exchange and, when given, replaces the code in play.
    pub fn commit(&mut self, user: Turn, assistant: Turn, artifact_update: Option<CodeArtifact>) {
        self.turns.push(user);
        self.turns.push(assistant);
        if let Some(artifact) = artifact_update {
            self.artifact = Some(artifact);
        }

        if self.turns.len() > self.max_stored_turns {
            // Drop whole exchanges so the log never starts with an assistant turn.
            let mut excess = self.turns.len() - self.max_stored_turns;
            excess += excess % 2;
            self.turns.drain(..excess.min(self.turns.len()));
            debug!(session = %self.id, dropped = excess, "Trimmed stored turns");
        }
    }

    /// Forgets every turn and the code in play. The model stays selected.
    pub fn clear(&mut self) {
        self.turns.clear();
        self.artifact = None;
    }

    /// Selects another model. A switch always starts a fresh conversation.
    pub fn switch_model(&mut self, model_id: impl Into<String>) {
        self.clear();
        self.model_id = model_id.into();
    }
}
