//! Action handlers: chat, generate, optimize, review.
//!
//! Each handler builds a prompt, makes one gateway call and post-processes the reply.
//! Handlers never touch session memory; the workflow controller owns that.

pub mod prompts;

use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::actors::messages::AppError;
use crate::actors::traits::LlmActor;
use crate::brain::artifact::CodeArtifact;
use crate::brain::review::{parse_review, ReviewResult};
use crate::models::{ChatMessage, Turn};

/// The four actions, bound to one gateway.
pub struct Handlers<L: LlmActor> {
    llm: Arc<L>,
    history_window: usize,
}

impl<L: LlmActor> Clone for Handlers<L> {
    fn clone(&self) -> Self {
        Self {
            llm: self.llm.clone(),
            history_window: self.history_window,
        }
    }
}

impl<L: LlmActor> Handlers<L> {
    /// `history_window` caps how many prior turns go into each prompt.
    pub fn new(llm: Arc<L>, history_window: usize) -> Self {
        Self { llm, history_window }
    }

    /// Answers a general question using the conversation as context.
    #[instrument(skip_all, fields(history = history.len()))]
    pub async fn chat(&self, message: &str, history: &[Turn], model: &str) -> Result<String, AppError> {
        let messages = self.build_messages(prompts::CHAT_SYSTEM, history, message.to_string());
        self.llm.complete(messages, model).await
    }

    /// Produces code for `requirement`, building on `current` when there is code in play.
    #[instrument(skip_all, fields(history = history.len(), extends = current.is_some()))]
    pub async fn generate(
        &self,
        requirement: &str,
        current: Option<&CodeArtifact>,
        history: &[Turn],
        model: &str,
    ) -> Result<CodeArtifact, AppError> {
        let request = match current {
            Some(code) => format!(
                "{}\n\nCurrent code:\n{}\n\nNew requirement: {}",
                prompts::GENERATE_EXTEND_INSTRUCTION,
                code.to_markdown(),
                requirement
            ),
            None => format!("Requirement: {}\n\nWrite the code:", requirement),
        };

        let messages = self.build_messages(prompts::GENERATE_SYSTEM, history, request);
        let reply = self.llm.complete(messages, model).await?;
        let mut artifact = CodeArtifact::from_reply(&reply);
        if artifact.language.is_none() {
            artifact.language = current.and_then(|c| c.language.clone());
        }
        debug!(code_len = artifact.code.len(), "Generated code");
        Ok(artifact)
    }

    /// Improves `code`. With a critique, every comment is listed and must be addressed.
    #[instrument(skip_all, fields(history = history.len(), critique = critique.is_some()))]
    pub async fn optimize(
        &self,
        code: &CodeArtifact,
        critique: Option<&ReviewResult>,
        instruction: Option<&str>,
        history: &[Turn],
        model: &str,
    ) -> Result<CodeArtifact, AppError> {
        let mut request = format!("Code:\n{}", code.to_markdown());

        if let Some(note) = instruction.filter(|n| !n.trim().is_empty()) {
            request.push_str(&format!("\n\nUser request: {}", note.trim()));
        }

        if let Some(review) = critique {
            request.push_str(&format!(
                "\n\n{}\nReview score: {}/100\n",
                prompts::OPTIMIZE_CRITIQUE_INSTRUCTION,
                review.score()
            ));
            for (i, comment) in review.comments().iter().enumerate() {
                request.push_str(&format!("{}. {}\n", i + 1, comment));
            }
        }

        request.push_str("\n\nReturn the optimized code:");

        let messages = self.build_messages(prompts::OPTIMIZE_SYSTEM, history, request);
        let reply = self.llm.complete(messages, model).await?;
        let mut optimized = CodeArtifact::from_reply(&reply);

        if optimized.is_blank() {
            warn!("Optimizer returned no code, keeping the input unchanged");
            return Ok(code.clone());
        }
        if optimized.language.is_none() {
            optimized.language = code.language.clone();
        }
        debug!(before = code.code.len(), after = optimized.code.len(), "Optimized code");
        Ok(optimized)
    }

    /// Scores `code` and collects improvement comments.
    #[instrument(skip_all, fields(history = history.len()))]
    pub async fn review(
        &self,
        code: &CodeArtifact,
        history: &[Turn],
        model: &str,
    ) -> Result<ReviewResult, AppError> {
        let request = format!("Review this code:\n{}", code.to_markdown());
        let messages = self.build_messages(prompts::REVIEW_SYSTEM, history, request);
        let reply = self.llm.complete(messages, model).await?;
        let review = parse_review(&reply);
        debug!(score = review.score(), passed = review.passed(), "Reviewed code");
        Ok(review)
    }

    /// System prompt, then the most recent `history_window` turns in order, then the request.
    fn build_messages(&self, system: &str, history: &[Turn], request: String) -> Vec<ChatMessage> {
        let start = history.len().saturating_sub(self.history_window);
        let mut messages = Vec::with_capacity(history.len() - start + 2);
        messages.push(ChatMessage::system(system));
        messages.extend(history[start..].iter().map(Turn::to_chat_message));
        messages.push(ChatMessage::user(request));
        messages
    }
}
