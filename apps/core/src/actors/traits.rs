use crate::actors::messages::AppError;
use crate::models::ChatMessage;
use async_trait::async_trait;

/// Defines the public interface for the model gateway.
///
/// This trait abstracts the completion service so the workflow can run against the real
/// HTTP backend or a scripted test double. Implementations must be safe to call from many
/// sessions at once.
#[async_trait]
pub trait LlmActor: Send + Sync + 'static {
    /// Sends an ordered list of messages and returns the completion text.
    ///
    /// Re-issuing the same messages may return different text.
    async fn complete(&self, messages: Vec<ChatMessage>, model: &str) -> Result<String, AppError>;
}
