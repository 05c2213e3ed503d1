use crate::actors::messages::{AppError, BackendError, LlmMessage};
use crate::actors::traits::LlmActor;
use crate::models::ChatMessage;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

/// Connection settings for an OpenAI-compatible chat completion service.
#[derive(Debug, Clone)]
pub struct GatewaySettings {
    pub base_url: String,
    pub api_key: String,
    pub temperature: f32,
    /// Deadline for one HTTP exchange, body included.
    pub request_timeout: Duration,
}

/// A handle to the `LlmActor`.
///
/// This struct provides a public, cloneable interface for sending messages to the
/// running gateway actor. It abstracts away the `mpsc::Sender`.
#[derive(Clone)]
pub struct LlmActorHandle {
    sender: mpsc::Sender<LlmMessage>,
    request_timeout: Duration,
}

impl LlmActorHandle {
    /// Creates a new gateway actor and returns a handle to it.
    ///
    /// This will spawn the `LlmActorRunner` in a new Tokio task.
    pub fn new(settings: GatewaySettings) -> Result<Self, AppError> {
        let (sender, receiver) = mpsc::channel(32);
        let request_timeout = settings.request_timeout;
        let actor = LlmActorRunner::new(receiver, settings)?;
        tokio::spawn(async move { actor.run().await });
        Ok(Self {
            sender,
            request_timeout,
        })
    }
}

#[async_trait]
impl LlmActor for LlmActorHandle {
    async fn complete(&self, messages: Vec<ChatMessage>, model: &str) -> Result<String, AppError> {
        let (send, recv) = oneshot::channel();
        let msg = LlmMessage::Complete {
            messages,
            model: model.to_string(),
            responder: send,
        };

        self.sender
            .send(msg)
            .await
            .map_err(|e| AppError::Actor(e.to_string()))?;
        // The runner enforces the per-request deadline; this only guards a stuck mailbox.
        timeout(self.request_timeout + HANDLE_GRACE, recv)
            .await?
            .map_err(|e| AppError::Actor(e.to_string()))?
    }
}

// --- Constants ---
const HANDLE_GRACE: Duration = Duration::from_secs(5);

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// State shared by every in-flight request.
#[derive(Clone)]
struct Gateway {
    client: Client,
    endpoint: String,
    headers: HeaderMap,
    temperature: f32,
    request_timeout: Duration,
}

// --- Actor Runner (Internal Logic) ---
struct LlmActorRunner {
    receiver: mpsc::Receiver<LlmMessage>,
    gateway: Gateway,
}

impl LlmActorRunner {
    fn new(receiver: mpsc::Receiver<LlmMessage>, settings: GatewaySettings) -> Result<Self, AppError> {
        let mut headers = HeaderMap::new();
        let auth_value = HeaderValue::from_str(&format!("Bearer {}", settings.api_key))
            .map_err(|e| AppError::Config(format!("Invalid API key: {}", e)))?;
        headers.insert(AUTHORIZATION, auth_value);

        let client = Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            receiver,
            gateway: Gateway {
                client,
                endpoint: format!("{}/chat/completions", settings.base_url.trim_end_matches('/')),
                headers,
                temperature: settings.temperature,
                request_timeout: settings.request_timeout,
            },
        })
    }

    async fn run(mut self) {
        info!(endpoint = %self.gateway.endpoint, "LlmActor started");

        while let Some(msg) = self.receiver.recv().await {
            self.handle_message(msg);
        }

        info!("LlmActor stopped");
    }

    /// Requests from different sessions must not queue behind each other, so each one
    /// runs in its own task.
    fn handle_message(&self, msg: LlmMessage) {
        match msg {
            LlmMessage::Complete {
                messages,
                model,
                responder,
            } => {
                let gateway = self.gateway.clone();
                tokio::spawn(async move {
                    let result = gateway.complete(&messages, &model).await.map_err(AppError::from);
                    if let Err(e) = &result {
                        error!(model = %model, "Completion failed: {}", e);
                    }
                    let _ = responder.send(result);
                });
            }
        }
    }
}

impl Gateway {
    fn build_request(&self, payload: &CompletionRequest<'_>) -> reqwest::RequestBuilder {
        self.client
            .post(&self.endpoint)
            .headers(self.headers.clone())
            .json(payload)
    }

    async fn complete(&self, messages: &[ChatMessage], model: &str) -> Result<String, BackendError> {
        debug!(model, messages = messages.len(), "Sending completion request");

        let payload = CompletionRequest {
            model,
            messages,
            temperature: self.temperature,
        };

        let res = timeout(self.request_timeout, self.build_request(&payload).send()).await??;
        let status = res.status();

        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(classify_status(status, body));
        }

        let body = timeout(self.request_timeout, res.text()).await??;
        parse_completion(&body)
    }
}

fn classify_status(status: StatusCode, body: String) -> BackendError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => BackendError::Auth {
            status: status.as_u16(),
            body,
        },
        StatusCode::TOO_MANY_REQUESTS => BackendError::RateLimited(body),
        _ => BackendError::Status {
            status: status.as_u16(),
            body,
        },
    }
}

/// Extracts `choices[0].message.content` from a completion body.
fn parse_completion(body: &str) -> Result<String, BackendError> {
    let parsed: CompletionResponse =
        serde_json::from_str(body).map_err(|e| BackendError::Malformed(e.to_string()))?;

    let choice = parsed
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| BackendError::Malformed("response has no choices".to_string()))?;

    match choice.message.content {
        Some(content) => Ok(content),
        None => {
            warn!("Completion choice has no content");
            Err(BackendError::Malformed("choice has no message content".to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn setup_test_actor(server_url: String) -> LlmActorHandle {
        LlmActorHandle::new(GatewaySettings {
            base_url: format!("{}/v1/", server_url),
            api_key: "test-key".to_string(),
            temperature: 0.7,
            request_timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    fn completion_body(content: &str) -> serde_json::Value {
        json!({
            "id": "cmpl-1",
            "object": "chat.completion",
            "choices": [
                { "index": 0, "message": { "role": "assistant", "content": content }, "finish_reason": "stop" }
            ]
        })
    }

    #[tokio::test]
    async fn test_complete_success() {
        // 1. Arrange
        let mock_server = MockServer::start().await;
        let handle = setup_test_actor(mock_server.uri());

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .and(body_partial_json(json!({
                "model": "deepseek-ai/DeepSeek-V3",
                "messages": [
                    { "role": "system", "content": "be brief" },
                    { "role": "user", "content": "Hello" }
                ],
                "temperature": 0.7
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("Hi there.")))
            .expect(1)
            .mount(&mock_server)
            .await;

        // 2. Act
        let messages = vec![ChatMessage::system("be brief"), ChatMessage::user("Hello")];
        let result = handle.complete(messages, "deepseek-ai/DeepSeek-V3").await;

        // 3. Assert
        assert_eq!(result.unwrap(), "Hi there.");
    }

    #[tokio::test]
    async fn test_complete_server_error() {
        let mock_server = MockServer::start().await;
        let handle = setup_test_actor(mock_server.uri());

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(500).set_body_string("Internal Server Error"))
            .mount(&mock_server)
            .await;

        let result = handle.complete(vec![ChatMessage::user("Hello")], "m").await;

        match result {
            Err(AppError::Backend(BackendError::Status { status, body })) => {
                assert_eq!(status, 500);
                assert!(body.contains("Internal Server Error"));
            }
            other => panic!("Expected a status error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_complete_auth_and_rate_limit() {
        let mock_server = MockServer::start().await;
        let handle = setup_test_actor(mock_server.uri());

        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "model": "locked" })))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid key"))
            .mount(&mock_server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "model": "busy" })))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&mock_server)
            .await;

        let auth = handle.complete(vec![ChatMessage::user("x")], "locked").await;
        assert!(matches!(auth, Err(AppError::Backend(BackendError::Auth { status: 401, .. }))));

        let limited = handle.complete(vec![ChatMessage::user("x")], "busy").await;
        assert!(matches!(limited, Err(AppError::Backend(BackendError::RateLimited(_)))));
    }

    #[tokio::test]
    async fn test_complete_malformed_body() {
        let mock_server = MockServer::start().await;
        let handle = setup_test_actor(mock_server.uri());

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "choices": [] })))
            .mount(&mock_server)
            .await;

        let result = handle.complete(vec![ChatMessage::user("x")], "m").await;
        assert!(matches!(result, Err(AppError::Backend(BackendError::Malformed(_)))));
    }

    #[tokio::test]
    async fn test_complete_times_out() {
        let mock_server = MockServer::start().await;
        let handle = LlmActorHandle::new(GatewaySettings {
            base_url: mock_server.uri(),
            api_key: "k".to_string(),
            temperature: 0.7,
            request_timeout: Duration::from_millis(200),
        })
        .unwrap();

        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(completion_body("late"))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&mock_server)
            .await;

        let result = handle.complete(vec![ChatMessage::user("x")], "m").await;
        assert!(matches!(result, Err(AppError::Backend(BackendError::Timeout(_)))));
    }

    #[test]
    fn test_parse_completion_null_content() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":null}}]}"#;
        assert!(matches!(parse_completion(body), Err(BackendError::Malformed(_))));
    }
}
