use crate::actors::llm::LlmActorHandle;
use crate::actors::messages::{AppError, SupervisorMessage};
use crate::actors::traits::LlmActor;
use crate::brain::analyzer::build_strategy;
use crate::config::AppConfig;
use crate::handlers::Handlers;
use crate::memory::Session;
use crate::models::{ModelEntry, Turn, TurnOutcome};
use crate::workflow::{TurnInput, WorkflowController};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::time::{timeout, Duration};
use tracing::{debug, error, info, instrument, warn};

/// Upper bound for one round-trip through the supervisor, a full review loop included.
const TURN_TIMEOUT: Duration = Duration::from_secs(600);

/// A handle to the `SupervisorActor`.
///
/// This is the primary entry point for all business logic. It owns every session and runs
/// each user turn through the workflow controller. Turns of one session are serialized;
/// different sessions proceed in parallel.
#[derive(Clone)]
pub struct SupervisorHandle {
    sender: mpsc::Sender<SupervisorMessage>,
    models: Arc<Vec<ModelEntry>>,
}

impl SupervisorHandle {
    /// Creates a supervisor backed by the HTTP gateway described by `config`.
    ///
    /// Fails when the gateway cannot be configured (for example, no API key).
    pub fn new(config: AppConfig) -> Result<Self, AppError> {
        let llm = LlmActorHandle::new(config.gateway_settings()?)?;
        Ok(Self::new_with_actors(Arc::new(llm), config))
    }

    /// Creates a supervisor over any gateway implementation.
    ///
    /// This spawns the `SupervisorRunner` in a new Tokio task.
    pub fn new_with_actors<L: LlmActor>(llm: Arc<L>, config: AppConfig) -> Self {
        let (sender, receiver) = mpsc::channel(32);
        let models = Arc::new(config.models());
        let actor = SupervisorRunner::new(receiver, llm, config);
        tokio::spawn(async move { actor.run().await });
        Self { sender, models }
    }

    /// Processes one user message of a session and returns the structured outcome.
    ///
    /// `model_id` (display name or id) applies to this turn only; `None` uses the
    /// session's model. The session is created on first use.
    #[instrument(skip(self, content), fields(len = content.len()))]
    pub async fn process_turn(
        &self,
        session_id: String,
        content: String,
        model_id: Option<String>,
    ) -> Result<TurnOutcome, AppError> {
        let (send, recv) = oneshot::channel();
        let msg = SupervisorMessage::ProcessTurn {
            session_id,
            content,
            model_id,
            responder: send,
        };
        self.sender
            .send(msg)
            .await
            .map_err(|e| AppError::Actor(e.to_string()))?;
        timeout(TURN_TIMEOUT, recv)
            .await?
            .map_err(|e| AppError::Actor(e.to_string()))?
    }

    /// Forgets a session's turns and code. Unknown sessions are a no-op.
    #[instrument(skip(self))]
    pub async fn clear_session(&self, session_id: String) -> Result<(), AppError> {
        let (send, recv) = oneshot::channel();
        let msg = SupervisorMessage::ClearSession {
            session_id,
            responder: send,
        };
        self.sender
            .send(msg)
            .await
            .map_err(|e| AppError::Actor(e.to_string()))?;
        timeout(TURN_TIMEOUT, recv)
            .await?
            .map_err(|e| AppError::Actor(e.to_string()))?
    }

    /// Selects another model for a session and clears it. Returns the resolved model id.
    #[instrument(skip(self))]
    pub async fn switch_model(&self, session_id: String, model_id: String) -> Result<String, AppError> {
        let (send, recv) = oneshot::channel();
        let msg = SupervisorMessage::SwitchModel {
            session_id,
            model_id,
            responder: send,
        };
        self.sender
            .send(msg)
            .await
            .map_err(|e| AppError::Actor(e.to_string()))?;
        timeout(TURN_TIMEOUT, recv)
            .await?
            .map_err(|e| AppError::Actor(e.to_string()))?
    }

    /// The turns of a session, oldest first. Unknown sessions have none.
    #[instrument(skip(self))]
    pub async fn history(&self, session_id: String) -> Result<Vec<Turn>, AppError> {
        let (send, recv) = oneshot::channel();
        let msg = SupervisorMessage::History {
            session_id,
            responder: send,
        };
        self.sender
            .send(msg)
            .await
            .map_err(|e| AppError::Actor(e.to_string()))?;
        timeout(TURN_TIMEOUT, recv)
            .await?
            .map_err(|e| AppError::Actor(e.to_string()))?
    }

    /// The configured models, in configuration order.
    pub fn list_models(&self) -> Vec<ModelEntry> {
        self.models.as_ref().clone()
    }

    /// Stops the supervisor. Turns already running still complete.
    pub async fn shutdown(&self) -> Result<(), AppError> {
        self.sender
            .send(SupervisorMessage::Shutdown)
            .await
            .map_err(|e| AppError::Actor(e.to_string()))
    }
}

// --- Actor Runner ---
struct SupervisorRunner<L: LlmActor> {
    receiver: mpsc::Receiver<SupervisorMessage>,
    sessions: HashMap<String, Arc<Mutex<Session>>>,
    controller: Arc<WorkflowController<L>>,
    config: AppConfig,
}

impl<L: LlmActor> SupervisorRunner<L> {
    fn new(receiver: mpsc::Receiver<SupervisorMessage>, llm: Arc<L>, config: AppConfig) -> Self {
        let strategy = build_strategy(config.classifier, llm.clone());
        let handlers = Handlers::new(llm, config.history_window);
        let controller = WorkflowController::new(strategy, handlers, config.workflow_policy());
        Self {
            receiver,
            sessions: HashMap::new(),
            controller: Arc::new(controller),
            config,
        }
    }

    async fn run(mut self) {
        info!(
            classifier = ?self.config.classifier,
            max_retries = self.config.max_review_retries,
            "Supervisor started"
        );
        while let Some(msg) = self.receiver.recv().await {
            if let SupervisorMessage::Shutdown = msg {
                info!("Supervisor shutting down...");
                break;
            }
            self.handle_message(msg);
        }
        info!("Supervisor stopped");
    }

    /// Never awaits: anything that needs a session lock runs in its own task, so a long
    /// turn in one session cannot hold up the others.
    fn handle_message(&mut self, msg: SupervisorMessage) {
        match msg {
            SupervisorMessage::ProcessTurn {
                session_id,
                content,
                model_id,
                responder,
            } => {
                let model_override = match model_id.map(|m| self.config.resolve_model(&m)).transpose() {
                    Ok(model) => model,
                    Err(e) => {
                        warn!(session = %session_id, "Rejected turn: {}", e);
                        let _ = responder.send(Err(e));
                        return;
                    }
                };
                let session = self.session(&session_id);
                let controller = self.controller.clone();
                tokio::spawn(async move {
                    run_turn(controller, session, content, model_override, responder).await;
                });
            }
            SupervisorMessage::ClearSession {
                session_id,
                responder,
            } => {
                let Some(session) = self.sessions.get(&session_id).cloned() else {
                    let _ = responder.send(Ok(()));
                    return;
                };
                // Idle and on the default model: nothing survives a clear, so forget it
                let idle_default = session
                    .try_lock()
                    .is_ok_and(|guard| guard.model_id() == self.config.default_model);
                if idle_default {
                    self.sessions.remove(&session_id);
                    info!(session = %session_id, sessions = self.sessions.len(), "Session removed");
                    let _ = responder.send(Ok(()));
                    return;
                }
                tokio::spawn(async move {
                    session.lock().await.clear();
                    info!(session = %session_id, "Session cleared");
                    let _ = responder.send(Ok(()));
                });
            }
            SupervisorMessage::SwitchModel {
                session_id,
                model_id,
                responder,
            } => {
                let model = match self.config.resolve_model(&model_id) {
                    Ok(model) => model,
                    Err(e) => {
                        let _ = responder.send(Err(e));
                        return;
                    }
                };
                let session = self.session(&session_id);
                tokio::spawn(async move {
                    session.lock().await.switch_model(model.clone());
                    info!(session = %session_id, model = %model, "Model switched, session cleared");
                    let _ = responder.send(Ok(model));
                });
            }
            SupervisorMessage::History {
                session_id,
                responder,
            } => match self.sessions.get(&session_id).cloned() {
                Some(session) => {
                    tokio::spawn(async move {
                        let turns = session.lock().await.history().to_vec();
                        let _ = responder.send(Ok(turns));
                    });
                }
                None => {
                    let _ = responder.send(Ok(Vec::new()));
                }
            },
            SupervisorMessage::Shutdown => {}
        }
    }

    fn session(&mut self, session_id: &str) -> Arc<Mutex<Session>> {
        self.sessions
            .entry(session_id.to_string())
            .or_insert_with(|| {
                debug!(session = %session_id, "Creating session");
                Arc::new(Mutex::new(Session::new(
                    session_id,
                    self.config.default_model.clone(),
                    self.config.max_stored_turns,
                )))
            })
            .clone()
    }
}

/// Runs one turn while holding the session lock, then commits it in one step.
#[instrument(skip_all)]
async fn run_turn<L: LlmActor>(
    controller: Arc<WorkflowController<L>>,
    session: Arc<Mutex<Session>>,
    content: String,
    model_override: Option<String>,
    responder: oneshot::Sender<Result<TurnOutcome, AppError>>,
) {
    let mut guard = session.lock().await;

    if responder.is_closed() {
        warn!(session = %guard.id, "Caller went away before the turn started, skipping");
        return;
    }

    let model = model_override.unwrap_or_else(|| guard.model_id().to_string());
    let input = TurnInput {
        message: &content,
        history: guard.history(),
        active: guard.artifact(),
        model: &model,
    };
    let result = controller.run(input).await;

    let result = match result {
        Ok(output) => {
            if output.record {
                let assistant = Turn::assistant(output.outcome.response_text.clone(), output.turn_metadata());
                guard.commit(Turn::user(content), assistant, output.artifact_update);
            }
            info!(
                session = %guard.id,
                action = %output.outcome.action,
                recorded = output.record,
                turns = guard.history().len(),
                "Turn finished"
            );
            Ok(output.outcome)
        }
        Err(e) => {
            error!(session = %guard.id, "Turn failed: {}", e);
            Err(e)
        }
    };
    drop(guard);

    let _ = responder.send(result);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brain::analyzer::ClassifierKind;
    use crate::models::ChatMessage;
    use async_trait::async_trait;

    // --- Mock Actors ---

    struct EchoLlm;

    #[async_trait]
    impl LlmActor for EchoLlm {
        async fn complete(&self, messages: Vec<ChatMessage>, model: &str) -> Result<String, AppError> {
            let last = messages.last().map(|m| m.content.clone()).unwrap_or_default();
            Ok(format!("[{}] {}", model, last))
        }
    }

    fn setup_supervisor() -> SupervisorHandle {
        let config = AppConfig {
            classifier: ClassifierKind::Keyword,
            ..AppConfig::default()
        };
        SupervisorHandle::new_with_actors(Arc::new(EchoLlm), config)
    }

    #[tokio::test]
    async fn test_chat_turn_is_recorded() {
        let handle = setup_supervisor();
        let outcome = handle
            .process_turn("s1".into(), "什么是闭包？".into(), None)
            .await
            .unwrap();
        assert!(outcome.response_text.contains("deepseek-ai/DeepSeek-V3.1-Terminus"));

        let history = handle.history("s1".into()).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].content, "什么是闭包？");
    }

    #[tokio::test]
    async fn test_unknown_model_rejected() {
        let handle = setup_supervisor();
        let result = handle
            .process_turn("s1".into(), "hello".into(), Some("gpt-2".into()))
            .await;
        assert!(matches!(result, Err(AppError::Validation(_))));
        assert!(handle.history("s1".into()).await.unwrap().is_empty());
    }

    fn keyword_runner() -> SupervisorRunner<EchoLlm> {
        let (_sender, receiver) = mpsc::channel(1);
        let config = AppConfig {
            classifier: ClassifierKind::Keyword,
            ..AppConfig::default()
        };
        SupervisorRunner::new(receiver, Arc::new(EchoLlm), config)
    }

    #[tokio::test]
    async fn test_clear_drops_idle_sessions() {
        let mut runner = keyword_runner();
        runner.session("s1");
        runner.session("s2").lock().await.switch_model("deepseek-ai/DeepSeek-V3");

        for id in ["s1", "s2", "never-seen"] {
            let (send, recv) = oneshot::channel();
            runner.handle_message(SupervisorMessage::ClearSession {
                session_id: id.to_string(),
                responder: send,
            });
            recv.await.unwrap().unwrap();
        }

        // a switched model is the one thing a clear keeps
        assert!(!runner.sessions.contains_key("s1"));
        assert!(runner.sessions.contains_key("s2"));
        assert_eq!(runner.sessions.len(), 1);
        assert_eq!(runner.session("s2").lock().await.model_id(), "deepseek-ai/DeepSeek-V3");
    }

    #[tokio::test]
    async fn test_shutdown_closes_mailbox() {
        let handle = setup_supervisor();
        handle.shutdown().await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        let result = handle.history("s1".into()).await;
        assert!(matches!(result, Err(AppError::Actor(_))));
    }
}
