//! Workflow controller: the per-turn state machine.
//!
//! ```text
//! Start -> Classifying -> Chatting   ------------------------------> Done
//!                      -> Generating -> Optimizing ----------------> Done
//!                      -> Optimizing --------------------------------> Done
//!                      -> Reviewing <-> Optimizing (bounded retries) -> Done
//!                      -> Erroring ----------------------------------> Done
//! ```
//!
//! The controller never mutates session memory. It reads a snapshot of the history and
//! returns what should be committed; the supervisor commits it in one step.

use std::future::Future;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::actors::messages::AppError;
use crate::actors::traits::LlmActor;
use crate::brain::analyzer::IntentStrategy;
use crate::brain::artifact::{find_code_block, read_source_file, CodeArtifact};
use crate::brain::intent::Intent;
use crate::brain::review::{ReviewResult, PASS_THRESHOLD};
use crate::handlers::Handlers;
use crate::models::{Turn, TurnMetadata, TurnOutcome};

pub const CLARIFICATION_RESPONSE: &str = "Sorry, I couldn't tell what you need. Please say whether \
you want to chat, generate code, optimize code, or review code.";

pub const REPHRASE_RESPONSE: &str = "I couldn't analyze your request right now. Please rephrase it \
and try again.";

/// Default number of optimize+review rounds after a failed review.
pub const DEFAULT_MAX_RETRIES: u32 = 1;

/// Extra attempts for a failed gateway call on the code paths.
const BACKEND_RETRIES: u32 = 1;

/// States of the per-turn workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Start,
    Classifying,
    Chatting,
    Generating,
    Optimizing,
    Reviewing,
    Erroring,
    Done,
}

/// Why the optimizer is running; decides the critique and what follows it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OptimizeOrigin {
    /// Requested directly by the user. Ends the turn.
    Manual,
    /// Fixed pass after every generation. Ends the turn.
    GenerateChain,
    /// A review failed; the result is reviewed again.
    ReviewRetry,
}

/// Loop policy of the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowPolicy {
    /// Optimize+review rounds allowed after a failed review.
    pub max_retries: u32,
    /// Root that file names in messages are resolved against.
    pub workspace_dir: PathBuf,
}

impl Default for WorkflowPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            workspace_dir: PathBuf::from("."),
        }
    }
}

/// Everything the controller reads for one turn.
#[derive(Debug, Clone, Copy)]
pub struct TurnInput<'a> {
    pub message: &'a str,
    /// Turns before this one, oldest first.
    pub history: &'a [Turn],
    /// The session's code in play.
    pub active: Option<&'a CodeArtifact>,
    pub model: &'a str,
}

/// What the turn produced and what the caller should commit.
#[derive(Debug, Clone)]
pub struct WorkflowOutput {
    pub outcome: TurnOutcome,
    /// New code in play for the session, when it changed.
    pub artifact_update: Option<CodeArtifact>,
    /// Whether the user/assistant pair belongs in memory.
    pub record: bool,
}

impl WorkflowOutput {
    /// Metadata for the assistant turn that records this outcome.
    pub fn turn_metadata(&self) -> TurnMetadata {
        TurnMetadata {
            action: Some(self.outcome.action),
            review_score: self.outcome.review.as_ref().map(|r| r.score()),
            passed: self.outcome.review.as_ref().map(|r| r.passed()),
            loop_exceeded: self.outcome.loop_exceeded,
            partial_failure: self.outcome.partial_failure.is_some(),
        }
    }
}

/// Transient per-turn state. Dropped when the turn ends.
struct WorkflowState {
    stage: Stage,
    intent: Intent,
    /// Source file the message names.
    filename: Option<String>,
    trace: Vec<Stage>,
    retries: u32,
    origin: OptimizeOrigin,
    /// Code the next handler works on.
    working: Option<CodeArtifact>,
    /// Set once this turn holds a result worth keeping (new code or a review).
    produced: bool,
    last_review: Option<ReviewResult>,
    best: Option<(CodeArtifact, ReviewResult)>,
    response: Option<String>,
    failure: Option<String>,
    loop_exceeded: bool,
}

impl WorkflowState {
    fn new() -> Self {
        Self {
            stage: Stage::Start,
            intent: Intent::Unknown,
            filename: None,
            trace: vec![Stage::Start],
            retries: 0,
            origin: OptimizeOrigin::Manual,
            working: None,
            produced: false,
            last_review: None,
            best: None,
            response: None,
            failure: None,
            loop_exceeded: false,
        }
    }

    fn enter(&mut self, stage: Stage) {
        self.stage = stage;
        self.trace.push(stage);
    }

    /// Keeps the highest-scoring reviewed version; ties go to the newer one.
    fn record_review(&mut self, code: &CodeArtifact, review: &ReviewResult) {
        let better = self
            .best
            .as_ref()
            .map_or(true, |(_, best)| review.score() >= best.score());
        if better {
            self.best = Some((code.clone(), review.clone()));
        }
        self.last_review = Some(review.clone());
    }
}

/// Sequences classification, dispatch and the generate/optimize/review chaining.
pub struct WorkflowController<L: LlmActor> {
    classifier: Arc<dyn IntentStrategy>,
    handlers: Handlers<L>,
    policy: WorkflowPolicy,
}

impl<L: LlmActor> WorkflowController<L> {
    pub fn new(classifier: Arc<dyn IntentStrategy>, handlers: Handlers<L>, policy: WorkflowPolicy) -> Self {
        Self {
            classifier,
            handlers,
            policy,
        }
    }

    /// Runs one user turn to completion.
    ///
    /// Returns `Err` only when a handler failed before any code was produced; in that case
    /// nothing should be committed.
    #[instrument(skip_all, fields(model = input.model, history = input.history.len()))]
    pub async fn run(&self, input: TurnInput<'_>) -> Result<WorkflowOutput, AppError> {
        let mut state = WorkflowState::new();

        while state.stage != Stage::Done {
            let next = match state.stage {
                Stage::Start => Stage::Classifying,
                Stage::Classifying => match self.classifier.classify(input.message, input.history, input.model).await {
                    Ok(result) => {
                        info!(intent = %result.intent, confidence = result.confidence, "Intent classified");
                        state.intent = result.intent;
                        state.filename = result.filename;
                        match result.intent {
                            Intent::Chat => Stage::Chatting,
                            Intent::Generate => Stage::Generating,
                            Intent::Optimize => Stage::Optimizing,
                            Intent::Review => Stage::Reviewing,
                            Intent::Unknown => Stage::Erroring,
                        }
                    }
                    Err(e) => {
                        warn!("Classification failed: {}", e);
                        state.enter(Stage::Done);
                        return Ok(Self::rephrase(state));
                    }
                },
                Stage::Chatting => {
                    let reply = self.handlers.chat(input.message, input.history, input.model).await?;
                    state.response = Some(reply);
                    Stage::Done
                }
                Stage::Generating => {
                    let code = self
                        .with_backend_retry("generate", || {
                            self.handlers.generate(input.message, input.active, input.history, input.model)
                        })
                        .await?;
                    state.working = Some(code);
                    state.produced = true;
                    state.origin = OptimizeOrigin::GenerateChain;
                    Stage::Optimizing
                }
                Stage::Optimizing => self.optimize_step(&mut state, &input).await?,
                Stage::Reviewing => self.review_step(&mut state, &input).await?,
                Stage::Erroring => {
                    state.response = Some(CLARIFICATION_RESPONSE.to_string());
                    Stage::Done
                }
                Stage::Done => Stage::Done,
            };
            state.enter(next);
        }

        Ok(self.assemble(state, input.active))
    }

    async fn optimize_step(&self, state: &mut WorkflowState, input: &TurnInput<'_>) -> Result<Stage, AppError> {
        let Some(code) = self.working_code(state, input, Intent::Optimize).await else {
            return Ok(Stage::Done);
        };

        let critique = match state.origin {
            OptimizeOrigin::ReviewRetry => state.last_review.clone(),
            _ => None,
        };
        let instruction = match state.origin {
            OptimizeOrigin::Manual => Some(input.message),
            _ => None,
        };

        let result = self
            .with_backend_retry("optimize", || {
                self.handlers
                    .optimize(&code, critique.as_ref(), instruction, input.history, input.model)
            })
            .await;

        match result {
            Ok(optimized) => {
                state.working = Some(optimized);
                state.produced = true;
                Ok(match state.origin {
                    OptimizeOrigin::ReviewRetry => Stage::Reviewing,
                    _ => Stage::Done,
                })
            }
            Err(e) if state.produced => {
                warn!("Optimization failed after code was produced: {}", e);
                state.failure = Some(format!("optimization failed: {}", e));
                if state.origin == OptimizeOrigin::ReviewRetry {
                    state.loop_exceeded = true;
                }
                Ok(Stage::Done)
            }
            Err(e) => Err(e),
        }
    }

    async fn review_step(&self, state: &mut WorkflowState, input: &TurnInput<'_>) -> Result<Stage, AppError> {
        let Some(code) = self.working_code(state, input, Intent::Review).await else {
            return Ok(Stage::Done);
        };

        let result = self
            .with_backend_retry("review", || self.handlers.review(&code, input.history, input.model))
            .await;

        let review = match result {
            Ok(review) => review,
            Err(e) if state.produced => {
                warn!("Re-review failed: {}", e);
                state.failure = Some(format!("review failed: {}", e));
                state.loop_exceeded = true;
                return Ok(Stage::Done);
            }
            Err(e) => return Err(e),
        };

        info!(score = review.score(), passed = review.passed(), retries = state.retries, "Review finished");
        state.record_review(&code, &review);
        state.produced = true;

        if review.passed() {
            return Ok(Stage::Done);
        }
        if state.retries < self.policy.max_retries {
            state.retries += 1;
            state.origin = OptimizeOrigin::ReviewRetry;
            return Ok(Stage::Optimizing);
        }

        info!("Review retries exhausted ({}), surfacing best version", self.policy.max_retries);
        state.loop_exceeded = true;
        Ok(Stage::Done)
    }

    /// The code the next handler works on. When there is none, the reply explaining why is
    /// stored and the turn should end.
    async fn working_code(
        &self,
        state: &mut WorkflowState,
        input: &TurnInput<'_>,
        intent: Intent,
    ) -> Option<CodeArtifact> {
        if let Some(code) = &state.working {
            return Some(code.clone());
        }
        match self.code_source(state.filename.as_deref(), input).await {
            CodeSource::Found(code) => {
                state.working = Some(code.clone());
                Some(code)
            }
            CodeSource::Unreadable(response) => {
                state.response = Some(response);
                None
            }
            CodeSource::Missing => {
                state.response = Some(missing_code_response(intent));
                None
            }
        }
    }

    /// Code for a bare optimize/review: a fenced block in the message, then the file the
    /// message names, then the code in play.
    async fn code_source(&self, filename: Option<&str>, input: &TurnInput<'_>) -> CodeSource {
        if let Some(code) = find_code_block(input.message) {
            return CodeSource::Found(code);
        }
        if let Some(name) = filename {
            return self.load_file(name).await;
        }
        input.active.cloned().map_or(CodeSource::Missing, CodeSource::Found)
    }

    async fn load_file(&self, name: &str) -> CodeSource {
        let relative = Path::new(name);
        if relative.is_absolute() || relative.components().any(|c| matches!(c, Component::ParentDir)) {
            warn!(file = name, "Refusing file outside the workspace");
            return CodeSource::Unreadable(format!("File {} is outside the workspace.", name));
        }

        let path = self.policy.workspace_dir.join(relative);
        match read_source_file(&path).await {
            Ok(code) if code.is_blank() => CodeSource::Unreadable(format!("File {} is empty.", name)),
            Ok(code) => {
                info!(file = name, len = code.code.len(), "Loaded code from file");
                CodeSource::Found(code)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                CodeSource::Unreadable(format!("File {} does not exist.", name))
            }
            Err(e) => {
                warn!(file = name, "Could not read file: {}", e);
                CodeSource::Unreadable(format!("Could not read file {}: {}", name, e))
            }
        }
    }

    /// Runs `call`, re-issuing it once when the gateway failed.
    async fn with_backend_retry<T, F, Fut>(&self, what: &str, call: F) -> Result<T, AppError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
    {
        let mut attempt = 0;
        loop {
            match call().await {
                Err(e) if e.is_backend() && attempt < BACKEND_RETRIES => {
                    attempt += 1;
                    warn!("{} failed ({}), retrying ({}/{})", what, e, attempt, BACKEND_RETRIES);
                }
                other => return other,
            }
        }
    }

    fn rephrase(state: WorkflowState) -> WorkflowOutput {
        WorkflowOutput {
            outcome: TurnOutcome {
                response_text: REPHRASE_RESPONSE.to_string(),
                action: Intent::Unknown,
                review: None,
                last_review: None,
                loop_exceeded: false,
                artifact: None,
                trace: state.trace,
                partial_failure: None,
                degraded: true,
            },
            artifact_update: None,
            record: false,
        }
    }

    fn assemble(&self, state: WorkflowState, active: Option<&CodeArtifact>) -> WorkflowOutput {
        let intent = state.intent;

        // On the review path the best reviewed version is surfaced with its own review
        let (artifact, review) = match state.best {
            Some((code, review)) => (Some(code), Some(review)),
            None => (state.working, None),
        };

        let response_text = match state.response {
            Some(text) => text,
            None => render_code_response(
                intent,
                artifact.as_ref(),
                review.as_ref(),
                state.loop_exceeded,
                state.retries,
                state.failure.as_deref(),
            ),
        };

        let artifact_update = match (&artifact, active) {
            (Some(code), Some(current)) if code == current => None,
            (Some(code), _) if intent.touches_code() => Some(code.clone()),
            _ => None,
        };

        WorkflowOutput {
            outcome: TurnOutcome {
                response_text,
                action: intent,
                review,
                last_review: state.last_review,
                loop_exceeded: state.loop_exceeded,
                artifact: if intent.touches_code() { artifact } else { None },
                trace: state.trace,
                partial_failure: state.failure,
                degraded: false,
            },
            artifact_update,
            record: true,
        }
    }
}

/// Where a bare optimize/review found its code.
#[derive(Debug, PartialEq, Eq)]
enum CodeSource {
    Found(CodeArtifact),
    /// A file was named but could not be used; carries the reply for the user.
    Unreadable(String),
    Missing,
}

fn missing_code_response(intent: Intent) -> String {
    format!(
        "There is no code to {} yet. Paste it in a fenced code block, or ask me to generate some first.",
        intent.label()
    )
}

fn render_code_response(
    intent: Intent,
    artifact: Option<&CodeArtifact>,
    review: Option<&ReviewResult>,
    loop_exceeded: bool,
    retries: u32,
    failure: Option<&str>,
) -> String {
    let mut parts = Vec::new();

    if let Some(failure) = failure {
        let shown = if review.is_some() { "the best reviewed version" } else { "the latest result" };
        parts.push(format!(
            "The backend failed before the workflow finished ({}). Showing {}.",
            failure, shown
        ));
    }

    if let Some(review) = review {
        parts.push(review.render());
    }

    if loop_exceeded {
        parts.push(format!(
            "The code did not reach the pass threshold of {} after {} optimization round(s). \
             This is the best version so far.",
            PASS_THRESHOLD, retries
        ));
    }

    if let Some(code) = artifact {
        let heading = match (intent, review.is_some() && retries > 0) {
            (Intent::Generate, _) => "Generated code (optimized):",
            (Intent::Optimize, _) => "Optimized code:",
            (_, true) => "Improved code:",
            _ => "Reviewed code:",
        };
        parts.push(format!("{}\n{}", heading, code.to_markdown()));
    }

    parts.join("\n\n")
}
