//! Runtime configuration, read from the process environment.
//!
//! A `.env` file in the working directory is honoured by the binary (see `main.rs`), which
//! calls `dotenv` before [`AppConfig::from_env`].

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde_json::{Map, Value};
use tracing::warn;
use url::Url;
use validator::Validate;

use crate::actors::llm::GatewaySettings;
use crate::actors::messages::AppError;
use crate::brain::analyzer::ClassifierKind;
use crate::models::ModelEntry;
use crate::workflow::{WorkflowPolicy, DEFAULT_MAX_RETRIES};

pub const DEFAULT_BASE_URL: &str = "https://api.siliconflow.cn/v1";
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_HISTORY_WINDOW: usize = 20;
pub const DEFAULT_MAX_STORED_TURNS: usize = 200;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

const DEFAULT_MODELS: [(&str, &str); 2] = [
    ("DeepSeek V3.1 Terminus", "deepseek-ai/DeepSeek-V3.1-Terminus"),
    ("DeepSeek V3", "deepseek-ai/DeepSeek-V3"),
];

/// Everything the core needs to run.
#[derive(Debug, Clone, Validate)]
pub struct AppConfig {
    /// Bearer credential for the completion service.
    pub api_key: Option<String>,
    pub base_url: String,
    /// Configured models, in configuration order.
    #[validate(length(min = 1))]
    pub models: Vec<ModelEntry>,
    /// Model id new sessions start with.
    #[validate(length(min = 1))]
    pub default_model: String,
    #[validate(range(min = 0.0, max = 2.0))]
    pub temperature: f32,
    #[validate(range(max = 5))]
    pub max_review_retries: u32,
    /// Prior turns included in each prompt.
    #[validate(range(min = 1))]
    pub history_window: usize,
    /// Turns kept per session; the oldest go first.
    #[validate(range(min = 2))]
    pub max_stored_turns: usize,
    pub classifier: ClassifierKind,
    #[validate(range(min = 1, max = 3600))]
    pub request_timeout_secs: u64,
    /// Directory that file names in messages are resolved against.
    pub workspace_dir: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        let models = default_models();
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            default_model: models[0].model_id.clone(),
            models,
            temperature: DEFAULT_TEMPERATURE,
            max_review_retries: DEFAULT_MAX_RETRIES,
            history_window: DEFAULT_HISTORY_WINDOW,
            max_stored_turns: DEFAULT_MAX_STORED_TURNS,
            classifier: ClassifierKind::default(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            workspace_dir: PathBuf::from("."),
        }
    }
}

impl AppConfig {
    /// Reads and validates the configuration from environment variables.
    pub fn from_env() -> Result<Self, AppError> {
        let defaults = Self::default();

        let models = match env::var("AVAILABLE_MODELS") {
            Ok(raw) if !raw.trim().is_empty() => parse_models(&raw).unwrap_or_else(|e| {
                warn!("Ignoring AVAILABLE_MODELS ({}), using the built-in list", e);
                default_models()
            }),
            _ => default_models(),
        };

        let mut config = Self {
            api_key: env::var("OPENAI_API_KEY").ok().filter(|k| !k.trim().is_empty()),
            base_url: normalize_base_url(
                &env::var("OPENAI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            )?,
            default_model: models[0].model_id.clone(),
            models,
            temperature: env_or("TEMPERATURE", defaults.temperature)?,
            max_review_retries: env_or("MAX_REVIEW_RETRIES", defaults.max_review_retries)?,
            history_window: env_or("HISTORY_WINDOW", defaults.history_window)?,
            max_stored_turns: env_or("MAX_STORED_TURNS", defaults.max_stored_turns)?,
            classifier: env_or("CLASSIFIER_STRATEGY", defaults.classifier)?,
            request_timeout_secs: env_or("REQUEST_TIMEOUT_SECS", defaults.request_timeout_secs)?,
            workspace_dir: env_or("WORKSPACE_DIR", defaults.workspace_dir)?,
        };

        if let Ok(name) = env::var("DEFAULT_MODEL") {
            if !name.trim().is_empty() {
                config.default_model = config.resolve_model(&name)?;
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Maps a display name or a model id to the model id.
    pub fn resolve_model(&self, name: &str) -> Result<String, AppError> {
        let name = name.trim();
        self.models
            .iter()
            .find(|m| m.display_name == name || m.model_id == name)
            .or_else(|| self.models.iter().find(|m| m.display_name.eq_ignore_ascii_case(name)))
            .map(|m| m.model_id.clone())
            .ok_or_else(|| AppError::Validation(format!("Unknown model: {}", name)))
    }

    pub fn models(&self) -> Vec<ModelEntry> {
        self.models.clone()
    }

    pub fn workflow_policy(&self) -> WorkflowPolicy {
        WorkflowPolicy {
            max_retries: self.max_review_retries,
            workspace_dir: self.workspace_dir.clone(),
        }
    }

    /// Gateway settings; fails when no API key is configured.
    pub fn gateway_settings(&self) -> Result<GatewaySettings, AppError> {
        let api_key = self.api_key.clone().ok_or_else(|| {
            AppError::Config("OPENAI_API_KEY is not set (environment or .env file)".to_string())
        })?;
        Ok(GatewaySettings {
            base_url: self.base_url.clone(),
            api_key,
            temperature: self.temperature,
            request_timeout: Duration::from_secs(self.request_timeout_secs),
        })
    }
}

fn default_models() -> Vec<ModelEntry> {
    DEFAULT_MODELS
        .iter()
        .map(|(display_name, model_id)| ModelEntry {
            display_name: display_name.to_string(),
            model_id: model_id.to_string(),
        })
        .collect()
}

/// Parses a JSON object of display name to model id, keeping its order.
fn parse_models(raw: &str) -> Result<Vec<ModelEntry>, AppError> {
    let map: Map<String, Value> = serde_json::from_str(raw)?;
    let mut models = Vec::with_capacity(map.len());
    for (display_name, value) in map {
        match value {
            Value::String(model_id) if !model_id.trim().is_empty() => models.push(ModelEntry {
                display_name,
                model_id,
            }),
            other => {
                return Err(AppError::Validation(format!(
                    "model '{}' must map to a non-empty id, got {}",
                    display_name, other
                )))
            }
        }
    }
    if models.is_empty() {
        return Err(AppError::Validation("no models listed".to_string()));
    }
    Ok(models)
}

fn normalize_base_url(raw: &str) -> Result<String, AppError> {
    let url = Url::parse(raw.trim())?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(AppError::Config(format!("Unsupported base URL scheme: {}", url.scheme())));
    }
    Ok(url.as_str().trim_end_matches('/').to_string())
}

fn env_or<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e| AppError::Config(format!("Invalid {}: {}", key, e))),
        _ => Ok(default),
    }
}
