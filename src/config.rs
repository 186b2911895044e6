//! Configuration types.

use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// Environment variable holding the model API key. Read lazily by `LazyClient`.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Pipeline configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Chat completion model used for structured extraction.
    pub model: String,
    /// Base URL of the OpenAI-compatible API.
    pub base_url: String,
    /// Optional project id sent as `OpenAI-Project`.
    pub project_id: Option<String>,
    /// Sampling temperature for extraction.
    pub temperature: f32,
    /// Token budget for the extraction answer.
    pub max_tokens: u32,
    /// Hard ceiling on a single model call before falling back.
    pub model_timeout: Duration,
    /// Character ceiling on the subject + body + attachments blob.
    pub max_text_chars: usize,
    /// Validated examples embedded per prompt.
    pub golden_examples: usize,
    /// Most recent budget lines considered when deduplicating.
    pub budget_scan_limit: usize,
    /// Attachments larger than this are not read as text.
    pub max_attachment_bytes: usize,
    /// Messages processed concurrently by `process_batch`.
    pub batch_concurrency: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            project_id: None,
            temperature: 0.1,
            max_tokens: 1500,
            model_timeout: Duration::from_secs(15),
            max_text_chars: 15_000,
            golden_examples: 3,
            budget_scan_limit: 25,
            max_attachment_bytes: 5 * 1024 * 1024,
            batch_concurrency: 4,
        }
    }
}

impl PipelineConfig {
    /// Build the config from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the config from an arbitrary key lookup, starting from defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(model) = lookup("QUOTE_INBOX_MODEL").or_else(|| lookup("OPENAI_MODEL")) {
            config.model = model;
        }
        if let Some(base_url) = lookup("OPENAI_BASE_URL") {
            config.base_url = base_url;
        }
        config.project_id = lookup("OPENAI_PROJECT_ID").filter(|s| !s.trim().is_empty());

        if let Some(secs) = parse_var::<u64, _>(&lookup, "QUOTE_INBOX_MODEL_TIMEOUT_SECS")? {
            if secs == 0 {
                return Err(ConfigError::InvalidValue {
                    key: "QUOTE_INBOX_MODEL_TIMEOUT_SECS".into(),
                    message: "timeout must be at least one second".into(),
                });
            }
            config.model_timeout = Duration::from_secs(secs);
        }
        if let Some(chars) = parse_var(&lookup, "QUOTE_INBOX_MAX_TEXT_CHARS")? {
            config.max_text_chars = chars;
        }
        if let Some(limit) = parse_var(&lookup, "QUOTE_INBOX_BUDGET_SCAN_LIMIT")? {
            config.budget_scan_limit = limit;
        }
        if let Some(bytes) = parse_var(&lookup, "EMAIL_ANALYSIS_MAX_ATTACHMENT_BYTES")? {
            config.max_attachment_bytes = bytes;
        }
        if let Some(n) = parse_var::<usize, _>(&lookup, "QUOTE_INBOX_BATCH_CONCURRENCY")? {
            config.batch_concurrency = n.max(1);
        }

        Ok(config)
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("'{raw}': {e}"),
            }),
    }
}
