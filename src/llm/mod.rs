//! Model integration for structured extraction.
//!
//! A single OpenAI-compatible backend (`OpenAiCompatProvider`) sits behind
//! the `LlmProvider` trait. The extractor never holds a provider directly: it
//! asks a `ClientProvider` for one, which lets the process start without
//! credentials and lets tests inject fakes.

pub mod lazy;
pub mod openai;
pub mod provider;

pub use lazy::{ClientProvider, FixedClient, LazyClient};
pub use openai::OpenAiCompatProvider;
pub use provider::*;

use std::sync::Arc;
use std::time::Duration;

use crate::error::LlmError;

/// Configuration for creating an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: secrecy::SecretString,
    pub model: String,
    pub base_url: String,
    pub project_id: Option<String>,
    pub timeout: Duration,
}

/// Create an LLM provider from configuration.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    let provider = OpenAiCompatProvider::new(
        config.base_url.clone(),
        config.api_key.clone(),
        config.model.clone(),
        config.project_id.clone(),
        config.timeout,
    )?;
    tracing::info!("Using OpenAI-compatible endpoint (model: {})", config.model);
    Ok(Arc::new(provider))
}
