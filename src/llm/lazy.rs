//! Lazily constructed, process-wide model client.
//!
//! Credentials may only appear after startup configuration has run, so the
//! client is built on first use. A failed attempt leaves the cell empty and
//! the next call tries again; a successful one is reused for the process
//! lifetime.

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::SecretString;
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::config::{API_KEY_ENV, PipelineConfig};
use crate::error::LlmError;
use crate::llm::{LlmConfig, LlmProvider, create_provider};

/// Source of an optional model client.
#[async_trait]
pub trait ClientProvider: Send + Sync {
    /// The client, or `None` when no credentials are configured.
    async fn client(&self) -> Option<Arc<dyn LlmProvider>>;
}

type CredentialFn = dyn Fn() -> Option<SecretString> + Send + Sync;

/// Memoized client built from credentials resolved at first use.
pub struct LazyClient {
    cell: OnceCell<Arc<dyn LlmProvider>>,
    credentials: Box<CredentialFn>,
    model: String,
    base_url: String,
    project_id: Option<String>,
    timeout: std::time::Duration,
}

impl LazyClient {
    /// Read the API key from `OPENAI_API_KEY` when first needed.
    pub fn from_env(config: &PipelineConfig) -> Self {
        Self::with_credentials(config, || {
            std::env::var(API_KEY_ENV)
                .ok()
                .filter(|k| !k.trim().is_empty())
                .map(SecretString::from)
        })
    }

    /// Use a custom credential source.
    pub fn with_credentials<F>(config: &PipelineConfig, credentials: F) -> Self
    where
        F: Fn() -> Option<SecretString> + Send + Sync + 'static,
    {
        Self {
            cell: OnceCell::new(),
            credentials: Box::new(credentials),
            model: config.model.clone(),
            base_url: config.base_url.clone(),
            project_id: config.project_id.clone(),
            timeout: config.model_timeout,
        }
    }

    /// Whether a client has been built.
    pub fn is_initialized(&self) -> bool {
        self.cell.initialized()
    }

    async fn init(&self) -> Result<Arc<dyn LlmProvider>, LlmError> {
        let api_key = (self.credentials)().ok_or_else(|| LlmError::NotConfigured {
            provider: "openai".to_string(),
            reason: format!("{API_KEY_ENV} is not set"),
        })?;

        if self.project_id.is_none() {
            warn!("OPENAI_PROJECT_ID not set; project-scoped keys may be rejected");
        }

        let provider = create_provider(&LlmConfig {
            api_key,
            model: self.model.clone(),
            base_url: self.base_url.clone(),
            project_id: self.project_id.clone(),
            timeout: self.timeout,
        })?;
        info!(model = %self.model, "Model client initialized");
        Ok(provider)
    }
}

#[async_trait]
impl ClientProvider for LazyClient {
    async fn client(&self) -> Option<Arc<dyn LlmProvider>> {
        match self.cell.get_or_try_init(|| self.init()).await {
            Ok(client) => Some(Arc::clone(client)),
            Err(e) => {
                warn!(error = %e, "Model client unavailable");
                None
            }
        }
    }
}

/// A fixed client (or none). Used for explicit injection and tests.
#[derive(Clone, Default)]
pub struct FixedClient(Option<Arc<dyn LlmProvider>>);

impl FixedClient {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self(Some(provider))
    }

    pub fn none() -> Self {
        Self(None)
    }
}

#[async_trait]
impl ClientProvider for FixedClient {
    async fn client(&self) -> Option<Arc<dyn LlmProvider>> {
        self.0.clone()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use super::*;

    #[tokio::test]
    async fn missing_credentials_yield_none_without_panicking() {
        let lazy = LazyClient::with_credentials(&PipelineConfig::default(), || None);
        assert!(lazy.client().await.is_none());
        assert!(!lazy.is_initialized());
    }

    #[tokio::test]
    async fn credentials_appearing_later_are_picked_up() {
        let available = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&available);
        let lazy = LazyClient::with_credentials(&PipelineConfig::default(), move || {
            flag.load(Ordering::SeqCst)
                .then(|| SecretString::from("sk-late"))
        });

        assert!(lazy.client().await.is_none());
        available.store(true, Ordering::SeqCst);
        let client = lazy.client().await.expect("client after credentials appear");
        assert_eq!(client.model_name(), "gpt-4o-mini");
        assert!(lazy.is_initialized());
    }

    #[tokio::test]
    async fn initialization_is_memoized() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let lazy = LazyClient::with_credentials(&PipelineConfig::default(), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Some(SecretString::from("sk-once"))
        });

        let first = lazy.client().await.unwrap();
        let second = lazy.client().await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn fixed_none_has_no_client() {
        assert!(FixedClient::none().client().await.is_none());
    }
}
