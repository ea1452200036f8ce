//! Primary/secondary provider failover.

use std::sync::Arc;

use thiserror::Error;
use tracing::{error, info, warn};

use ro_core::config::{Config, CredentialProvider};

use crate::llm::{GeminiProvider, LlmConfig, LlmError, LlmProvider, LlmResponse};

#[derive(Debug, Error)]
pub enum FallbackError {
    /// Primary failed and no secondary is configured.
    #[error(transparent)]
    Primary(LlmError),

    #[error("Both API keys failed. Primary: {primary}, Secondary: {secondary}")]
    Exhausted { primary: LlmError, secondary: LlmError },
}

/// Sends a single-turn prompt to the primary provider, then to the optional
/// secondary when the primary fails. Exactly one provider's text is returned.
pub struct FallbackClient {
    primary: Arc<dyn LlmProvider>,
    secondary: Option<Arc<dyn LlmProvider>>,
    config: LlmConfig,
}

impl FallbackClient {
    pub fn new(
        primary: Arc<dyn LlmProvider>,
        secondary: Option<Arc<dyn LlmProvider>>,
        config: LlmConfig,
    ) -> Self {
        Self {
            primary,
            secondary,
            config,
        }
    }

    /// Build Gemini providers from the configured key variables.
    ///
    /// A missing primary key still yields a client; every call then fails
    /// with [`LlmError::NotConfigured`] before reaching the secondary.
    pub fn from_config(config: &Config) -> Self {
        let base_url = config.providers.base_url.clone();
        let primary: Arc<dyn LlmProvider> = match CredentialProvider::primary_ai_key(config) {
            Some(key) => Arc::new(GeminiProvider::new(key).with_base_url(&base_url)),
            None => {
                warn!(
                    env = %config.providers.primary_key_env,
                    "primary AI key not set"
                );
                Arc::new(Unconfigured(config.providers.primary_key_env.clone()))
            }
        };
        let secondary = CredentialProvider::secondary_ai_key(config).map(|key| {
            Arc::new(GeminiProvider::new(key).with_base_url(&base_url)) as Arc<dyn LlmProvider>
        });
        Self::new(primary, secondary, LlmConfig::from_settings(&config.providers))
    }

    pub fn has_secondary(&self) -> bool {
        self.secondary.is_some()
    }

    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    pub async fn generate_with_fallback(&self, prompt: &str) -> Result<String, FallbackError> {
        let primary_err = match self.primary.complete(prompt, &self.config).await {
            Ok(resp) => {
                info!(model = %resp.model, output_tokens = resp.output_tokens, "generated with primary key");
                return Ok(resp.content);
            }
            Err(err) => err,
        };
        warn!(error = %primary_err, "primary API key failed");

        let Some(secondary) = &self.secondary else {
            return Err(FallbackError::Primary(primary_err));
        };

        match secondary.complete(prompt, &self.config).await {
            Ok(resp) => {
                info!(model = %resp.model, output_tokens = resp.output_tokens, "generated with secondary key");
                Ok(resp.content)
            }
            Err(secondary_err) => {
                error!(error = %secondary_err, "secondary API key also failed");
                Err(FallbackError::Exhausted {
                    primary: primary_err,
                    secondary: secondary_err,
                })
            }
        }
    }
}

/// Stands in for a provider whose key is absent.
struct Unconfigured(String);

#[async_trait::async_trait]
impl LlmProvider for Unconfigured {
    async fn complete(&self, _: &str, _: &LlmConfig) -> Result<LlmResponse, LlmError> {
        Err(LlmError::NotConfigured(self.0.clone()))
    }
}
