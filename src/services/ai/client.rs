//! Transport to the generative model endpoint.
//!
//! Requests are raw JSON against the `models/{model}:generateContent`
//! surface, reached through a per-request path override on the shared HTTP
//! client. The trait seam exists so the pipeline stages can be driven by a
//! scripted transport in tests.

use async_openai::{Client, config::OpenAIConfig, traits::RequestOptionsBuilder};
use serde_json::Value as JsonValue;

use crate::services::config::AiConfig;
use crate::services::retry::RetryConfig;

use super::retry_policy::should_retry_openai_error;
use super::types::ModelResponse;

/// One model call: `(model, request JSON) -> parsed response`.
#[allow(async_fn_in_trait)]
pub trait ModelTransport {
    async fn generate(&self, model: &str, request: &JsonValue) -> Result<ModelResponse, String>;
}

pub struct ModelClient {
    client: Client<OpenAIConfig>,
    api_key: String,
    retry: RetryConfig,
}

impl ModelClient {
    pub fn new(config: &AiConfig) -> Self {
        let openai_config = OpenAIConfig::new()
            .with_api_base(config.base_url.clone())
            .with_api_key(config.api_key.clone());
        Self {
            client: Client::with_config(openai_config),
            api_key: config.api_key.clone(),
            retry: RetryConfig::from_env(),
        }
    }
}

fn validate_model_name(model: &str) -> Result<(), String> {
    let model = model.trim();
    if model.is_empty() {
        return Err("Nome de modelo vazio".to_string());
    }
    // The name lands inside the request path.
    if model.contains('/') || model.contains(':') || model.contains('?') {
        return Err(format!("Nome de modelo inválido: {model}"));
    }
    Ok(())
}

impl ModelTransport for ModelClient {
    async fn generate(&self, model: &str, request: &JsonValue) -> Result<ModelResponse, String> {
        validate_model_name(model)?;
        let path = format!("/models/{model}:generateContent");

        let mut last_error: Option<String> = None;
        for attempt in 1..=self.retry.max_attempts {
            let chat = self
                .client
                .chat()
                .path(&path)
                .map_err(|e| e.to_string())?
                .query(&[("key", self.api_key.as_str())])
                .map_err(|e| e.to_string())?;

            match chat.create_byot::<_, ModelResponse>(request).await {
                Ok(response) => return Ok(response),
                Err(err) => {
                    let msg = err.to_string();
                    last_error = Some(msg.clone());
                    if attempt < self.retry.max_attempts && should_retry_openai_error(&err) {
                        log::warn!(
                            "Retry attempt {}/{} after model error: {}",
                            attempt + 1,
                            self.retry.max_attempts,
                            msg
                        );
                        tokio::time::sleep(self.retry.backoff(attempt)).await;
                        continue;
                    }
                    return Err(msg);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| "Retry limit exceeded".to_string()))
    }
}
