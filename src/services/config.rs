//! Shared configuration loading for the model services.
//!
//! Callers outside the crate should never receive secrets; `AiPublicConfig`
//! is safe to expose.

use serde::{Deserialize, Serialize};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_MODEL_FAST: &str = "gemini-2.5-flash-lite";
const DEFAULT_MODEL_SMART: &str = "gemini-2.5-flash";

/// Model endpoint configuration. `model_fast` drives both pipeline stages
/// (interpretation and generation); `model_smart` is reserved for prompt
/// optimization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiConfig {
    pub base_url: String,
    pub api_key: String,
    pub model_fast: String,
    pub model_smart: String,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            base_url: format!("{DEFAULT_BASE_URL}/v1beta"),
            api_key: String::new(),
            model_fast: DEFAULT_MODEL_FAST.to_string(),
            model_smart: DEFAULT_MODEL_SMART.to_string(),
        }
    }
}

fn normalize_api_base(base_url: &str) -> String {
    let mut base = base_url.trim().trim_end_matches('/').to_string();
    // The Google endpoint versions its REST surface under /v1beta.
    if base.contains("generativelanguage.googleapis.com") && !base.ends_with("/v1beta") {
        base.push_str("/v1beta");
    }
    base
}

/// Load model configuration from `.env`/environment.
///
/// Reads:
/// - `TESSY_BASE_URL`
/// - `TESSY_API_KEY` (fallback: `GEMINI_API_KEY`)
/// - `TESSY_MODEL_FAST`
/// - `TESSY_MODEL_SMART`
pub fn load_ai_config() -> AiConfig {
    let _ = dotenvy::dotenv();

    let base_url =
        std::env::var("TESSY_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());

    AiConfig {
        base_url: normalize_api_base(&base_url),
        api_key: std::env::var("TESSY_API_KEY")
            .or_else(|_| std::env::var("GEMINI_API_KEY"))
            .unwrap_or_default(),
        model_fast: std::env::var("TESSY_MODEL_FAST")
            .unwrap_or_else(|_| DEFAULT_MODEL_FAST.to_string()),
        model_smart: std::env::var("TESSY_MODEL_SMART")
            .unwrap_or_else(|_| DEFAULT_MODEL_SMART.to_string()),
    }
}

/// Public configuration with secrets omitted.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AiPublicConfig {
    pub base_url: String,
    pub model_fast: String,
    pub model_smart: String,
    pub has_api_key: bool,
}

pub fn get_ai_public_config() -> AiPublicConfig {
    let config = load_ai_config();
    AiPublicConfig {
        base_url: config.base_url,
        model_fast: config.model_fast,
        model_smart: config.model_smart,
        has_api_key: !config.api_key.is_empty(),
    }
}
