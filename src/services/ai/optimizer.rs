//! Prompt optimization on the higher-capability model tier.
//!
//! Scores the user's prompt, suggests improvements and proposes a rewrite.
//! Results are ephemeral: nothing here touches storage.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::services::prompts;

use super::client::ModelTransport;

const OPTIMIZER_PREAMBLE: &str = "Avalie o prompt do usuário quanto a clareza e completude \
(notas de 0 a 10), liste sugestões de melhoria por categoria e reescreva o prompt \
incorporando todas elas.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
    pub category: String,
    pub issue: String,
    pub recommendation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationResult {
    pub clarity_score: f64,
    pub completeness_score: f64,
    #[serde(default)]
    pub suggestions: Vec<Suggestion>,
    pub optimized_prompt: String,
}

fn round_score(score: f64) -> f64 {
    (score.clamp(0.0, 10.0) * 10.0).round() / 10.0
}

pub async fn optimize<T: ModelTransport>(
    transport: &T,
    model: &str,
    prompt_text: &str,
) -> Result<OptimizationResult, String> {
    let prompt_text = prompt_text.trim();
    if prompt_text.is_empty() {
        return Err("Nenhum prompt para otimizar.".to_string());
    }

    let request = json!({
        "contents": [{ "role": "user", "parts": [
            { "text": format!("{OPTIMIZER_PREAMBLE}\n\nPrompt do usuário: {prompt_text}") }
        ]}],
        "generationConfig": {
            "temperature": 0.3,
            "responseMimeType": "application/json",
            "responseSchema": prompts::optimization_response_schema(),
        },
    });

    let response = transport.generate(model, &request).await?;
    let raw = response
        .text()
        .ok_or_else(|| "Resposta de otimização vazia".to_string())?;
    let mut result: OptimizationResult = serde_json::from_str(raw.trim())
        .map_err(|e| format!("Resultado de otimização ilegível: {e}"))?;
    result.clarity_score = round_score(result.clarity_score);
    result.completeness_score = round_score(result.completeness_score);
    Ok(result)
}
