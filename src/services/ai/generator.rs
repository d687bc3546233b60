//! Factor-conditioned generation: the second stage of the pipeline.
//!
//! Builds the system instruction from the factor set, replays a short
//! history window, and drives the function-calling loop against the
//! repository tools when a repository is bound.

use chrono::Utc;
use serde_json::{Value as JsonValue, json};

use crate::plugins::storage::{AttachedFile, Factor, Turn};
use crate::services::github::{self, GithubClient, RepoBinding};
use crate::services::prompts;

use super::client::ModelTransport;
use super::types::{GenerationOutcome, Intent};

/// Hard cap on model round-trips within one generation, so pathological
/// tool-calling behavior still terminates.
pub const MAX_TOOL_ROUNDS: usize = 5;
const MAX_HISTORY_TURNS: usize = 3;
pub const NO_RESPONSE_FALLBACK: &str = "Não foi possível gerar uma resposta.";

pub struct GenerationRequest<'a> {
    pub intent: &'a Intent,
    pub user_text: &'a str,
    pub files: &'a [AttachedFile],
    pub history: &'a [Turn],
    pub factors: &'a [Factor],
    pub grounding_enabled: bool,
}

/// Tool selection is mutually exclusive: the model API cannot combine
/// function-calling tools with search grounding in one request, so a bound
/// repository always wins and grounding is only offered without one.
fn select_tools(repo_configured: bool, grounding_enabled: bool) -> Option<JsonValue> {
    if repo_configured {
        Some(json!([
            { "functionDeclarations": prompts::repository_tool_declarations() }
        ]))
    } else if grounding_enabled {
        Some(json!([{ "googleSearch": {} }]))
    } else {
        None
    }
}

fn initial_contents(request: &GenerationRequest<'_>) -> Vec<JsonValue> {
    let mut contents = Vec::new();

    let start = request.history.len().saturating_sub(MAX_HISTORY_TURNS);
    for turn in &request.history[start..] {
        contents.push(json!({ "role": "user", "parts": [{ "text": turn.user_text }] }));
        contents.push(json!({ "role": "model", "parts": [{ "text": turn.assistant_text }] }));
    }

    let intent = request.intent;
    let mut prompt = format!("Tarefa: {}\nAssunto: {}", intent.task, intent.subject);
    if let Some(details) = intent.details.as_deref() {
        prompt.push_str(&format!("\nDetalhes: {details}"));
    }
    if let Some(language) = intent.language.as_deref() {
        prompt.push_str(&format!("\nIdioma pedido: {language}"));
    }
    prompt.push_str(&format!("\n\nMensagem do usuário: {}", request.user_text));

    let mut parts = vec![json!({ "text": prompt })];
    for file in request.files {
        parts.push(json!({
            "inlineData": { "mimeType": file.mime_type, "data": file.data_base64 }
        }));
    }
    contents.push(json!({ "role": "user", "parts": parts }));

    contents
}

/// Produce the final response for an interpreted intent. Every failure comes
/// back as a user-visible error string; nothing panics past this boundary.
pub async fn generate<T: ModelTransport>(
    transport: &T,
    model: &str,
    github: &GithubClient,
    binding: Option<&RepoBinding>,
    request: GenerationRequest<'_>,
) -> Result<GenerationOutcome, String> {
    let now_local = Utc::now().with_timezone(&prompts::local_offset());
    let instruction =
        prompts::build_system_instruction(request.factors, now_local, binding.is_some());
    let tools = select_tools(binding.is_some(), request.grounding_enabled);
    let mut contents = initial_contents(&request);

    let mut final_text: Option<String> = None;
    let mut citations = Vec::new();

    for round in 0..MAX_TOOL_ROUNDS {
        let mut body = json!({
            "contents": contents,
            "systemInstruction": { "parts": [{ "text": instruction }] },
            "generationConfig": { "temperature": 0.7 },
        });
        if let Some(tools) = &tools {
            body["tools"] = tools.clone();
        }

        let response = transport.generate(model, &body).await?;
        final_text = response.text();
        citations = response.citations();

        let calls: Vec<(String, JsonValue)> = response
            .function_calls()
            .into_iter()
            .map(|c| (c.name.clone(), c.args.clone()))
            .collect();
        // Calls still pending on the last round are dropped unexecuted:
        // some tools write (create_issue) and their outcome would have
        // nowhere to go.
        if calls.is_empty() || round + 1 == MAX_TOOL_ROUNDS {
            break;
        }

        // Replay the model's tool-call turn, then answer each call with a
        // synthetic tool-response turn, and go around again.
        let call_parts: Vec<JsonValue> = calls
            .iter()
            .map(|(name, args)| json!({ "functionCall": { "name": name, "args": args } }))
            .collect();
        contents = {
            let mut next = body["contents"].as_array().cloned().unwrap_or_default();
            next.push(json!({ "role": "model", "parts": call_parts }));

            let mut response_parts = Vec::with_capacity(calls.len());
            for (name, args) in &calls {
                let result = github::execute_repository_tool(github, binding, name, args).await;
                response_parts
                    .push(json!({ "functionResponse": { "name": name, "response": result } }));
            }
            next.push(json!({ "role": "user", "parts": response_parts }));
            next
        };
    }

    Ok(GenerationOutcome {
        text: final_text.unwrap_or_else(|| NO_RESPONSE_FALLBACK.to_string()),
        citations,
    })
}
