//! Intent interpretation: the first stage of the pipeline.
//!
//! Converts the raw user message (plus attachments and a short context
//! window) into a structured [`Intent`] through a schema-constrained model
//! call on the fast tier.

use serde_json::{Value as JsonValue, json};

use crate::plugins::storage::{AttachedFile, Turn};
use crate::services::prompts;

use super::client::ModelTransport;
use super::types::Intent;

const MAX_CONTEXT_TURNS: usize = 3;
const CONTEXT_RESPONSE_CHARS: usize = 200;

/// Compact textual context: the last turns, each assistant response cut to
/// its opening characters.
fn context_block(history: &[Turn]) -> String {
    let mut out = String::new();
    let start = history.len().saturating_sub(MAX_CONTEXT_TURNS);
    for turn in &history[start..] {
        let response: String = turn
            .assistant_text
            .chars()
            .take(CONTEXT_RESPONSE_CHARS)
            .collect();
        out.push_str(&format!(
            "Usuário: {}\nAssistente: {}\n",
            turn.user_text, response
        ));
    }
    out
}

fn build_request(text: &str, files: &[AttachedFile], history: &[Turn]) -> JsonValue {
    let mut prompt = String::from(prompts::INTERPRETER_PREAMBLE);
    let context = context_block(history);
    if !context.is_empty() {
        prompt.push_str("\n\nContexto recente:\n");
        prompt.push_str(&context);
    }
    prompt.push_str("\n\nMensagem do usuário: ");
    prompt.push_str(text);

    let mut parts = vec![json!({ "text": prompt })];
    for file in files {
        parts.push(json!({
            "inlineData": { "mimeType": file.mime_type, "data": file.data_base64 }
        }));
    }

    json!({
        "contents": [{ "role": "user", "parts": parts }],
        "generationConfig": {
            "temperature": 0.2,
            "responseMimeType": "application/json",
            "responseSchema": prompts::intent_response_schema(),
        },
    })
}

/// Interpret a submission. Empty text with no attachments is a no-op
/// (`Ok(None)`): the model is never invoked. Any transport or parse failure
/// is an interpretation error; the caller must abort the pipeline.
pub async fn interpret<T: ModelTransport>(
    transport: &T,
    model: &str,
    text: &str,
    files: &[AttachedFile],
    history: &[Turn],
) -> Result<Option<Intent>, String> {
    if text.trim().is_empty() && files.is_empty() {
        return Ok(None);
    }

    let request = build_request(text, files, history);
    let response = transport.generate(model, &request).await?;
    let raw = response
        .text()
        .ok_or_else(|| "Resposta de interpretação vazia".to_string())?;
    let intent: Intent = serde_json::from_str(raw.trim())
        .map_err(|e| format!("Intenção ilegível: {e}"))?;
    Ok(Some(intent))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::ai::test_support::ScriptedTransport;

    fn turn(user: &str, assistant: &str) -> Turn {
        Turn::new(user.to_string(), assistant.to_string(), vec![], vec![])
    }

    fn intent_response(task: &str, subject: &str) -> serde_json::Value {
        json!({
            "candidates": [{ "content": { "parts": [
                { "text": format!(r#"{{"task":"{task}","subject":"{subject}"}}"#) }
            ]}}]
        })
    }

    #[tokio::test]
    async fn empty_submission_never_calls_the_model() {
        let transport = ScriptedTransport::new(vec![]);
        let result = interpret(&transport, "fast", "   ", &[], &[]).await;
        assert_eq!(result, Ok(None));
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn parses_the_structured_intent() {
        let transport =
            ScriptedTransport::new(vec![intent_response("criar_resumo", "texto fornecido")]);
        let intent = interpret(&transport, "fast", "Resuma este texto: Lorem ipsum", &[], &[])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(intent.task, "criar_resumo");
        assert_eq!(intent.subject, "texto fornecido");
        assert_eq!(intent.details, None);

        let request = transport.request(0);
        assert_eq!(
            request["generationConfig"]["responseMimeType"],
            json!("application/json")
        );
        assert!(request["generationConfig"]["responseSchema"].is_object());
    }

    #[tokio::test]
    async fn context_window_keeps_three_turns_and_truncates_responses() {
        let long_answer = "r".repeat(500);
        let history = vec![
            turn("primeira", "a"),
            turn("segunda", "b"),
            turn("terceira", &long_answer),
            turn("quarta", "d"),
        ];
        let transport = ScriptedTransport::new(vec![intent_response("t", "s")]);
        interpret(&transport, "fast", "nova mensagem", &[], &history)
            .await
            .unwrap();

        let prompt = transport.request(0)["contents"][0]["parts"][0]["text"]
            .as_str()
            .unwrap()
            .to_string();
        assert!(!prompt.contains("primeira"));
        assert!(prompt.contains("segunda"));
        assert!(prompt.contains("quarta"));
        assert!(prompt.contains(&"r".repeat(200)));
        assert!(!prompt.contains(&"r".repeat(201)));
    }

    #[tokio::test]
    async fn attachments_become_inline_parts() {
        let file = AttachedFile::intake("foto.png", "image/png", &[1, 2, 3]).unwrap();
        let transport = ScriptedTransport::new(vec![intent_response("t", "s")]);
        interpret(&transport, "fast", "", &[file], &[]).await.unwrap();

        let parts = transport.request(0)["contents"][0]["parts"].clone();
        assert_eq!(parts.as_array().unwrap().len(), 2);
        assert_eq!(parts[1]["inlineData"]["mimeType"], json!("image/png"));
    }

    #[tokio::test]
    async fn garbage_model_output_is_an_interpretation_error() {
        let transport = ScriptedTransport::new(vec![json!({
            "candidates": [{ "content": { "parts": [{ "text": "não sou JSON" }] } }]
        })]);
        let result = interpret(&transport, "fast", "oi", &[], &[]).await;
        assert!(result.is_err());
    }
}
