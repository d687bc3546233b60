//! Conversation orchestrator: sequences the Interpret→Generate pipeline and
//! owns the in-memory session state.
//!
//! One pipeline runs at a time, guarded by the loading flag. Every
//! submission ends by clearing the pending echo and the flag, whatever the
//! outcome.

use crate::plugins::storage::{
    AttachedFile, Conversation, Factor, FlatStore, Turn, toggle_enabled,
};
use crate::services::ai::client::ModelTransport;
use crate::services::ai::generator::{self, GenerationRequest};
use crate::services::ai::interpreter;
use crate::services::config::AiConfig;
use crate::services::github::{GithubClient, RepoBinding};

const ERR_EMPTY_SUBMISSION: &str = "Digite uma mensagem ou anexe um arquivo.";
const ERR_BUSY: &str = "Aguarde a resposta atual antes de enviar outra mensagem.";
const ERR_INTERPRETATION: &str = "Não foi possível interpretar a mensagem.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStatus {
    Idle,
    Interpreting,
    Generating,
    Error,
}

/// The user message echoed optimistically while the pipeline runs.
#[derive(Debug, Clone)]
pub struct PendingEcho {
    pub text: String,
    pub files: Vec<AttachedFile>,
}

pub struct ChatSession {
    conversation: Conversation,
    factors: Vec<Factor>,
    binding: Option<RepoBinding>,
    github: GithubClient,
    store: FlatStore,
    config: AiConfig,
    status: PipelineStatus,
    pending: Option<PendingEcho>,
    last_error: Option<String>,
    loading: bool,
}

impl ChatSession {
    /// Fresh session: factors come from storage (or the defaults), the
    /// conversation starts empty.
    pub fn new(store: FlatStore, config: AiConfig) -> Self {
        let factors = store.load_factors().unwrap_or_else(Factor::default_set);
        Self {
            conversation: Conversation::new(None),
            factors,
            binding: None,
            github: GithubClient::new(),
            store,
            config,
            status: PipelineStatus::Idle,
            pending: None,
            last_error: None,
            loading: false,
        }
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn factors(&self) -> &[Factor] {
        &self.factors
    }

    pub fn status(&self) -> PipelineStatus {
        self.status
    }

    pub fn pending(&self) -> Option<&PendingEcho> {
        self.pending.as_ref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn clear_error(&mut self) {
        self.last_error = None;
        if self.status == PipelineStatus::Error {
            self.status = PipelineStatus::Idle;
        }
    }

    /// Replace the factor set and persist it.
    pub fn update_factors(&mut self, factors: Vec<Factor>) {
        self.store.save_factors(&factors);
        self.factors = factors;
    }

    /// Bind (or unbind) the repository used by the generation tools.
    pub fn set_repository(&mut self, binding: Option<RepoBinding>) {
        self.binding = binding;
    }

    /// Discard in-memory state and start an empty conversation. The
    /// superseded conversation stays in storage untouched.
    pub fn new_conversation(&mut self) {
        self.conversation = Conversation::new(None);
        self.status = PipelineStatus::Idle;
        self.last_error = None;
    }

    /// Load a stored conversation into the session.
    pub fn open_conversation(&mut self, id: &str) -> bool {
        match self.store.load_conversation(id) {
            Some(conversation) => {
                self.conversation = conversation;
                self.status = PipelineStatus::Idle;
                self.last_error = None;
                true
            }
            None => false,
        }
    }

    /// Run one Interpret→Generate submission.
    pub async fn submit<T: ModelTransport>(
        &mut self,
        transport: &T,
        text: &str,
        files: Vec<AttachedFile>,
    ) -> Result<(), String> {
        if text.trim().is_empty() && files.is_empty() {
            return Err(ERR_EMPTY_SUBMISSION.to_string());
        }
        if self.loading {
            return Err(ERR_BUSY.to_string());
        }

        // Capture the submission; the caller's input surface is free again.
        let captured = PendingEcho {
            text: text.to_string(),
            files,
        };
        self.loading = true;
        self.last_error = None;
        self.pending = Some(captured.clone());

        let result = self.run_pipeline(transport, &captured).await;

        // Guaranteed cleanup, success or failure.
        self.pending = None;
        self.loading = false;
        match result {
            Ok(()) => {
                self.status = PipelineStatus::Idle;
                Ok(())
            }
            Err(err) => {
                self.status = PipelineStatus::Error;
                self.last_error = Some(err.clone());
                Err(err)
            }
        }
    }

    async fn run_pipeline<T: ModelTransport>(
        &mut self,
        transport: &T,
        captured: &PendingEcho,
    ) -> Result<(), String> {
        self.status = PipelineStatus::Interpreting;
        let intent = interpreter::interpret(
            transport,
            &self.config.model_fast,
            &captured.text,
            &captured.files,
            &self.conversation.turns,
        )
        .await?
        .ok_or_else(|| ERR_INTERPRETATION.to_string())?;

        self.status = PipelineStatus::Generating;
        let grounding_enabled = toggle_enabled(&self.factors, "web_search");
        let outcome = generator::generate(
            transport,
            &self.config.model_fast,
            &self.github,
            self.binding.as_ref(),
            GenerationRequest {
                intent: &intent,
                user_text: &captured.text,
                files: &captured.files,
                history: &self.conversation.turns,
                factors: &self.factors,
                grounding_enabled,
            },
        )
        .await?;

        self.conversation.append_turn(Turn::new(
            captured.text.clone(),
            outcome.text,
            captured.files.clone(),
            outcome.citations,
        ));
        self.store.save_conversation(&self.conversation);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::ai::test_support::ScriptedTransport;
    use serde_json::json;
    use tempfile::TempDir;

    fn session() -> (TempDir, ChatSession) {
        let dir = TempDir::new().unwrap();
        let store = FlatStore::new(dir.path()).unwrap();
        (dir, ChatSession::new(store, AiConfig::default()))
    }

    fn intent_response() -> serde_json::Value {
        json!({ "candidates": [{ "content": { "parts": [
            { "text": r#"{"task":"criar_resumo","subject":"texto fornecido"}"# }
        ]}}]})
    }

    fn text_response(text: &str) -> serde_json::Value {
        json!({ "candidates": [{ "content": { "parts": [{ "text": text }] } }] })
    }

    #[tokio::test]
    async fn empty_submission_is_rejected_without_state_change() {
        let (_dir, mut session) = session();
        let transport = ScriptedTransport::new(vec![]);

        let result = session.submit(&transport, "   ", vec![]).await;
        assert_eq!(result, Err(ERR_EMPTY_SUBMISSION.to_string()));
        assert_eq!(transport.call_count(), 0);
        assert_eq!(session.status(), PipelineStatus::Idle);
        assert!(session.conversation().turns.is_empty());
        assert!(session.pending().is_none());
    }

    #[tokio::test]
    async fn busy_session_refuses_resubmission() {
        let (_dir, mut session) = session();
        session.loading = true;
        let transport = ScriptedTransport::new(vec![]);

        let result = session.submit(&transport, "oi", vec![]).await;
        assert_eq!(result, Err(ERR_BUSY.to_string()));
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn summary_scenario_appends_one_turn_and_freezes_the_title() {
        let (_dir, mut session) = session();
        // Grounding enabled, no repository bound.
        let mut factors = session.factors().to_vec();
        factors
            .iter_mut()
            .find(|f| f.id == "web_search")
            .unwrap()
            .enabled = true;
        session.update_factors(factors);

        let transport = ScriptedTransport::new(vec![
            intent_response(),
            text_response("Resumo: o texto trata de…"),
        ]);

        let user_text =
            "Resuma este texto: Lorem ipsum dolor sit amet, consectetur adipiscing elit";
        session.submit(&transport, user_text, vec![]).await.unwrap();

        assert_eq!(transport.call_count(), 2);
        // The generation call offered google search as its only tool.
        let tools = transport.request(1)["tools"].clone();
        assert!(tools[0]["googleSearch"].is_object());
        assert!(tools[0].get("functionDeclarations").is_none());

        assert_eq!(session.status(), PipelineStatus::Idle);
        assert!(!session.is_loading());
        assert!(session.pending().is_none());

        let conv = session.conversation();
        assert_eq!(conv.turns.len(), 1);
        assert_eq!(conv.turns[0].assistant_text, "Resumo: o texto trata de…");
        let expected_title: String = user_text.chars().take(50).collect::<String>() + "…";
        assert_eq!(conv.title, expected_title);

        // Persisted.
        assert!(session.store.load_conversation(&conv.id).is_some());
    }

    #[tokio::test]
    async fn interpretation_failure_records_no_turn() {
        let (_dir, mut session) = session();
        // The transport errors: script exhausted.
        let transport = ScriptedTransport::new(vec![]);

        let result = session.submit(&transport, "olá", vec![]).await;
        assert!(result.is_err());
        assert_eq!(session.status(), PipelineStatus::Error);
        assert!(session.last_error().is_some());
        assert!(session.conversation().turns.is_empty());
        assert!(session.pending().is_none());
        assert!(!session.is_loading());

        session.clear_error();
        assert_eq!(session.status(), PipelineStatus::Idle);
        assert!(session.last_error().is_none());
    }

    #[tokio::test]
    async fn new_conversation_discards_memory_but_not_storage() {
        let (_dir, mut session) = session();
        let transport =
            ScriptedTransport::new(vec![intent_response(), text_response("resposta")]);
        session.submit(&transport, "primeira mensagem", vec![]).await.unwrap();
        let old_id = session.conversation().id.clone();

        session.new_conversation();
        assert_ne!(session.conversation().id, old_id);
        assert!(session.conversation().turns.is_empty());
        assert!(session.store.load_conversation(&old_id).is_some());

        assert!(session.open_conversation(&old_id));
        assert_eq!(session.conversation().id, old_id);
        assert!(!session.open_conversation("conv_missing"));
    }
}
