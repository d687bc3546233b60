//! Flat key-value store: one string value per key, persisted as files under
//! a caller-supplied root directory.
//!
//! This is the legacy-compatible storage layer: the conversation set lives
//! under a single key as a base64/LZW-compressed JSON array, everything else
//! is plain JSON. All operations are best-effort — quota, I/O and parse
//! failures are logged and degrade to empty/absent results so a storage
//! problem never takes the interactive session down.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::PathBuf;

use uuid::Uuid;

use super::lzw;
use super::types::{Conversation, Factor, RepositoryItem, Template, new_id, now_ms};

const KEY_CONVERSATIONS: &str = "tessy_conversations";
const KEY_LAST_CONVERSATION: &str = "tessy_last_conversation";
const KEY_FACTORS: &str = "tessy_factors";
const KEY_SAVED_PROMPTS: &str = "tessy_saved_prompts";
const KEY_TEMPLATES: &str = "tessy_templates";
const KEY_SHARE_CODES: &str = "tessy_share_codes";

const RETENTION_MS: u64 = 30 * 24 * 60 * 60 * 1000;
const SHARE_CODE_LEN: usize = 6;

#[derive(Clone)]
pub struct FlatStore {
    root: PathBuf,
}

impl FlatStore {
    pub fn new(root: impl Into<PathBuf>) -> std::io::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn read_key(&self, key: &str) -> Option<String> {
        match std::fs::read_to_string(self.root.join(key)) {
            Ok(value) => Some(value),
            Err(err) if err.kind() == ErrorKind::NotFound => None,
            Err(err) => {
                log::warn!("Flat store read failed for {key}: {err}");
                None
            }
        }
    }

    fn write_key(&self, key: &str, value: &str) {
        if let Err(err) = std::fs::write(self.root.join(key), value) {
            log::warn!("Flat store write failed for {key}: {err}");
        }
    }

    fn remove_key(&self, key: &str) {
        match std::fs::remove_file(self.root.join(key)) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => log::warn!("Flat store remove failed for {key}: {err}"),
        }
    }

    fn read_json<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.read_key(key)?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(err) => {
                log::warn!("Flat store parse failed for {key}: {err}");
                None
            }
        }
    }

    fn write_json<T: serde::Serialize>(&self, key: &str, value: &T) {
        match serde_json::to_string(value) {
            Ok(raw) => self.write_key(key, &raw),
            Err(err) => log::warn!("Flat store serialize failed for {key}: {err}"),
        }
    }

    // ---- Conversations (compressed blob) ----

    /// Upsert by id, rewrite the compressed set, record the id as the last
    /// active conversation.
    pub fn save_conversation(&self, conv: &Conversation) {
        let mut all = self.get_all_conversations();
        match all.iter_mut().find(|c| c.id == conv.id) {
            Some(slot) => *slot = conv.clone(),
            None => all.push(conv.clone()),
        }
        self.write_conversations(&all);
        self.write_key(KEY_LAST_CONVERSATION, &conv.id);
    }

    /// Read the whole stored set. Tries the compressed format first and
    /// falls back to plain JSON — the fallback is a compatibility contract
    /// with the earlier uncompressed format, not an error path.
    pub fn get_all_conversations(&self) -> Vec<Conversation> {
        let Some(raw) = self.read_key(KEY_CONVERSATIONS) else {
            return Vec::new();
        };

        let decoded = match lzw::decompress(&raw) {
            Ok(json) => json,
            Err(_) => raw,
        };
        match serde_json::from_str(&decoded) {
            Ok(list) => list,
            Err(err) => {
                log::warn!("Stored conversations unreadable: {err}");
                Vec::new()
            }
        }
    }

    pub fn load_conversation(&self, id: &str) -> Option<Conversation> {
        self.get_all_conversations().into_iter().find(|c| c.id == id)
    }

    pub fn load_last_conversation(&self) -> Option<Conversation> {
        let id = self.read_key(KEY_LAST_CONVERSATION)?;
        self.load_conversation(id.trim())
    }

    pub fn delete_conversation(&self, id: &str) {
        let mut all = self.get_all_conversations();
        let before = all.len();
        all.retain(|c| c.id != id);
        if all.len() != before {
            self.write_conversations(&all);
        }
        if self.read_key(KEY_LAST_CONVERSATION).as_deref() == Some(id) {
            self.remove_key(KEY_LAST_CONVERSATION);
        }
    }

    /// Drop conversations untouched for more than 30 days. Storage is only
    /// rewritten when something was actually removed.
    pub fn clean_old_conversations(&self) -> usize {
        let cutoff = now_ms().saturating_sub(RETENTION_MS);
        let mut all = self.get_all_conversations();
        let before = all.len();
        all.retain(|c| c.updated_at_ms >= cutoff);
        let removed = before - all.len();
        if removed > 0 {
            self.write_conversations(&all);
        }
        removed
    }

    fn write_conversations(&self, all: &[Conversation]) {
        match serde_json::to_string(all) {
            Ok(json) => self.write_key(KEY_CONVERSATIONS, &lzw::compress(&json)),
            Err(err) => log::warn!("Conversation serialize failed: {err}"),
        }
    }

    // ---- Factors (plain JSON) ----

    pub fn save_factors(&self, factors: &[Factor]) {
        self.write_json(KEY_FACTORS, &factors);
    }

    pub fn load_factors(&self) -> Option<Vec<Factor>> {
        self.read_json(KEY_FACTORS)
    }

    // ---- Saved prompts ----

    /// Assigns id/timestamp when missing and prepends.
    pub fn add_repository_item(&self, mut item: RepositoryItem) -> RepositoryItem {
        if item.id.is_empty() {
            item.id = new_id("item");
        }
        if item.created_at_ms == 0 {
            item.created_at_ms = now_ms();
        }
        let mut all = self.list_repository_items(None);
        all.insert(0, item.clone());
        self.write_json(KEY_SAVED_PROMPTS, &all);
        item
    }

    /// Case-insensitive substring filter over title, content and tags.
    pub fn list_repository_items(&self, filter: Option<&str>) -> Vec<RepositoryItem> {
        let all: Vec<RepositoryItem> = self.read_json(KEY_SAVED_PROMPTS).unwrap_or_default();
        let Some(filter) = filter.map(str::to_lowercase).filter(|f| !f.is_empty()) else {
            return all;
        };
        all.into_iter()
            .filter(|item| {
                item.title.to_lowercase().contains(&filter)
                    || item.content.to_lowercase().contains(&filter)
                    || item.tags.iter().any(|t| t.to_lowercase().contains(&filter))
            })
            .collect()
    }

    pub fn delete_repository_item(&self, id: &str) {
        let mut all = self.list_repository_items(None);
        all.retain(|item| item.id != id);
        self.write_json(KEY_SAVED_PROMPTS, &all);
    }

    /// All tags across saved prompts: lower-cased, de-duplicated, sorted.
    pub fn all_tags(&self) -> Vec<String> {
        let mut tags: Vec<String> = self
            .list_repository_items(None)
            .iter()
            .flat_map(|item| item.tags.iter())
            .map(|t| t.to_lowercase())
            .collect();
        tags.sort();
        tags.dedup();
        tags
    }

    // ---- Templates ----

    pub fn add_template(&self, mut template: Template) -> Template {
        if template.id.is_empty() {
            template.id = new_id("tpl");
        }
        if template.created_at_ms == 0 {
            template.created_at_ms = now_ms();
        }
        let mut all = self.list_templates(None);
        all.insert(0, template.clone());
        self.write_json(KEY_TEMPLATES, &all);
        template
    }

    /// Case-insensitive substring filter over title and content.
    pub fn list_templates(&self, filter: Option<&str>) -> Vec<Template> {
        let all: Vec<Template> = self.read_json(KEY_TEMPLATES).unwrap_or_default();
        let Some(filter) = filter.map(str::to_lowercase).filter(|f| !f.is_empty()) else {
            return all;
        };
        all.into_iter()
            .filter(|t| {
                t.title.to_lowercase().contains(&filter)
                    || t.content.to_lowercase().contains(&filter)
            })
            .collect()
    }

    pub fn delete_template(&self, id: &str) {
        let mut all = self.list_templates(None);
        all.retain(|t| t.id != id);
        self.write_json(KEY_TEMPLATES, &all);
    }

    // ---- Share codes ----

    /// Map a fresh 6-character alphanumeric code to a conversation id.
    pub fn create_share_code(&self, conversation_id: &str) -> String {
        let mut codes: HashMap<String, String> =
            self.read_json(KEY_SHARE_CODES).unwrap_or_default();
        let mut code = share_code();
        while codes.contains_key(&code) {
            code = share_code();
        }
        codes.insert(code.clone(), conversation_id.to_string());
        self.write_json(KEY_SHARE_CODES, &codes);
        code
    }

    /// Import requires an exact 6-character match and a locally known code.
    pub fn resolve_share_code(&self, code: &str) -> Option<String> {
        if code.len() != SHARE_CODE_LEN {
            return None;
        }
        let codes: HashMap<String, String> = self.read_json(KEY_SHARE_CODES)?;
        codes.get(code).cloned()
    }
}

fn share_code() -> String {
    Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(SHARE_CODE_LEN)
        .collect::<String>()
        .to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::storage::types::Turn;
    use tempfile::TempDir;

    fn store() -> (TempDir, FlatStore) {
        let dir = TempDir::new().unwrap();
        let store = FlatStore::new(dir.path()).unwrap();
        (dir, store)
    }

    fn conversation(text: &str) -> Conversation {
        let mut conv = Conversation::new(None);
        conv.append_turn(Turn::new(
            text.to_string(),
            "resposta".to_string(),
            vec![],
            vec![],
        ));
        conv
    }

    #[test]
    fn save_then_load_is_structurally_equal() {
        let (_dir, store) = store();
        let conv = conversation("Olá, Tessy! Você pode me ajudar com código?");
        store.save_conversation(&conv);
        assert_eq!(store.load_conversation(&conv.id), Some(conv));
    }

    #[test]
    fn last_conversation_pointer_follows_saves() {
        let (_dir, store) = store();
        let first = conversation("primeira");
        let second = conversation("segunda");
        store.save_conversation(&first);
        store.save_conversation(&second);
        assert_eq!(store.load_last_conversation(), Some(second));
    }

    #[test]
    fn delete_clears_pointer_when_it_referenced_the_deleted_id() {
        let (_dir, store) = store();
        let conv = conversation("apague-me");
        store.save_conversation(&conv);
        store.delete_conversation(&conv.id);
        assert!(store.load_conversation(&conv.id).is_none());
        assert!(store.load_last_conversation().is_none());
    }

    #[test]
    fn plain_json_payload_is_still_readable() {
        let (_dir, store) = store();
        let conv = conversation("formato antigo");
        let plain = serde_json::to_string(&vec![conv.clone()]).unwrap();
        // Written directly, bypassing compression: the legacy format.
        store.write_key(KEY_CONVERSATIONS, &plain);
        assert_eq!(store.get_all_conversations(), vec![conv]);
    }

    #[test]
    fn retention_removes_exactly_the_expired_conversation() {
        let (_dir, store) = store();
        let day_ms = 24 * 60 * 60 * 1000;

        let fresh = conversation("fresca");
        let mut near = conversation("quase");
        near.updated_at_ms = now_ms() - 29 * day_ms;
        let mut stale = conversation("velha");
        stale.updated_at_ms = now_ms() - 31 * day_ms;

        for conv in [&fresh, &near, &stale] {
            let mut all = store.get_all_conversations();
            all.push((*conv).clone());
            store.write_conversations(&all);
        }

        assert_eq!(store.clean_old_conversations(), 1);
        let remaining = store.get_all_conversations();
        assert_eq!(remaining.len(), 2);
        assert!(remaining.iter().all(|c| c.id != stale.id));
    }

    #[test]
    fn factors_roundtrip_uncompressed() {
        let (_dir, store) = store();
        let factors = Factor::default_set();
        store.save_factors(&factors);
        assert_eq!(store.load_factors(), Some(factors));
    }

    #[test]
    fn repository_items_prepend_filter_and_tag_index() {
        let (_dir, store) = store();
        store.add_repository_item(RepositoryItem {
            id: String::new(),
            project_id: None,
            title: "Revisão de PR".to_string(),
            content: "revise este diff".to_string(),
            tags: vec!["Código".to_string(), "github".to_string()],
            created_at_ms: 0,
        });
        let newest = store.add_repository_item(RepositoryItem {
            id: String::new(),
            project_id: None,
            title: "Resumo".to_string(),
            content: "resuma o texto".to_string(),
            tags: vec!["escrita".to_string(), "GITHUB".to_string()],
            created_at_ms: 0,
        });

        let all = store.list_repository_items(None);
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, newest.id);
        assert!(!all[0].id.is_empty());
        assert!(all[0].created_at_ms > 0);

        assert_eq!(store.list_repository_items(Some("diff")).len(), 1);
        assert_eq!(
            store.all_tags(),
            vec!["código", "escrita", "github"]
        );

        store.delete_repository_item(&newest.id);
        assert_eq!(store.list_repository_items(None).len(), 1);
    }

    #[test]
    fn templates_filter_by_title_and_content() {
        let (_dir, store) = store();
        store.add_template(Template {
            id: String::new(),
            project_id: None,
            title: "Relatório semanal".to_string(),
            content: "escreva um relatório com seções".to_string(),
            created_at_ms: 0,
        });
        let newest = store.add_template(Template {
            id: String::new(),
            project_id: None,
            title: "E-mail formal".to_string(),
            content: "redija um e-mail educado".to_string(),
            created_at_ms: 0,
        });

        let all = store.list_templates(None);
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, newest.id);

        assert_eq!(store.list_templates(Some("RELATÓRIO")).len(), 1);
        assert_eq!(store.list_templates(Some("educado")).len(), 1);
        assert_eq!(store.list_templates(Some("")).len(), 2);
        assert!(store.list_templates(Some("inexistente")).is_empty());
    }

    #[test]
    fn share_codes_require_exact_match() {
        let (_dir, store) = store();
        let conv = conversation("compartilhe");
        store.save_conversation(&conv);
        let code = store.create_share_code(&conv.id);
        assert_eq!(code.len(), 6);
        assert!(code.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_eq!(store.resolve_share_code(&code), Some(conv.id.clone()));
        assert_eq!(store.resolve_share_code(&code[..5]), None);
        assert_eq!(store.resolve_share_code("ZZZZZZ"), None);
    }
}
