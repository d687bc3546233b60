//! Storage shapes shared across the crate: conversations, turns, attachments,
//! factors and the supporting project/library/template records.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

const TITLE_MAX_CHARS: usize = 50;
/// Attachment intake cap (4 MiB).
pub const MAX_ATTACHMENT_BYTES: u64 = 4 * 1024 * 1024;
/// MIME types the model endpoint accepts inline.
pub const ALLOWED_MIME_TYPES: [&str; 4] =
    ["image/jpeg", "image/png", "image/webp", "application/pdf"];

pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

pub(crate) fn new_id(prefix: &str) -> String {
    format!("{}_{}", prefix, Uuid::new_v4())
}

fn truncate_title(source: &str) -> String {
    let trimmed = source.trim();
    if trimmed.chars().count() <= TITLE_MAX_CHARS {
        return trimmed.to_string();
    }
    trimmed.chars().take(TITLE_MAX_CHARS).collect::<String>() + "…"
}

/// One web grounding source attached to an assistant response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Citation {
    pub uri: String,
    pub title: String,
}

/// Inline binary attachment. Built through [`AttachedFile::intake`] so that
/// oversized or disallowed files never reach the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachedFile {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    /// Base64-encoded payload, ready for an `inlineData` part.
    pub data_base64: String,
    pub size_bytes: u64,
}

impl AttachedFile {
    /// Validate and admit a file. Rejections carry the user-facing message.
    pub fn intake(name: &str, mime_type: &str, bytes: &[u8]) -> Result<Self, String> {
        if !ALLOWED_MIME_TYPES.contains(&mime_type) {
            return Err(format!(
                "Tipo de arquivo não suportado: {mime_type}. Use JPEG, PNG, WEBP ou PDF."
            ));
        }
        let size = bytes.len() as u64;
        if size > MAX_ATTACHMENT_BYTES {
            return Err("Arquivo muito grande. O limite é de 4 MB.".to_string());
        }

        use base64::Engine as _;
        Ok(Self {
            id: new_id("file"),
            name: name.to_string(),
            mime_type: mime_type.to_string(),
            data_base64: base64::engine::general_purpose::STANDARD.encode(bytes),
            size_bytes: size,
        })
    }
}

/// One user-message/assistant-response pair. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Turn {
    pub id: String,
    pub user_text: String,
    pub assistant_text: String,
    pub created_at_ms: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<AttachedFile>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub citations: Vec<Citation>,
}

impl Turn {
    pub fn new(
        user_text: String,
        assistant_text: String,
        files: Vec<AttachedFile>,
        citations: Vec<Citation>,
    ) -> Self {
        Self {
            id: new_id("turn"),
            user_text,
            assistant_text,
            created_at_ms: now_ms(),
            files,
            citations,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    pub title: String,
    pub turns: Vec<Turn>,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
}

impl Conversation {
    pub fn new(project_id: Option<String>) -> Self {
        let now = now_ms();
        Self {
            id: new_id("conv"),
            project_id,
            title: String::new(),
            turns: Vec::new(),
            created_at_ms: now,
            updated_at_ms: now,
        }
    }

    /// Append-only. The title is derived from the first user message and
    /// never rewritten afterwards.
    pub fn append_turn(&mut self, turn: Turn) {
        if self.turns.is_empty() && self.title.is_empty() {
            self.title = truncate_title(&turn.user_text);
        }
        self.turns.push(turn);
        self.updated_at_ms = now_ms();
    }
}

/// Kind-specific payload of a generation factor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum FactorValue {
    Toggle,
    Slider { value: i64, min: i64, max: i64 },
    Dropdown { value: String, options: Vec<String> },
    Text { value: String },
}

/// A user-tunable generation parameter. The set is a flat, order-irrelevant
/// mapping; unknown ids survive round-trips and are ignored when factors are
/// turned into instruction text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Factor {
    pub id: String,
    pub label: String,
    pub enabled: bool,
    #[serde(flatten)]
    pub value: FactorValue,
}

impl Factor {
    /// The seven well-known factors, in their default configuration.
    pub fn default_set() -> Vec<Factor> {
        vec![
            Factor {
                id: "tone".to_string(),
                label: "Tom da resposta".to_string(),
                enabled: true,
                value: FactorValue::Dropdown {
                    value: "professional".to_string(),
                    options: vec!["professional".to_string(), "friendly".to_string()],
                },
            },
            Factor {
                id: "detail_level".to_string(),
                label: "Nível de detalhe".to_string(),
                enabled: true,
                value: FactorValue::Slider {
                    value: 3,
                    min: 1,
                    max: 5,
                },
            },
            Factor {
                id: "audience".to_string(),
                label: "Público-alvo".to_string(),
                enabled: true,
                value: FactorValue::Dropdown {
                    value: "intermediate".to_string(),
                    options: vec![
                        "beginner".to_string(),
                        "intermediate".to_string(),
                        "advanced".to_string(),
                        "expert".to_string(),
                    ],
                },
            },
            Factor {
                id: "code_blocks".to_string(),
                label: "Blocos de código comentados".to_string(),
                enabled: false,
                value: FactorValue::Toggle,
            },
            Factor {
                id: "extra_context".to_string(),
                label: "Contexto adicional".to_string(),
                enabled: false,
                value: FactorValue::Text {
                    value: String::new(),
                },
            },
            Factor {
                id: "web_search".to_string(),
                label: "Pesquisa na web".to_string(),
                enabled: false,
                value: FactorValue::Toggle,
            },
            Factor {
                id: "response_language".to_string(),
                label: "Idioma da resposta".to_string(),
                enabled: false,
                value: FactorValue::Dropdown {
                    value: "auto".to_string(),
                    options: vec![
                        "auto".to_string(),
                        "português".to_string(),
                        "english".to_string(),
                    ],
                },
            },
        ]
    }
}

/// Whether a toggle-style factor is on. Missing ids count as off.
pub fn toggle_enabled(factors: &[Factor], id: &str) -> bool {
    factors.iter().any(|f| f.id == id && f.enabled)
}

/// Grouping entity for conversations and repository bindings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,
    pub created_at_ms: u64,
    pub updated_at_ms: u64,
}

impl Project {
    pub fn new(title: impl Into<String>) -> Self {
        let now = now_ms();
        Self {
            id: new_id("proj"),
            title: title.into(),
            repository: None,
            created_at_ms: now,
            updated_at_ms: now,
        }
    }
}

/// Saved-prompt library entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryItem {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub created_at_ms: u64,
}

/// Reusable prompt template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub created_at_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intake_enforces_size_and_mime() {
        let five_mib = vec![0u8; 5 * 1024 * 1024];
        assert!(AttachedFile::intake("big.png", "image/png", &five_mib).is_err());

        let two_mib = vec![0u8; 2 * 1024 * 1024];
        assert!(AttachedFile::intake("ok.png", "image/png", &two_mib).is_ok());

        assert!(AttachedFile::intake("notes.txt", "text/plain", b"hello").is_err());

        let three_mib = vec![0u8; 3 * 1024 * 1024];
        assert!(AttachedFile::intake("doc.pdf", "application/pdf", &three_mib).is_ok());
    }

    #[test]
    fn title_is_derived_once_and_truncated() {
        let mut conv = Conversation::new(None);
        let long = "x".repeat(80);
        conv.append_turn(Turn::new(long.clone(), "ok".to_string(), vec![], vec![]));
        assert_eq!(conv.title.chars().count(), 51);
        assert!(conv.title.ends_with('…'));
        assert!(conv.title.starts_with(&"x".repeat(50)));

        let frozen = conv.title.clone();
        conv.append_turn(Turn::new(
            "um título completamente diferente".to_string(),
            "ok".to_string(),
            vec![],
            vec![],
        ));
        assert_eq!(conv.title, frozen);
    }

    #[test]
    fn short_title_has_no_ellipsis() {
        let mut conv = Conversation::new(None);
        conv.append_turn(Turn::new("oi".to_string(), "olá".to_string(), vec![], vec![]));
        assert_eq!(conv.title, "oi");
    }

    #[test]
    fn factor_roundtrip_keeps_unknown_ids() {
        let json = r#"[{"id":"mystery","label":"?","enabled":true,"kind":"slider","value":2,"min":0,"max":9}]"#;
        let factors: Vec<Factor> = serde_json::from_str(json).unwrap();
        assert_eq!(factors[0].id, "mystery");
        let back = serde_json::to_string(&factors).unwrap();
        let again: Vec<Factor> = serde_json::from_str(&back).unwrap();
        assert_eq!(factors, again);
    }

    #[test]
    fn default_factor_set_has_seven_entries() {
        assert_eq!(Factor::default_set().len(), 7);
    }
}
