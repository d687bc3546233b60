//! Local persistence for conversations, factors, saved prompts and templates.
//!
//! Two storage representations coexist:
//! - [`FlatStore`]: string keys on disk, with the conversation set kept as a
//!   base64/LZW-compressed JSON blob (browser-localStorage heritage format).
//! - [`StructuredStore`]: a libSQL database with per-collection tables, used
//!   by the project/secret/file-blob features. A one-time migration copies
//!   legacy flat records into it.

mod error;
mod flat;
pub mod lzw;
mod store;
mod types;

pub use error::StorageError;
pub use flat::FlatStore;
pub use store::StructuredStore;
pub use types::{
    AttachedFile, Citation, Conversation, Factor, FactorValue, Project, RepositoryItem, Template,
    Turn, now_ms, toggle_enabled,
};
