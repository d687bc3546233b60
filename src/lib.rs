//! Tessy: the backend of a conversational assistant.
//!
//! A two-stage Interpret→Generate pipeline over a generative model endpoint,
//! a factor-conditioned system instruction with an optional GitHub tool
//! loop, and a local persistence layer (compressed flat store plus a
//! structured libSQL store with one-time migration and retention sweeping).
//! Visual surfaces are out of scope: this crate is what a UI shell embeds.

pub mod plugins;
pub mod services;

pub use plugins::storage::{
    AttachedFile, Citation, Conversation, Factor, FactorValue, FlatStore, Project,
    RepositoryItem, StorageError, StructuredStore, Template, Turn,
};
pub use services::ai::{GenerationOutcome, Intent, ModelClient, ModelTransport};
pub use services::config::{AiConfig, load_ai_config};
pub use services::github::{GithubClient, GithubError, RepoBinding};
pub use services::session::{ChatSession, PipelineStatus};
