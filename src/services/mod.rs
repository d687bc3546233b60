pub mod ai;
pub mod config;
pub mod export;
pub mod github;
pub mod prompts;
pub mod retry;
pub mod session;
