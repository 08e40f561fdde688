//! Agent module
//!
//! User-authored agent definitions: ordered steps with prompt templates,
//! gating conditions and seed messages.

mod file_store;
mod model;
mod repository;

pub use file_store::FileAgentStore;
pub use model::*;
pub use repository::AgentRepository;
