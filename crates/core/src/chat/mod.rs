//! Chat module
//!
//! Chats, their messages and per-chat / global settings.

mod file_store;
mod model;
mod repository;

pub use file_store::FileChatStore;
pub use model::*;
pub use repository::ChatRepository;
