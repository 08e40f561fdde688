//! Core library for Agent Chat
//!
//! This crate contains the persisted entities and their storage:
//! - Chats, messages and chat settings
//! - Agent definitions (steps, conditions, seed messages)

pub mod agent;
pub mod chat;
pub mod error;

pub use error::Error;
pub type Result<T> = std::result::Result<T, Error>;
