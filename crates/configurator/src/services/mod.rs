//! Business logic services for the configurator.
//!
//! # Services
//!
//! - `chat` - Claude chat orchestration with the house selection tool

pub mod chat;

pub use chat::{
    ChatError, ChatStreamEvent, FinishReason, HistoryError, StreamBudget, start_chat_stream,
    to_provider_messages, validate_history,
};
