//! Domain models for the configurator.

pub mod conversation;

pub use conversation::{ConversationMessage, MessagePart, Role};
