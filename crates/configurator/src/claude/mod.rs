//! Claude API integration for the house configurator chat.
//!
//! # Features
//!
//! - Streaming Messages API client with SSE parsing
//! - System prompt built from the instructions template plus the catalog
//! - The `select_houses` tool, with a schema generated from the catalog
//! - [`ChatModel`], the seam the orchestrator streams turns through

mod client;
mod error;
mod model;
mod prompt;
mod tools;
mod types;

pub use client::ClaudeClient;
pub use error::{ApiError, ApiErrorResponse, ClaudeError};
pub use model::{ChatModel, EventStream, TurnRequest};
pub use prompt::SystemPrompt;
pub use tools::{
    SELECT_HOUSES_TOOL, SelectionError, SelectionInput, SelectionOutput, ToolExecutor,
    selection_tool, validate_selection,
};
pub use types::{
    ChatRequest, ContentBlock, ContentBlockDelta, ContentBlockStart, Message, MessageContent,
    MessageDelta, Role, StopReason, StreamError, StreamEvent, StreamMessage, SystemBlock, Tool,
    Usage,
};
