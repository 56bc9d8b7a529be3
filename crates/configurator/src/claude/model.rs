//! The seam between the orchestrator and a hosted model.

use std::future::Future;
use std::pin::Pin;

use futures::Stream;

use super::error::ClaudeError;
use super::prompt::SystemPrompt;
use super::types::{Message, StreamEvent, Tool};

/// Boxed stream of provider events for one model turn.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, ClaudeError>> + Send>>;

/// Everything the model needs for one generation step.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub messages: Vec<Message>,
    pub system: SystemPrompt,
    pub tools: Vec<Tool>,
}

/// A model that streams one turn at a time.
pub trait ChatModel: Send + Sync {
    /// Start a streamed turn.
    ///
    /// Resolves once the provider has accepted the request; events then
    /// arrive on the returned stream.
    fn stream_turn(
        &self,
        request: TurnRequest,
    ) -> impl Future<Output = Result<EventStream, ClaudeError>> + Send;
}
