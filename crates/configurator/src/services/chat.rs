//! Chat service for orchestrating Claude conversations.
//!
//! This service handles the complete flow of one user turn:
//! 1. Validating the client-held conversation history
//! 2. Converting it to Claude format
//! 3. Streaming the model's reply
//! 4. Executing the selection tool when requested
//! 5. Looping until the model is done or a budget runs out

use std::sync::Arc;
use std::time::Duration;

use async_stream::stream;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::time::{Instant, timeout_at};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use mood_core::Catalog;

use crate::claude::{
    ChatModel, ClaudeError, ContentBlock, ContentBlockDelta, ContentBlockStart, Message, Role,
    StopReason, StreamEvent, SystemPrompt, ToolExecutor, TurnRequest, selection_tool,
};
use crate::models::{ConversationMessage, MessagePart};

/// Maximum number of model calls per user turn.
pub const MAX_STEPS: usize = 10;

/// Wall-clock limit for a whole user turn.
pub const TIME_LIMIT: Duration = Duration::from_secs(30);

/// Step and time limits for one streamed turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamBudget {
    pub max_steps: usize,
    pub time_limit: Duration,
}

impl Default for StreamBudget {
    fn default() -> Self {
        Self {
            max_steps: MAX_STEPS,
            time_limit: TIME_LIMIT,
        }
    }
}

/// Reasons a conversation history is rejected before any model call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HistoryError {
    #[error("history is empty")]
    Empty,

    #[error("last message must come from the user")]
    LastMessageNotUser,

    #[error("message {index} has no content")]
    EmptyMessage { index: usize },

    #[error("message {index} is a user message with a tool invocation")]
    ToolPartInUserMessage { index: usize },

    #[error("tool invocation {tool_call_id} in message {index} has no output or error")]
    IncompleteToolInvocation { index: usize, tool_call_id: String },
}

/// Errors that can occur before a chat stream starts.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// The history failed validation.
    #[error("invalid history: {0}")]
    History(#[from] HistoryError),

    /// Claude API error.
    #[error("Claude API error: {0}")]
    Claude(#[from] ClaudeError),
}

/// Why a chat stream finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FinishReason {
    /// The model ended its turn.
    Stop,
    /// The model hit its output token limit.
    Length,
    /// The step budget ran out while the model still wanted tools.
    StepBudget,
    /// The wall-clock budget ran out.
    TimeBudget,
}

/// Events streamed to the client for one user turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ChatStreamEvent {
    /// A new assistant message begins.
    Start { message_id: String },
    /// Text appended to the assistant message.
    TextDelta { delta: String },
    /// The model called a tool with this input.
    ToolInputAvailable {
        tool_call_id: String,
        tool_name: String,
        input: serde_json::Value,
    },
    /// The tool call succeeded.
    ToolOutputAvailable {
        tool_call_id: String,
        output: serde_json::Value,
    },
    /// The tool call was rejected; the model sees the error.
    ToolOutputError {
        tool_call_id: String,
        error_text: String,
    },
    /// One model call finished.
    FinishStep,
    /// The turn is over.
    Finish { finish_reason: FinishReason },
    /// The provider failed; the turn is over.
    Error { error_text: String },
}

// =============================================================================
// History
// =============================================================================

/// Check that a history can be sent to the model.
///
/// # Errors
///
/// Returns the first problem found.
pub fn validate_history(history: &[ConversationMessage]) -> Result<(), HistoryError> {
    let last = history.last().ok_or(HistoryError::Empty)?;
    if last.role != Role::User {
        return Err(HistoryError::LastMessageNotUser);
    }

    for (index, message) in history.iter().enumerate() {
        if message.parts.is_empty() {
            return Err(HistoryError::EmptyMessage { index });
        }
        if message.role == Role::User && message.text().trim().is_empty() {
            return Err(HistoryError::EmptyMessage { index });
        }

        for part in &message.parts {
            let MessagePart::ToolInvocation {
                tool_call_id,
                output,
                error_text,
                ..
            } = part
            else {
                continue;
            };
            if message.role == Role::User {
                return Err(HistoryError::ToolPartInUserMessage { index });
            }
            if output.is_none() && error_text.is_none() {
                return Err(HistoryError::IncompleteToolInvocation {
                    index,
                    tool_call_id: tool_call_id.clone(),
                });
            }
        }
    }

    Ok(())
}

/// State for building Claude messages from conversation messages.
///
/// An assistant message can span several model steps: each run of tool
/// calls is followed by a user turn carrying their results.
struct MessageBuilder {
    result: Vec<Message>,
    assistant_blocks: Vec<ContentBlock>,
    user_blocks: Vec<ContentBlock>,
    tool_results: Vec<ContentBlock>,
}

impl MessageBuilder {
    const fn new() -> Self {
        Self {
            result: Vec::new(),
            assistant_blocks: Vec::new(),
            user_blocks: Vec::new(),
            tool_results: Vec::new(),
        }
    }

    fn flush_assistant_blocks(&mut self) {
        if !self.assistant_blocks.is_empty() {
            self.result.push(Message::blocks(
                Role::Assistant,
                std::mem::take(&mut self.assistant_blocks),
            ));
        }
    }

    fn flush_user_blocks(&mut self) {
        if !self.user_blocks.is_empty() {
            self.result.push(Message::blocks(
                Role::User,
                std::mem::take(&mut self.user_blocks),
            ));
        }
    }

    /// End the current assistant step; its tool results open the next user turn.
    fn close_step(&mut self) {
        self.flush_assistant_blocks();
        self.user_blocks.append(&mut self.tool_results);
    }

    fn add_user_message(&mut self, message: &ConversationMessage) {
        self.close_step();

        for part in &message.parts {
            if let MessagePart::Text { text } = part
                && !text.trim().is_empty()
            {
                self.user_blocks.push(ContentBlock::Text { text: text.clone() });
            }
        }
    }

    fn add_assistant_message(&mut self, message: &ConversationMessage) {
        self.close_step();
        self.flush_user_blocks();

        for part in &message.parts {
            match part {
                MessagePart::Text { text } => {
                    if text.trim().is_empty() {
                        continue;
                    }
                    if !self.tool_results.is_empty() {
                        self.close_step();
                        self.flush_user_blocks();
                    }
                    self.assistant_blocks
                        .push(ContentBlock::Text { text: text.clone() });
                }
                MessagePart::ToolInvocation {
                    tool_call_id,
                    tool_name,
                    input,
                    output,
                    error_text,
                } => {
                    self.assistant_blocks.push(ContentBlock::ToolUse {
                        id: tool_call_id.clone(),
                        name: tool_name.clone(),
                        input: object_or_empty(input),
                    });

                    let (content, is_error) = match (output, error_text) {
                        (Some(output), _) => (output.to_string(), None),
                        (None, Some(error)) => (error.clone(), Some(true)),
                        (None, None) => (String::new(), Some(true)),
                    };
                    self.tool_results.push(ContentBlock::ToolResult {
                        tool_use_id: tool_call_id.clone(),
                        content,
                        is_error,
                    });
                }
            }
        }
    }

    fn finish(mut self) -> Vec<Message> {
        self.close_step();
        self.flush_user_blocks();
        self.result
    }
}

/// Convert a conversation history to Claude API messages.
///
/// Leading assistant messages (the welcome greeting) are dropped because
/// the API requires the conversation to open with a user turn.
#[must_use]
pub fn to_provider_messages(history: &[ConversationMessage]) -> Vec<Message> {
    let mut builder = MessageBuilder::new();

    for message in history.iter().skip_while(|m| m.role == Role::Assistant) {
        match message.role {
            Role::User => builder.add_user_message(message),
            Role::Assistant => builder.add_assistant_message(message),
        }
    }

    builder.finish()
}

/// Tool inputs sent back to the API must be JSON objects.
fn object_or_empty(input: &serde_json::Value) -> serde_json::Value {
    if input.is_object() {
        input.clone()
    } else {
        json!({})
    }
}

// =============================================================================
// Streaming
// =============================================================================

/// A content block still receiving deltas.
enum OpenBlock {
    Text(String),
    ToolUse {
        id: String,
        name: String,
        json: String,
    },
}

/// Everything one model step produced.
#[derive(Default)]
struct StepState {
    current: Option<OpenBlock>,
    assistant_blocks: Vec<ContentBlock>,
    tool_results: Vec<ContentBlock>,
    stop_reason: Option<StopReason>,
}

impl StepState {
    /// Apply a provider event, returning the client events it produces.
    fn handle(&mut self, event: StreamEvent, executor: &ToolExecutor<'_>) -> Vec<ChatStreamEvent> {
        match event {
            StreamEvent::ContentBlockStart { content_block, .. } => {
                let mut out = self.close_block(executor);
                match content_block {
                    ContentBlockStart::Text { text } => {
                        if !text.is_empty() {
                            out.push(ChatStreamEvent::TextDelta {
                                delta: text.clone(),
                            });
                        }
                        self.current = Some(OpenBlock::Text(text));
                    }
                    ContentBlockStart::ToolUse { id, name, .. } => {
                        self.current = Some(OpenBlock::ToolUse {
                            id,
                            name,
                            json: String::new(),
                        });
                    }
                }
                out
            }
            StreamEvent::ContentBlockDelta { delta, .. } => match (delta, &mut self.current) {
                (ContentBlockDelta::TextDelta { text }, current) => {
                    if let Some(OpenBlock::Text(buffer)) = current {
                        buffer.push_str(&text);
                    }
                    vec![ChatStreamEvent::TextDelta { delta: text }]
                }
                (
                    ContentBlockDelta::InputJsonDelta { partial_json },
                    Some(OpenBlock::ToolUse { json, .. }),
                ) => {
                    json.push_str(&partial_json);
                    Vec::new()
                }
                (ContentBlockDelta::InputJsonDelta { .. }, _) => Vec::new(),
            },
            StreamEvent::ContentBlockStop { .. } => self.close_block(executor),
            StreamEvent::MessageDelta { delta, .. } => {
                if delta.stop_reason.is_some() {
                    self.stop_reason = delta.stop_reason;
                }
                Vec::new()
            }
            StreamEvent::Error { error } => vec![ChatStreamEvent::Error {
                error_text: format!("{}: {}", error.error_type, error.message),
            }],
            StreamEvent::MessageStart { .. } | StreamEvent::MessageStop | StreamEvent::Ping => {
                Vec::new()
            }
        }
    }

    /// Close the open block. A finished tool call is executed here.
    fn close_block(&mut self, executor: &ToolExecutor<'_>) -> Vec<ChatStreamEvent> {
        match self.current.take() {
            None => Vec::new(),
            Some(OpenBlock::Text(text)) => {
                if !text.is_empty() {
                    self.assistant_blocks.push(ContentBlock::Text { text });
                }
                Vec::new()
            }
            Some(OpenBlock::ToolUse { id, name, json }) => {
                let input = parse_tool_input(&json);
                let mut out = vec![ChatStreamEvent::ToolInputAvailable {
                    tool_call_id: id.clone(),
                    tool_name: name.clone(),
                    input: input.clone(),
                }];

                self.assistant_blocks.push(ContentBlock::ToolUse {
                    id: id.clone(),
                    name: name.clone(),
                    input: object_or_empty(&input),
                });

                match executor.execute(&name, &input) {
                    Ok(output) => {
                        self.tool_results.push(ContentBlock::ToolResult {
                            tool_use_id: id.clone(),
                            content: output.to_string(),
                            is_error: None,
                        });
                        out.push(ChatStreamEvent::ToolOutputAvailable {
                            tool_call_id: id,
                            output,
                        });
                    }
                    Err(e) => {
                        warn!(tool_name = %name, error = %e, "Tool call rejected");
                        let error_text = e.to_string();
                        self.tool_results.push(ContentBlock::ToolResult {
                            tool_use_id: id.clone(),
                            content: error_text.clone(),
                            is_error: Some(true),
                        });
                        out.push(ChatStreamEvent::ToolOutputError {
                            tool_call_id: id,
                            error_text,
                        });
                    }
                }
                out
            }
        }
    }
}

/// Parse accumulated tool input JSON. Unparseable input is kept as a string
/// so validation reports it to the model.
fn parse_tool_input(raw: &str) -> serde_json::Value {
    if raw.trim().is_empty() {
        return json!({});
    }
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
}

/// Start streaming the assistant's reply to `history`.
///
/// The history is validated and the first model call is made before this
/// returns, so those failures surface as errors rather than stream events.
/// Later failures end the stream with an `error` event; running out of
/// steps or time ends it with a `finish` event.
///
/// # Errors
///
/// Returns an error if the history is malformed or the first model call
/// fails. A first call that outlasts the time budget is not an error: the
/// stream finishes with `time-budget` straight after `start`.
#[instrument(skip_all, fields(messages = history.len(), max_steps = budget.max_steps))]
pub async fn start_chat_stream<M>(
    model: M,
    catalog: Arc<Catalog>,
    history: Vec<ConversationMessage>,
    budget: StreamBudget,
) -> Result<impl Stream<Item = ChatStreamEvent> + Send + 'static, ChatError>
where
    M: ChatModel + 'static,
{
    validate_history(&history)?;

    let messages = to_provider_messages(&history);
    let system = SystemPrompt::new(Arc::clone(&catalog));
    let tools = vec![selection_tool(&catalog)];
    let deadline = Instant::now() + budget.time_limit;

    let request = TurnRequest {
        messages: messages.clone(),
        system: system.clone(),
        tools: tools.clone(),
    };
    let first = match timeout_at(deadline, model.stream_turn(request)).await {
        Ok(result) => Some(result?),
        Err(_) => {
            warn!(step = 1, "Time budget exhausted before the model answered");
            None
        }
    };

    Ok(stream! {
        let message_id = Uuid::new_v4().to_string();
        yield ChatStreamEvent::Start { message_id };

        let Some(mut events) = first else {
            yield ChatStreamEvent::Finish { finish_reason: FinishReason::TimeBudget };
            return;
        };

        let executor = ToolExecutor::new(&catalog);
        let mut messages = messages;
        let mut step = 1;

        loop {
            let mut state = StepState::default();

            loop {
                let Ok(next) = timeout_at(deadline, events.next()).await else {
                    warn!(step, "Time budget exhausted");
                    yield ChatStreamEvent::Finish { finish_reason: FinishReason::TimeBudget };
                    return;
                };
                let event = match next {
                    None => break,
                    Some(Ok(event)) => event,
                    Some(Err(e)) => {
                        warn!(step, error = %e, "Model stream failed");
                        yield ChatStreamEvent::Error { error_text: e.to_string() };
                        return;
                    }
                };

                let outputs = state.handle(event, &executor);
                let failed = outputs
                    .iter()
                    .any(|e| matches!(e, ChatStreamEvent::Error { .. }));
                for output in outputs {
                    yield output;
                }
                if failed {
                    return;
                }
            }

            for output in state.close_block(&executor) {
                yield output;
            }
            yield ChatStreamEvent::FinishStep;

            info!(
                step,
                stop_reason = ?state.stop_reason,
                tool_calls = state.tool_results.len(),
                "Model step finished"
            );

            if state.stop_reason != Some(StopReason::ToolUse) || state.tool_results.is_empty() {
                let finish_reason = if state.stop_reason == Some(StopReason::MaxTokens) {
                    FinishReason::Length
                } else {
                    FinishReason::Stop
                };
                yield ChatStreamEvent::Finish { finish_reason };
                return;
            }

            if step >= budget.max_steps {
                warn!(step, "Step budget exhausted");
                yield ChatStreamEvent::Finish { finish_reason: FinishReason::StepBudget };
                return;
            }

            messages.push(Message::blocks(Role::Assistant, state.assistant_blocks));
            messages.push(Message::blocks(Role::User, state.tool_results));

            let request = TurnRequest {
                messages: messages.clone(),
                system: system.clone(),
                tools: tools.clone(),
            };
            events = match timeout_at(deadline, model.stream_turn(request)).await {
                Err(_) => {
                    warn!(step, "Time budget exhausted");
                    yield ChatStreamEvent::Finish { finish_reason: FinishReason::TimeBudget };
                    return;
                }
                Ok(Err(e)) => {
                    warn!(step, error = %e, "Model call failed");
                    yield ChatStreamEvent::Error { error_text: e.to_string() };
                    return;
                }
                Ok(Ok(events)) => events,
            };
            step += 1;
        }
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use futures::StreamExt;

    use super::*;
    use crate::claude::{EventStream, MessageContent};

    type Turn = Vec<Result<StreamEvent, ClaudeError>>;

    /// A model that replays scripted turns and records what it was sent.
    #[derive(Clone, Default)]
    struct ScriptedModel {
        turns: Arc<Mutex<VecDeque<Turn>>>,
        requests: Arc<Mutex<Vec<TurnRequest>>>,
        pending_forever: bool,
        never_answers: bool,
    }

    impl ScriptedModel {
        fn new(turns: Vec<Turn>) -> Self {
            Self {
                turns: Arc::new(Mutex::new(turns.into())),
                ..Self::default()
            }
        }

        fn requests(&self) -> Vec<TurnRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    impl ChatModel for ScriptedModel {
        async fn stream_turn(&self, request: TurnRequest) -> Result<EventStream, ClaudeError> {
            self.requests.lock().unwrap().push(request);
            if self.never_answers {
                futures::future::pending::<()>().await;
            }
            if self.pending_forever {
                return Ok(Box::pin(futures::stream::pending()));
            }
            let turn = self
                .turns
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| ClaudeError::Stream("no scripted turn left".to_string()))?;
            Ok(Box::pin(futures::stream::iter(turn)))
        }
    }

    fn event(value: serde_json::Value) -> Result<StreamEvent, ClaudeError> {
        Ok(serde_json::from_value(value).unwrap())
    }

    fn text_turn(text: &str) -> Turn {
        vec![
            event(json!({"type": "message_start", "message": {"id": "msg_1", "model": "m", "usage": {"input_tokens": 10, "output_tokens": 1}}})),
            event(json!({"type": "content_block_start", "index": 0, "content_block": {"type": "text", "text": ""}})),
            event(json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": text}})),
            event(json!({"type": "content_block_stop", "index": 0})),
            event(json!({"type": "message_delta", "delta": {"stop_reason": "end_turn"}, "usage": {"output_tokens": 5}})),
            event(json!({"type": "message_stop"})),
        ]
    }

    fn tool_turn(id: &str, input_json: &str) -> Turn {
        vec![
            event(json!({"type": "message_start", "message": {"id": "msg_2", "model": "m", "usage": {"input_tokens": 10, "output_tokens": 1}}})),
            event(json!({"type": "content_block_start", "index": 0, "content_block": {"type": "tool_use", "id": id, "name": "select_houses", "input": {}}})),
            event(json!({"type": "content_block_delta", "index": 0, "delta": {"type": "input_json_delta", "partial_json": input_json}})),
            event(json!({"type": "content_block_stop", "index": 0})),
            event(json!({"type": "message_delta", "delta": {"stop_reason": "tool_use"}, "usage": {"output_tokens": 5}})),
            event(json!({"type": "message_stop"})),
        ]
    }

    fn catalog() -> Arc<Catalog> {
        Arc::new(Catalog::builtin().unwrap())
    }

    fn welcome_and(text: &str) -> Vec<ConversationMessage> {
        vec![
            ConversationMessage::assistant_text(Some("welcome".to_string()), "# Bienvenido"),
            ConversationMessage::user_text(text),
        ]
    }

    async fn collect(
        model: ScriptedModel,
        history: Vec<ConversationMessage>,
        budget: StreamBudget,
    ) -> Vec<ChatStreamEvent> {
        let stream = start_chat_stream(model, catalog(), history, budget)
            .await
            .unwrap();
        stream.collect().await
    }

    // -------------------------------------------------------------------------
    // History validation
    // -------------------------------------------------------------------------

    #[test]
    fn test_validate_history_rejects_malformed() {
        assert_eq!(validate_history(&[]), Err(HistoryError::Empty));

        let ends_with_assistant = vec![
            ConversationMessage::user_text("hola"),
            ConversationMessage::assistant_text(None, "hola"),
        ];
        assert_eq!(
            validate_history(&ends_with_assistant),
            Err(HistoryError::LastMessageNotUser)
        );

        let empty_parts = vec![ConversationMessage {
            id: None,
            role: Role::User,
            parts: vec![],
        }];
        assert_eq!(
            validate_history(&empty_parts),
            Err(HistoryError::EmptyMessage { index: 0 })
        );

        assert_eq!(
            validate_history(&[ConversationMessage::user_text("   ")]),
            Err(HistoryError::EmptyMessage { index: 0 })
        );
    }

    #[test]
    fn test_validate_history_checks_tool_parts() {
        let invocation = |output: Option<serde_json::Value>| MessagePart::ToolInvocation {
            tool_call_id: "toolu_1".to_string(),
            tool_name: "select_houses".to_string(),
            input: json!({"house_ids": ["xsa"]}),
            output,
            error_text: None,
        };

        let user_tool = vec![ConversationMessage {
            id: None,
            role: Role::User,
            parts: vec![
                MessagePart::Text { text: "hola".to_string() },
                invocation(Some(json!({"success": true}))),
            ],
        }];
        assert_eq!(
            validate_history(&user_tool),
            Err(HistoryError::ToolPartInUserMessage { index: 0 })
        );

        let incomplete = vec![
            ConversationMessage::user_text("hola"),
            ConversationMessage {
                id: None,
                role: Role::Assistant,
                parts: vec![invocation(None)],
            },
            ConversationMessage::user_text("¿y?"),
        ];
        assert_eq!(
            validate_history(&incomplete),
            Err(HistoryError::IncompleteToolInvocation {
                index: 1,
                tool_call_id: "toolu_1".to_string()
            })
        );

        assert!(validate_history(&welcome_and("Somos dos")).is_ok());
    }

    // -------------------------------------------------------------------------
    // Conversion
    // -------------------------------------------------------------------------

    #[test]
    fn test_conversion_skips_leading_assistant() {
        let messages = to_provider_messages(&welcome_and("Somos dos"));
        assert_eq!(messages.len(), 1);
        let first = messages.first().unwrap();
        assert_eq!(first.role, Role::User);
        assert_eq!(
            first.content,
            MessageContent::Blocks(vec![ContentBlock::Text {
                text: "Somos dos".to_string()
            }])
        );
    }

    #[test]
    fn test_conversion_splits_tool_steps() {
        let history = vec![
            ConversationMessage::user_text("Somos cuatro"),
            ConversationMessage {
                id: None,
                role: Role::Assistant,
                parts: vec![
                    MessagePart::Text { text: "Veamos".to_string() },
                    MessagePart::ToolInvocation {
                        tool_call_id: "toolu_1".to_string(),
                        tool_name: "select_houses".to_string(),
                        input: json!({"house_ids": ["ma"]}),
                        output: Some(json!({"success": true})),
                        error_text: None,
                    },
                    MessagePart::Text { text: "Estas son".to_string() },
                ],
            },
            ConversationMessage::user_text("Me gusta"),
        ];

        let messages = to_provider_messages(&history);
        let roles: Vec<Role> = messages.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::User, Role::Assistant, Role::User, Role::Assistant, Role::User]
        );

        let MessageContent::Blocks(results) = &messages.get(2).unwrap().content else {
            panic!("expected blocks");
        };
        assert_eq!(
            results,
            &vec![ContentBlock::ToolResult {
                tool_use_id: "toolu_1".to_string(),
                content: "{\"success\":true}".to_string(),
                is_error: None,
            }]
        );
    }

    #[test]
    fn test_conversion_merges_trailing_results_into_user_turn() {
        let history = vec![
            ConversationMessage::user_text("Somos cuatro"),
            ConversationMessage {
                id: None,
                role: Role::Assistant,
                parts: vec![MessagePart::ToolInvocation {
                    tool_call_id: "toolu_1".to_string(),
                    tool_name: "select_houses".to_string(),
                    input: json!({"house_ids": ["nope"]}),
                    output: None,
                    error_text: Some("unknown house id: nope".to_string()),
                }],
            },
            ConversationMessage::user_text("¿Y ahora?"),
        ];

        let messages = to_provider_messages(&history);
        assert_eq!(messages.len(), 3);
        let MessageContent::Blocks(last) = &messages.last().unwrap().content else {
            panic!("expected blocks");
        };
        assert!(matches!(
            last.first(),
            Some(ContentBlock::ToolResult { is_error: Some(true), .. })
        ));
        assert!(matches!(last.get(1), Some(ContentBlock::Text { .. })));
    }

    #[test]
    fn test_parse_tool_input() {
        assert_eq!(parse_tool_input(""), json!({}));
        assert_eq!(
            parse_tool_input("{\"house_ids\":[\"xsa\"]}"),
            json!({"house_ids": ["xsa"]})
        );
        assert_eq!(parse_tool_input("{\"house"), json!("{\"house"));
    }

    // -------------------------------------------------------------------------
    // Streaming
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_text_reply_streams_and_stops() {
        let model = ScriptedModel::new(vec![text_turn("¡Hola! ¿Cuántos son?")]);
        let events = collect(model.clone(), welcome_and("Hola"), StreamBudget::default()).await;

        assert!(matches!(events.first(), Some(ChatStreamEvent::Start { .. })));
        assert_eq!(
            &events[1..],
            &[
                ChatStreamEvent::TextDelta {
                    delta: "¡Hola! ¿Cuántos son?".to_string()
                },
                ChatStreamEvent::FinishStep,
                ChatStreamEvent::Finish {
                    finish_reason: FinishReason::Stop
                },
            ]
        );

        let requests = model.requests();
        assert_eq!(requests.len(), 1);
        let request = requests.first().unwrap();
        assert_eq!(request.tools.len(), 1);
        assert_eq!(request.system.catalog().houses().len(), 15);
    }

    #[tokio::test]
    async fn test_tool_call_is_executed_and_fed_back() {
        let model = ScriptedModel::new(vec![
            tool_turn("toolu_1", r#"{"house_ids": ["xsa", "sa"]}"#),
            text_turn("Mira estas dos casas"),
        ]);
        let events = collect(model.clone(), welcome_and("Somos dos"), StreamBudget::default()).await;

        assert_eq!(
            &events[1..],
            &[
                ChatStreamEvent::ToolInputAvailable {
                    tool_call_id: "toolu_1".to_string(),
                    tool_name: "select_houses".to_string(),
                    input: json!({"house_ids": ["xsa", "sa"]}),
                },
                ChatStreamEvent::ToolOutputAvailable {
                    tool_call_id: "toolu_1".to_string(),
                    output: json!({"success": true}),
                },
                ChatStreamEvent::FinishStep,
                ChatStreamEvent::TextDelta {
                    delta: "Mira estas dos casas".to_string()
                },
                ChatStreamEvent::FinishStep,
                ChatStreamEvent::Finish {
                    finish_reason: FinishReason::Stop
                },
            ]
        );

        let requests = model.requests();
        assert_eq!(requests.len(), 2);
        let second = &requests.get(1).unwrap().messages;
        assert_eq!(second.len(), 3);
        assert_eq!(
            second.get(1).unwrap().content,
            MessageContent::Blocks(vec![ContentBlock::ToolUse {
                id: "toolu_1".to_string(),
                name: "select_houses".to_string(),
                input: json!({"house_ids": ["xsa", "sa"]}),
            }])
        );
    }

    #[tokio::test]
    async fn test_unknown_house_is_reported_to_model() {
        let model = ScriptedModel::new(vec![
            tool_turn("toolu_1", r#"{"house_ids": ["xsa", "not-a-real-id"]}"#),
            text_turn("Perdón"),
        ]);
        let events = collect(model.clone(), welcome_and("Somos dos"), StreamBudget::default()).await;

        assert!(events.contains(&ChatStreamEvent::ToolOutputError {
            tool_call_id: "toolu_1".to_string(),
            error_text: "unknown house id: not-a-real-id".to_string(),
        }));
        assert!(
            !events
                .iter()
                .any(|e| matches!(e, ChatStreamEvent::ToolOutputAvailable { .. }))
        );

        let requests = model.requests();
        let feedback = requests.get(1).unwrap().messages.last().unwrap();
        assert_eq!(
            feedback.content,
            MessageContent::Blocks(vec![ContentBlock::ToolResult {
                tool_use_id: "toolu_1".to_string(),
                content: "unknown house id: not-a-real-id".to_string(),
                is_error: Some(true),
            }])
        );
    }

    #[tokio::test]
    async fn test_step_budget_ends_stream() {
        let model = ScriptedModel::new(vec![
            tool_turn("toolu_1", r#"{"house_ids": ["xsa"]}"#),
            tool_turn("toolu_2", r#"{"house_ids": ["sa"]}"#),
            tool_turn("toolu_3", r#"{"house_ids": ["ma"]}"#),
        ]);
        let budget = StreamBudget {
            max_steps: 2,
            ..StreamBudget::default()
        };
        let events = collect(model.clone(), welcome_and("Somos dos"), budget).await;

        assert_eq!(
            events.last(),
            Some(&ChatStreamEvent::Finish {
                finish_reason: FinishReason::StepBudget
            })
        );
        assert_eq!(model.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_time_budget_ends_stream() {
        let model = ScriptedModel {
            pending_forever: true,
            ..ScriptedModel::default()
        };
        let budget = StreamBudget {
            time_limit: Duration::from_millis(50),
            ..StreamBudget::default()
        };
        let events = collect(model, welcome_and("Hola"), budget).await;

        assert_eq!(events.len(), 2);
        assert_eq!(
            events.last(),
            Some(&ChatStreamEvent::Finish {
                finish_reason: FinishReason::TimeBudget
            })
        );
    }

    #[tokio::test]
    async fn test_time_budget_before_first_response_finishes_stream() {
        let model = ScriptedModel {
            never_answers: true,
            ..ScriptedModel::default()
        };
        let budget = StreamBudget {
            time_limit: Duration::from_millis(50),
            ..StreamBudget::default()
        };

        let stream = start_chat_stream(model.clone(), catalog(), welcome_and("Hola"), budget)
            .await
            .expect("budget expiry is not an error");
        let events: Vec<ChatStreamEvent> = stream.collect().await;

        assert_eq!(events.len(), 2);
        assert!(matches!(events.first(), Some(ChatStreamEvent::Start { .. })));
        assert_eq!(
            events.last(),
            Some(&ChatStreamEvent::Finish {
                finish_reason: FinishReason::TimeBudget
            })
        );
        assert_eq!(model.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_provider_error_mid_stream() {
        let mut turn = text_turn("Hola");
        turn.truncate(3);
        turn.push(Err(ClaudeError::Stream("connection reset".to_string())));
        let model = ScriptedModel::new(vec![turn]);

        let events = collect(model, welcome_and("Hola"), StreamBudget::default()).await;
        assert_eq!(
            events.last(),
            Some(&ChatStreamEvent::Error {
                error_text: "stream error: connection reset".to_string()
            })
        );
        assert!(
            !events
                .iter()
                .any(|e| matches!(e, ChatStreamEvent::Finish { .. }))
        );
    }

    #[tokio::test]
    async fn test_provider_error_event_ends_stream() {
        let model = ScriptedModel::new(vec![vec![event(json!({
            "type": "error",
            "error": {"type": "overloaded_error", "message": "Overloaded"}
        }))]]);

        let events = collect(model, welcome_and("Hola"), StreamBudget::default()).await;
        assert_eq!(
            events.last(),
            Some(&ChatStreamEvent::Error {
                error_text: "overloaded_error: Overloaded".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_failures_before_streaming_are_errors() {
        let model = ScriptedModel::new(vec![]);
        let result = start_chat_stream(
            model.clone(),
            catalog(),
            vec![ConversationMessage::assistant_text(None, "hola")],
            StreamBudget::default(),
        )
        .await;
        assert!(matches!(result, Err(ChatError::History(HistoryError::LastMessageNotUser))));
        assert!(model.requests().is_empty());

        let result = start_chat_stream(
            model.clone(),
            catalog(),
            welcome_and("Hola"),
            StreamBudget::default(),
        )
        .await;
        assert!(matches!(result, Err(ChatError::Claude(_))));
    }

    #[test]
    fn test_stream_event_wire_format() {
        let json = serde_json::to_value(ChatStreamEvent::ToolOutputError {
            tool_call_id: "toolu_1".to_string(),
            error_text: "unknown house id: x".to_string(),
        })
        .unwrap();
        assert_eq!(
            json,
            json!({"type": "tool-output-error", "tool_call_id": "toolu_1", "error_text": "unknown house id: x"})
        );

        let json = serde_json::to_value(ChatStreamEvent::Finish {
            finish_reason: FinishReason::StepBudget,
        })
        .unwrap();
        assert_eq!(json, json!({"type": "finish", "finish_reason": "step-budget"}));
    }
}
