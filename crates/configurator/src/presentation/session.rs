//! Chat session state for the widget.
//!
//! A [`ChatSession`] only changes through [`ChatSession::apply`]. Each call
//! takes one [`SessionEvent`] and returns the [`SessionEffect`]s the caller
//! must run (start a model stream, schedule a reveal). The transition logic
//! never does I/O or waits.

use std::time::Duration;

use serde::Deserialize;
use uuid::Uuid;

use mood_core::{HouseId, ImageView};

use crate::claude::{SELECT_HOUSES_TOOL, SelectionInput};
use crate::models::{ConversationMessage, MessagePart, Role};
use crate::services::ChatStreamEvent;

/// Id of the greeting message every session starts with.
pub const WELCOME_ID: &str = "welcome";

/// Greeting shown before the user writes anything.
pub const WELCOME_MESSAGE: &str = "# 🌿 Bienvenido a MOOD

Soy tu asistente personal para que diseñemos juntos **la casa de tus sueños**.

### Sobre MOOD
En **MOOD** fabricamos viviendas sostenibles con tecnología **CLT (Madera Laminada Cruzada)** en nuestra fábrica *off-site*.
Nuestras casas son:
- 🧩 **Modulares**
- 🎨 **Personalizables**
- 🌱 **Respetuosas con el medio ambiente**

### ¿Cómo te puedo ayudar?
Estoy acá para guiarte a encontrar la configuración perfecta para vos.

Para empezar, contame:
- 👉 ¿Vas a vivir en la casa o es para turismo?
- 👉 ¿Qué capacidad necesitás?

Y si tenés dudas, preguntame lo que quieras. Te voy a acompañar a armar tu casa ideal ✨
";

/// Whether a model stream is running for the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Idle,
    Streaming,
}

/// A selection waiting for its cosmetic delay to elapse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSelection {
    pub token: u64,
    pub house_ids: Vec<HouseId>,
}

/// Everything that can happen to a session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The user sent a message.
    UserSubmitted { text: String },
    /// An event from the running model stream.
    Stream(ChatStreamEvent),
    /// The reveal delay scheduled with `token` elapsed.
    SelectionRevealed { token: u64 },
    /// The user picked an image tab.
    ImageViewSelected(ImageView),
    /// The model stream went away before finishing.
    StreamAborted,
}

/// Work the caller must perform after a transition.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEffect {
    /// Run the orchestrator over this history.
    StartStream { history: Vec<ConversationMessage> },
    /// Send `SelectionRevealed { token }` after `after`.
    ScheduleReveal { token: u64, after: Duration },
}

/// Rejected transitions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("a reply is still streaming")]
    Busy,

    #[error("message is empty")]
    EmptyMessage,

    #[error("session not found: {0}")]
    NotFound(Uuid),
}

/// One browser chat.
#[derive(Debug, Clone)]
pub struct ChatSession {
    id: Uuid,
    messages: Vec<ConversationMessage>,
    status: SessionStatus,
    image_view: ImageView,
    selection: Vec<HouseId>,
    pending: Option<PendingSelection>,
    next_token: u64,
    reveal_delay: Duration,
    last_error: Option<String>,
}

impl ChatSession {
    /// A fresh session holding only the welcome message.
    #[must_use]
    pub fn new(id: Uuid, reveal_delay: Duration) -> Self {
        Self {
            id,
            messages: vec![ConversationMessage::assistant_text(
                Some(WELCOME_ID.to_string()),
                WELCOME_MESSAGE,
            )],
            status: SessionStatus::Idle,
            image_view: ImageView::default(),
            selection: Vec::new(),
            pending: None,
            next_token: 1,
            reveal_delay,
            last_error: None,
        }
    }

    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub fn messages(&self) -> &[ConversationMessage] {
        &self.messages
    }

    #[must_use]
    pub const fn status(&self) -> SessionStatus {
        self.status
    }

    #[must_use]
    pub const fn image_view(&self) -> ImageView {
        self.image_view
    }

    /// Ids of the houses currently displayed.
    #[must_use]
    pub fn selection(&self) -> &[HouseId] {
        &self.selection
    }

    #[must_use]
    pub const fn pending(&self) -> Option<&PendingSelection> {
        self.pending.as_ref()
    }

    /// True while a selection is waiting to be revealed.
    #[must_use]
    pub const fn is_loading(&self) -> bool {
        self.pending.is_some()
    }

    #[must_use]
    pub const fn reveal_delay(&self) -> Duration {
        self.reveal_delay
    }

    /// Error text of the last failed stream, cleared on the next message.
    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Apply one event.
    ///
    /// # Errors
    ///
    /// Returns `Busy` when the user submits while a reply is streaming and
    /// `EmptyMessage` for blank input. The session is unchanged on error.
    pub fn apply(&mut self, event: SessionEvent) -> Result<Vec<SessionEffect>, SessionError> {
        match event {
            SessionEvent::UserSubmitted { text } => self.submit(text),
            SessionEvent::Stream(event) => Ok(self.on_stream_event(event)),
            SessionEvent::SelectionRevealed { token } => {
                if self.pending.as_ref().is_some_and(|p| p.token == token)
                    && let Some(pending) = self.pending.take()
                {
                    self.selection = pending.house_ids;
                }
                Ok(Vec::new())
            }
            SessionEvent::ImageViewSelected(view) => {
                self.image_view = view;
                Ok(Vec::new())
            }
            SessionEvent::StreamAborted => {
                if self.status == SessionStatus::Streaming {
                    self.settle();
                }
                Ok(Vec::new())
            }
        }
    }

    fn submit(&mut self, text: String) -> Result<Vec<SessionEffect>, SessionError> {
        if self.status == SessionStatus::Streaming {
            return Err(SessionError::Busy);
        }
        if text.trim().is_empty() {
            return Err(SessionError::EmptyMessage);
        }

        self.messages.push(ConversationMessage::user_text(text));
        self.status = SessionStatus::Streaming;
        self.last_error = None;

        Ok(vec![SessionEffect::StartStream {
            history: self.messages.clone(),
        }])
    }

    fn on_stream_event(&mut self, event: ChatStreamEvent) -> Vec<SessionEffect> {
        if self.status != SessionStatus::Streaming {
            return Vec::new();
        }

        match event {
            ChatStreamEvent::Start { message_id } => {
                self.messages.push(ConversationMessage {
                    id: Some(message_id),
                    role: Role::Assistant,
                    parts: Vec::new(),
                });
            }
            ChatStreamEvent::TextDelta { delta } => {
                if let Some(parts) = self.reply_parts() {
                    match parts.last_mut() {
                        Some(MessagePart::Text { text }) => text.push_str(&delta),
                        _ => parts.push(MessagePart::Text { text: delta }),
                    }
                }
            }
            ChatStreamEvent::ToolInputAvailable {
                tool_call_id,
                tool_name,
                input,
            } => {
                if let Some(parts) = self.reply_parts() {
                    parts.push(MessagePart::ToolInvocation {
                        tool_call_id,
                        tool_name,
                        input,
                        output: None,
                        error_text: None,
                    });
                }
            }
            ChatStreamEvent::ToolOutputAvailable {
                tool_call_id,
                output,
            } => {
                let selected = self.invocation(&tool_call_id).and_then(|part| {
                    let MessagePart::ToolInvocation {
                        tool_name,
                        input,
                        output: slot,
                        ..
                    } = part
                    else {
                        return None;
                    };
                    *slot = Some(output);
                    (tool_name.as_str() == SELECT_HOUSES_TOOL)
                        .then(|| SelectionInput::deserialize(&*input).ok())
                        .flatten()
                });

                if let Some(selection) = selected {
                    return vec![self.begin_reveal(selection.house_ids)];
                }
            }
            ChatStreamEvent::ToolOutputError {
                tool_call_id,
                error_text,
            } => {
                if let Some(MessagePart::ToolInvocation { error_text: slot, .. }) =
                    self.invocation(&tool_call_id)
                {
                    *slot = Some(error_text);
                }
            }
            ChatStreamEvent::FinishStep => {}
            ChatStreamEvent::Finish { .. } => self.settle(),
            ChatStreamEvent::Error { error_text } => {
                self.last_error = Some(error_text);
                self.settle();
            }
        }

        Vec::new()
    }

    /// Parts of the assistant reply being streamed, if it has started.
    fn reply_parts(&mut self) -> Option<&mut Vec<MessagePart>> {
        self.messages
            .last_mut()
            .filter(|m| m.role == Role::Assistant)
            .map(|m| &mut m.parts)
    }

    fn invocation(&mut self, id: &str) -> Option<&mut MessagePart> {
        self.reply_parts()?.iter_mut().find(
            |part| matches!(part, MessagePart::ToolInvocation { tool_call_id, .. } if tool_call_id == id),
        )
    }

    /// Replace any pending selection with a new one.
    fn begin_reveal(&mut self, house_ids: Vec<HouseId>) -> SessionEffect {
        let token = self.next_token;
        self.next_token += 1;
        self.pending = Some(PendingSelection { token, house_ids });
        SessionEffect::ScheduleReveal {
            token,
            after: self.reveal_delay,
        }
    }

    /// Return to idle, leaving the history valid for the next request.
    fn settle(&mut self) {
        self.status = SessionStatus::Idle;

        if let Some(last) = self.messages.last_mut()
            && last.role == Role::Assistant
            && last.id.as_deref() != Some(WELCOME_ID)
        {
            last.parts.retain(|part| match part {
                MessagePart::Text { text } => !text.is_empty(),
                MessagePart::ToolInvocation {
                    output, error_text, ..
                } => output.is_some() || error_text.is_some(),
            });
            if last.parts.is_empty() {
                self.messages.pop();
            }
        }
    }
}
