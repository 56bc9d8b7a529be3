//! Presentation layer for the chat widget.
//!
//! - `session` - [`ChatSession`] and its event-driven transitions
//! - `store` - Expiring in-memory session store
//! - `views` - Askama views of a session

mod session;
mod store;
mod views;

pub use session::{
    ChatSession, PendingSelection, SessionEffect, SessionError, SessionEvent, SessionStatus,
    WELCOME_ID, WELCOME_MESSAGE,
};
pub use store::{SESSION_IDLE_TIMEOUT, SessionStore, SharedSession};
pub use views::{
    HouseCard, MessageView, SKELETON_CARDS, SelectionTemplate, SelectionView, TranscriptTemplate,
    TranscriptView, ViewTab, WidgetPageTemplate,
};
