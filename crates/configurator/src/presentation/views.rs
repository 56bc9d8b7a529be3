//! Server-rendered views of a chat session.

use askama::Template;
use askama_web::WebTemplate;

use mood_core::{Catalog, HouseRecord, ImageView};

use super::session::{ChatSession, SessionStatus};
use crate::filters;
use crate::models::Role;

/// Skeleton cards shown while a selection is loading.
pub const SKELETON_CARDS: usize = 4;

/// One transcript bubble.
#[derive(Debug, Clone)]
pub struct MessageView {
    pub is_user: bool,
    /// Raw text. Assistant text is rendered as markdown, user text escaped.
    pub text: String,
}

/// The visible chat transcript.
#[derive(Debug, Clone)]
pub struct TranscriptView {
    pub session_id: String,
    pub messages: Vec<MessageView>,
    /// Show the typing indicator.
    pub typing: bool,
    pub streaming: bool,
    pub error: Option<String>,
}

impl TranscriptView {
    #[must_use]
    pub fn from_session(session: &ChatSession) -> Self {
        let messages: Vec<MessageView> = session
            .messages()
            .iter()
            .map(|m| MessageView {
                is_user: m.role == Role::User,
                text: m.text(),
            })
            .filter(|m| !m.text.is_empty())
            .collect();

        let streaming = session.status() == SessionStatus::Streaming;
        let typing = streaming
            && !session
                .messages()
                .last()
                .is_some_and(|m| m.role == Role::Assistant && !m.text().is_empty());

        Self {
            session_id: session.id().to_string(),
            messages,
            typing,
            streaming,
            error: session.last_error().map(str::to_string),
        }
    }
}

/// An image-view tab.
#[derive(Debug, Clone)]
pub struct ViewTab {
    pub value: &'static str,
    pub label: &'static str,
    pub active: bool,
}

/// A selected house as rendered in the panel.
#[derive(Debug, Clone)]
pub struct HouseCard {
    pub id: String,
    pub kind: String,
    pub size: String,
    pub area: f64,
    pub rooms: Vec<String>,
    pub image_path: String,
    pub image_alt: String,
}

impl HouseCard {
    fn new(house: &HouseRecord, view: ImageView) -> Self {
        Self {
            id: house.id.to_string(),
            kind: house.kind.to_string(),
            size: house.size.to_string(),
            area: house.total_area_m2,
            rooms: house.rooms.clone(),
            image_path: house.image_path(view),
            image_alt: format!("{} - {}", house.kind, view.label()),
        }
    }
}

/// The selection panel.
#[derive(Debug, Clone)]
pub struct SelectionView {
    pub session_id: String,
    /// False hides the panel and gives the chat the full width.
    pub visible: bool,
    pub loading: bool,
    pub skeletons: usize,
    /// Milliseconds until a loading selection is revealed.
    pub reveal_ms: u128,
    pub tabs: Vec<ViewTab>,
    pub cards: Vec<HouseCard>,
}

impl SelectionView {
    /// Build the panel, resolving selected ids against `catalog`.
    ///
    /// Ids the catalog does not know are left out.
    #[must_use]
    pub fn from_session(session: &ChatSession, catalog: &Catalog) -> Self {
        let view = session.image_view();
        let cards: Vec<HouseCard> = catalog
            .resolve_houses(session.selection())
            .into_iter()
            .map(|house| HouseCard::new(house, view))
            .collect();
        let loading = session.is_loading();

        Self {
            session_id: session.id().to_string(),
            visible: loading || !cards.is_empty(),
            loading,
            skeletons: SKELETON_CARDS,
            reveal_ms: session.reveal_delay().as_millis(),
            tabs: ImageView::ALL
                .iter()
                .map(|&v| ViewTab {
                    value: v.as_str(),
                    label: v.label(),
                    active: v == view,
                })
                .collect(),
            cards,
        }
    }
}

/// Full widget page.
#[derive(Template, WebTemplate)]
#[template(path = "pages/widget.html")]
pub struct WidgetPageTemplate {
    pub transcript: TranscriptView,
    pub selection: SelectionView,
}

/// Transcript fragment.
#[derive(Template, WebTemplate)]
#[template(path = "partials/transcript.html")]
pub struct TranscriptTemplate {
    pub transcript: TranscriptView,
}

/// Selection panel fragment.
#[derive(Template, WebTemplate)]
#[template(path = "partials/selection.html")]
pub struct SelectionTemplate {
    pub selection: SelectionView,
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use uuid::Uuid;

    use super::*;
    use crate::claude::SELECT_HOUSES_TOOL;
    use crate::presentation::SessionEvent;
    use crate::services::ChatStreamEvent;

    fn catalog() -> Catalog {
        Catalog::builtin().expect("catalog")
    }

    fn session_with_selection(ids: &[&str]) -> ChatSession {
        let mut session = ChatSession::new(Uuid::new_v4(), Duration::from_millis(1500));
        let events = [
            SessionEvent::UserSubmitted {
                text: "Somos dos".to_string(),
            },
            SessionEvent::Stream(ChatStreamEvent::Start {
                message_id: "msg_1".to_string(),
            }),
            SessionEvent::Stream(ChatStreamEvent::ToolInputAvailable {
                tool_call_id: "toolu_1".to_string(),
                tool_name: SELECT_HOUSES_TOOL.to_string(),
                input: json!({ "house_ids": ids }),
            }),
            SessionEvent::Stream(ChatStreamEvent::ToolOutputAvailable {
                tool_call_id: "toolu_1".to_string(),
                output: json!({"success": true}),
            }),
            SessionEvent::SelectionRevealed { token: 1 },
        ];
        for event in events {
            session.apply(event).expect("transition");
        }
        session
    }

    #[test]
    fn test_selection_cards_follow_selected_order() {
        let session = session_with_selection(&["xsa", "sa"]);
        let view = SelectionView::from_session(&session, &catalog());

        assert!(view.visible);
        assert!(!view.loading);
        let ids: Vec<&str> = view.cards.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, ["xsa", "sa"]);

        let first = view.cards.first().expect("card");
        assert_eq!(first.kind, "articulated");
        assert_eq!(first.size, "XS");
        assert_eq!(first.image_path, "/houses/snippets/XS_A/XS_A_fachada.jpg");
    }

    #[test]
    fn test_unknown_ids_are_omitted() {
        let session = session_with_selection(&["xsa", "gone"]);
        let view = SelectionView::from_session(&session, &catalog());
        assert_eq!(view.cards.len(), 1);
    }

    #[test]
    fn test_empty_session_hides_panel() {
        let session = ChatSession::new(Uuid::new_v4(), Duration::ZERO);
        let view = SelectionView::from_session(&session, &catalog());
        assert!(!view.visible);
        assert_eq!(view.tabs.len(), 3);
        assert!(view.tabs.first().is_some_and(|t| t.active && t.value == "facade"));
    }

    #[test]
    fn test_selection_fragment_renders_tabs_and_cards() {
        let mut session = session_with_selection(&["xsa"]);
        session
            .apply(SessionEvent::ImageViewSelected(ImageView::Layout))
            .expect("view");

        let html = SelectionTemplate {
            selection: SelectionView::from_session(&session, &catalog()),
        }
        .render()
        .expect("render");

        assert!(html.contains("Floor Plan"));
        assert!(html.contains("/houses/snippets/XS_A/XS_A_layout.jpg"));
        assert!(html.contains("76 m2"));
        assert!(html.contains("2 bedrooms + 1 bathroom"));
    }

    #[test]
    fn test_loading_fragment_renders_skeletons() {
        let mut session = ChatSession::new(Uuid::new_v4(), Duration::from_millis(1500));
        for event in [
            SessionEvent::UserSubmitted {
                text: "Somos dos".to_string(),
            },
            SessionEvent::Stream(ChatStreamEvent::Start {
                message_id: "msg_1".to_string(),
            }),
            SessionEvent::Stream(ChatStreamEvent::ToolInputAvailable {
                tool_call_id: "toolu_1".to_string(),
                tool_name: SELECT_HOUSES_TOOL.to_string(),
                input: json!({"house_ids": ["xsa"]}),
            }),
            SessionEvent::Stream(ChatStreamEvent::ToolOutputAvailable {
                tool_call_id: "toolu_1".to_string(),
                output: json!({"success": true}),
            }),
        ] {
            session.apply(event).expect("transition");
        }

        let html = SelectionTemplate {
            selection: SelectionView::from_session(&session, &catalog()),
        }
        .render()
        .expect("render");

        assert_eq!(html.matches("house-skeleton").count(), SKELETON_CARDS);
        assert!(html.contains("data-reveal-ms=\"1500\""));
    }

    #[test]
    fn test_transcript_renders_markdown_and_escapes_user_text() {
        let mut session = ChatSession::new(Uuid::new_v4(), Duration::ZERO);
        session
            .apply(SessionEvent::UserSubmitted {
                text: "<b>hola</b>".to_string(),
            })
            .expect("submit");

        let transcript = TranscriptView::from_session(&session);
        assert!(transcript.typing);

        let html = TranscriptTemplate { transcript }.render().expect("render");
        assert!(html.contains("<h1>🌿 Bienvenido a MOOD</h1>"));
        assert!(html.contains("&#60;b&#62;hola&#60;/b&#62;"));
        assert!(!html.contains("<b>hola</b>"));
        assert!(html.contains("typing-indicator"));
    }
}
