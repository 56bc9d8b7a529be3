//! In-memory session store.
//!
//! Sessions live in a `moka` cache and are evicted after an hour without
//! access. Nothing is persisted.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::session::{ChatSession, SessionError};

/// Idle time after which a session is dropped.
pub const SESSION_IDLE_TIMEOUT: Duration = Duration::from_secs(60 * 60);

const MAX_SESSIONS: u64 = 10_000;

/// A session shared between handlers and background tasks.
pub type SharedSession = Arc<Mutex<ChatSession>>;

/// Expiring map from session id to session.
#[derive(Clone)]
pub struct SessionStore {
    sessions: Cache<Uuid, SharedSession>,
    reveal_delay: Duration,
}

impl SessionStore {
    /// Create an empty store. New sessions use `reveal_delay`.
    #[must_use]
    pub fn new(reveal_delay: Duration) -> Self {
        let sessions = Cache::builder()
            .max_capacity(MAX_SESSIONS)
            .time_to_idle(SESSION_IDLE_TIMEOUT)
            .build();

        Self {
            sessions,
            reveal_delay,
        }
    }

    /// Create and store a fresh session.
    pub async fn create(&self) -> (Uuid, SharedSession) {
        let id = Uuid::new_v4();
        let session = Arc::new(Mutex::new(ChatSession::new(id, self.reveal_delay)));
        self.sessions.insert(id, Arc::clone(&session)).await;
        tracing::debug!(session_id = %id, "Session created");
        (id, session)
    }

    /// Look up a session.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the id is unknown or has expired.
    pub async fn get(&self, id: Uuid) -> Result<SharedSession, SessionError> {
        self.sessions
            .get(&id)
            .await
            .ok_or(SessionError::NotFound(id))
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("sessions", &self.sessions.entry_count())
            .field("reveal_delay", &self.reveal_delay)
            .finish()
    }
}
