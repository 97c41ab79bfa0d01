use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use af_domain::{Error, Result};

use crate::session::Session;

/// Owns session lifecycle. The runtime only appends through the
/// [`Session`](crate::Session) handle; creation and destruction go through
/// this trait.
#[async_trait::async_trait]
pub trait SessionService: Send + Sync {
    /// Create a session. A `None` id gets a fresh UUID.
    async fn create_session(
        &self,
        app: &str,
        user: &str,
        session_id: Option<String>,
    ) -> Result<Arc<Session>>;

    async fn get_session(&self, app: &str, user: &str, session_id: &str)
        -> Result<Option<Arc<Session>>>;

    async fn delete_session(&self, app: &str, user: &str, session_id: &str) -> Result<()>;
}

/// In-memory session service for embedding and tests.
#[derive(Default)]
pub struct InMemorySessionService {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
}

impl InMemorySessionService {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(app: &str, user: &str, session_id: &str) -> String {
        format!("{app}/{user}/{session_id}")
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}

#[async_trait::async_trait]
impl SessionService for InMemorySessionService {
    async fn create_session(
        &self,
        app: &str,
        user: &str,
        session_id: Option<String>,
    ) -> Result<Arc<Session>> {
        let id = session_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let key = Self::key(app, user, &id);

        let mut sessions = self.sessions.write();
        if sessions.contains_key(&key) {
            return Err(Error::Config(format!("session already exists: {key}")));
        }

        let session = Arc::new(Session::new(app, user, id));
        sessions.insert(key, session.clone());

        tracing::debug!(app, user, session_id = session.id(), "session created");
        Ok(session)
    }

    async fn get_session(
        &self,
        app: &str,
        user: &str,
        session_id: &str,
    ) -> Result<Option<Arc<Session>>> {
        Ok(self
            .sessions
            .read()
            .get(&Self::key(app, user, session_id))
            .cloned())
    }

    async fn delete_session(&self, app: &str, user: &str, session_id: &str) -> Result<()> {
        self.sessions
            .write()
            .remove(&Self::key(app, user, session_id));
        Ok(())
    }
}
