//! In-memory session store.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

use super::traits::{SessionGuard, SessionStore, UserSession};

/// Session map guarded by a short-lived `parking_lot::Mutex`; each entry has
/// its own async mutex that stays locked across model and tool calls.
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: Mutex<HashMap<String, Arc<tokio::sync::Mutex<UserSession>>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, user_id: &str) -> Arc<tokio::sync::Mutex<UserSession>> {
        let mut sessions = self.sessions.lock();
        sessions
            .entry(user_id.to_string())
            .or_insert_with(|| {
                tracing::debug!(user_id, "Session created");
                Arc::new(tokio::sync::Mutex::new(UserSession::new(user_id)))
            })
            .clone()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn acquire(&self, user_id: &str) -> SessionGuard {
        // The map lock is released here, before awaiting the per-user lock.
        let slot = self.entry(user_id);
        slot.lock_owned().await
    }

    async fn snapshot(&self, user_id: &str) -> Option<UserSession> {
        let slot = self.sessions.lock().get(user_id).cloned()?;
        let session = slot.lock().await;
        Some(session.clone())
    }

    fn user_count(&self) -> usize {
        self.sessions.lock().len()
    }

    fn name(&self) -> &str {
        "in_memory"
    }
}
