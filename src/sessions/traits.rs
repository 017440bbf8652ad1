//! Session types and the storage seam used by the dispatcher.

use crate::providers::ChatMessage;
use crate::tools::RawParams;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Exclusive access to one user's session. Held for a whole dispatch.
pub type SessionGuard = tokio::sync::OwnedMutexGuard<UserSession>;

/// A tool call waiting for the user to supply more values.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingClarification {
    /// Always names a registered tool.
    pub tool: String,
    pub params: RawParams,
    /// Fields still missing or invalid, in schema order.
    pub missing: Vec<String>,
}

/// Everything remembered about one user.
#[derive(Debug, Clone)]
pub struct UserSession {
    pub user_id: String,
    pub history: Vec<ChatMessage>,
    pub pending: Option<PendingClarification>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl UserSession {
    pub fn new(user_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            user_id: user_id.into(),
            history: Vec::new(),
            pending: None,
            created_at: now,
            last_activity: now,
        }
    }

    pub fn is_awaiting_parameter(&self) -> bool {
        self.pending.is_some()
    }

    /// Append one user turn and the reply it produced.
    pub fn record_exchange(&mut self, message: &str, reply: &str) {
        self.history.push(ChatMessage::user(message));
        self.history.push(ChatMessage::assistant(reply));
        self.last_activity = Utc::now();
    }
}

/// Keyed store with per-user serialization.
///
/// `acquire` must not hold any store-wide lock once it returns; only the
/// returned guard keeps that user's session locked.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Lock a user's session, creating an empty one on first contact.
    async fn acquire(&self, user_id: &str) -> SessionGuard;

    /// Copy of a user's session, waiting for any in-flight dispatch to finish.
    async fn snapshot(&self, user_id: &str) -> Option<UserSession>;

    fn user_count(&self) -> usize;

    fn name(&self) -> &str;
}
