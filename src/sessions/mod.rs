//! Per-user conversation state: history plus at most one pending clarification.

pub mod in_memory;
pub mod traits;

pub use in_memory::InMemorySessionStore;
pub use traits::{PendingClarification, SessionGuard, SessionStore, UserSession};

/// Create a default in-memory session store.
pub fn create_session_store() -> Box<dyn SessionStore> {
    Box::new(InMemorySessionStore::new())
}
