//! Transports that feed user messages into the [`HybridDispatcher`].
//!
//! Both transports go through [`reply_for`], so a model outage becomes a
//! user-visible line instead of tearing down the loop or the listener.

pub mod cli;
pub mod slack;

use crate::agent::HybridDispatcher;

/// Dispatch one message and always come back with something to show the user.
pub async fn reply_for(dispatcher: &HybridDispatcher, user_id: &str, text: &str) -> String {
    match dispatcher.handle(user_id, text).await {
        Ok(reply) => {
            tracing::debug!(user_id, kind = ?reply.kind, "Reply ready");
            reply.text
        }
        Err(err) => {
            tracing::error!(user_id, error = %err, "Dispatch failed");
            err.user_message()
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::dispatcher;
    use super::*;

    #[tokio::test]
    async fn chat_reply_passes_through() {
        let d = dispatcher(vec![]);
        assert_eq!(reply_for(&d, "u1", "hello").await, "echo: hello");
    }

    #[tokio::test]
    async fn model_failure_becomes_user_message() {
        let d = dispatcher(vec![]);
        let text = reply_for(&d, "u1", "please fail").await;
        assert_eq!(text, "⚠️ The assistant is unavailable right now. Please try again.");
        let session = d.sessions().snapshot("u1").await.unwrap();
        assert!(session.history.is_empty());
    }
}
