//! Slack Socket Mode listener.
//!
//! Opens a WebSocket with the app token, acknowledges every envelope, and hands
//! human messages to the dispatcher on their own task. Replies go back through
//! `chat.postMessage` with the bot token.

use super::reply_for;
use crate::agent::HybridDispatcher;
use crate::providers::sanitize_api_error;
use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio_tungstenite::{connect_async, tungstenite::Message};

const SLACK_API_BASE: &str = "https://slack.com/api";

/// Message subtypes that never reach the dispatcher.
const IGNORED_SUBTYPES: &[&str] = &["bot_message", "message_changed", "message_deleted"];

/// A human message worth answering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub user_id: String,
    pub channel: String,
    pub text: String,
}

/// One Socket Mode frame, reduced to what the listener acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketFrame {
    Hello,
    /// Slack is about to drop the connection; reconnect right away.
    Disconnect { reason: Option<String> },
    /// Anything carrying an `envelope_id`. Only message events produce `message`.
    Envelope {
        envelope_id: String,
        message: Option<InboundMessage>,
    },
    Other,
}

fn str_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(ToString::to_string)
}

fn inbound_from_event(event: &Value) -> Option<InboundMessage> {
    if event.get("bot_id").is_some() {
        return None;
    }
    if let Some(subtype) = event.get("subtype").and_then(Value::as_str) {
        if IGNORED_SUBTYPES.contains(&subtype) {
            return None;
        }
    }
    let text = str_field(event, "text").filter(|t| !t.trim().is_empty())?;
    Some(InboundMessage {
        user_id: str_field(event, "user")?,
        channel: str_field(event, "channel")?,
        text,
    })
}

/// Parse a text frame received over the Socket Mode WebSocket.
pub fn parse_socket_frame(raw: &str) -> Result<SocketFrame, serde_json::Error> {
    let frame: Value = serde_json::from_str(raw)?;
    let kind = frame.get("type").and_then(Value::as_str).unwrap_or_default();

    if kind == "hello" {
        return Ok(SocketFrame::Hello);
    }
    if kind == "disconnect" {
        return Ok(SocketFrame::Disconnect {
            reason: str_field(&frame, "reason"),
        });
    }

    let Some(envelope_id) = str_field(&frame, "envelope_id") else {
        return Ok(SocketFrame::Other);
    };
    let message = if kind == "events_api" {
        frame
            .get("payload")
            .and_then(|p| p.get("event"))
            .and_then(inbound_from_event)
    } else {
        None
    };
    Ok(SocketFrame::Envelope {
        envelope_id,
        message,
    })
}

#[derive(Debug, Deserialize)]
struct SlackApiResponse {
    ok: bool,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Web API calls the listener needs.
pub struct SlackApi {
    client: Client,
    base_url: String,
    app_token: String,
    bot_token: String,
}

impl SlackApi {
    pub fn new(app_token: impl Into<String>, bot_token: impl Into<String>) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(30))
                .connect_timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| Client::new()),
            base_url: SLACK_API_BASE.to_string(),
            app_token: app_token.into(),
            bot_token: bot_token.into(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{method}", self.base_url)
    }

    async fn call(&self, request: reqwest::RequestBuilder, method: &str) -> Result<SlackApiResponse> {
        let response = request
            .send()
            .await
            .with_context(|| format!("Slack {method} request failed"))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Slack {method} failed ({status}): {}", sanitize_api_error(&body));
        }
        let parsed: SlackApiResponse = response
            .json()
            .await
            .with_context(|| format!("Slack {method} returned an unreadable body"))?;
        if !parsed.ok {
            anyhow::bail!(
                "Slack {method} rejected: {}",
                parsed.error.as_deref().unwrap_or("unknown_error")
            );
        }
        Ok(parsed)
    }

    /// `apps.connections.open`: a fresh WebSocket URL for this app.
    pub async fn open_connection(&self) -> Result<String> {
        let request = self
            .client
            .post(self.method_url("apps.connections.open"))
            .bearer_auth(&self.app_token);
        self.call(request, "apps.connections.open")
            .await?
            .url
            .context("Slack apps.connections.open returned no url")
    }

    /// `chat.postMessage` into the channel the message came from.
    pub async fn post_message(&self, channel: &str, text: &str) -> Result<()> {
        let request = self
            .client
            .post(self.method_url("chat.postMessage"))
            .bearer_auth(&self.bot_token)
            .json(&json!({ "channel": channel, "text": text }));
        self.call(request, "chat.postMessage").await.map(|_| ())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Consecutive failures tolerated before the listener gives up.
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_retries: 10,
            base_delay_ms: 500,
            max_delay_ms: 30_000,
        }
    }
}

impl ReconnectPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self
            .base_delay_ms
            .saturating_mul(multiplier)
            .min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

pub struct SlackListener {
    api: Arc<SlackApi>,
    dispatcher: Arc<HybridDispatcher>,
    reconnect_policy: ReconnectPolicy,
}

impl SlackListener {
    pub fn new(api: Arc<SlackApi>, dispatcher: Arc<HybridDispatcher>) -> Self {
        Self {
            api,
            dispatcher,
            reconnect_policy: ReconnectPolicy::default(),
        }
    }

    pub fn with_reconnect_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect_policy = policy;
        self
    }

    /// Listen until the failure streak exceeds the retry budget.
    pub async fn run(&self) -> Result<()> {
        let mut attempt: u32 = 0;
        loop {
            match self.connect_and_pump().await {
                Ok(()) => {
                    attempt = 0;
                    tracing::info!("Socket Mode connection ended; reconnecting");
                    tokio::time::sleep(self.reconnect_policy.backoff(0)).await;
                }
                Err(error) => {
                    tracing::warn!(
                        attempt,
                        max_retries = self.reconnect_policy.max_retries,
                        error = %error,
                        "Socket Mode connection failed"
                    );
                    if attempt >= self.reconnect_policy.max_retries {
                        return Err(error.context("Slack Socket Mode retries exhausted"));
                    }
                    tokio::time::sleep(self.reconnect_policy.backoff(attempt)).await;
                    attempt += 1;
                }
            }
        }
    }

    /// One connection: returns `Ok` when Slack asks us to reconnect or closes cleanly.
    pub async fn connect_and_pump(&self) -> Result<()> {
        let url = self.api.open_connection().await?;
        let (mut ws, _) = connect_async(url.as_str())
            .await
            .context("Failed to open Socket Mode WebSocket")?;
        tracing::info!("Connected to Slack Socket Mode");

        while let Some(frame) = ws.next().await {
            let frame = frame.context("Socket Mode read failed")?;
            let text = match frame {
                Message::Text(text) => text,
                Message::Close(_) => {
                    tracing::info!("Socket Mode connection closed by Slack");
                    return Ok(());
                }
                _ => continue,
            };

            let parsed = match parse_socket_frame(&text) {
                Ok(parsed) => parsed,
                Err(error) => {
                    tracing::warn!(error = %error, "Ignoring unreadable Socket Mode frame");
                    continue;
                }
            };

            match parsed {
                SocketFrame::Hello => tracing::debug!("Socket Mode hello"),
                SocketFrame::Disconnect { reason } => {
                    tracing::info!(reason = reason.as_deref().unwrap_or("unspecified"), "Slack requested reconnect");
                    let _ = ws.close(None).await;
                    return Ok(());
                }
                SocketFrame::Envelope {
                    envelope_id,
                    message,
                } => {
                    let ack = json!({ "envelope_id": envelope_id }).to_string();
                    if let Err(error) = ws.send(Message::Text(ack)).await {
                        tracing::warn!(envelope_id = %envelope_id, error = %error, "Failed to acknowledge envelope");
                    }
                    if let Some(message) = message {
                        self.spawn_reply(message);
                    }
                }
                SocketFrame::Other => {}
            }
        }

        tracing::info!("Socket Mode stream ended");
        Ok(())
    }

    fn spawn_reply(&self, message: InboundMessage) {
        let api = Arc::clone(&self.api);
        let dispatcher = Arc::clone(&self.dispatcher);
        tokio::spawn(async move {
            tracing::info!(user_id = %message.user_id, channel = %message.channel, "Slack message received");
            let reply = reply_for(&dispatcher, &message.user_id, &message.text).await;
            if let Err(error) = api.post_message(&message.channel, &reply).await {
                tracing::warn!(channel = %message.channel, error = %error, "Failed to post Slack reply");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::test_support::dispatcher;
    use axum::extract::State;
    use axum::http::HeaderMap;
    use axum::routing::post;
    use axum::{Json, Router};
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;

    fn event_frame(event: Value) -> String {
        json!({
            "envelope_id": "env-1",
            "type": "events_api",
            "accepts_response_payload": false,
            "payload": { "type": "event_callback", "event": event }
        })
        .to_string()
    }

    #[test]
    fn hello_and_disconnect_frames() {
        assert_eq!(
            parse_socket_frame(r#"{"type":"hello","num_connections":1}"#).unwrap(),
            SocketFrame::Hello
        );
        assert_eq!(
            parse_socket_frame(r#"{"type":"disconnect","reason":"refresh_requested"}"#).unwrap(),
            SocketFrame::Disconnect {
                reason: Some("refresh_requested".into())
            }
        );
    }

    #[test]
    fn human_message_event_is_extracted() {
        let frame = event_frame(json!({
            "type": "message", "user": "U1", "channel": "C9", "text": "cancel trip 12"
        }));
        assert_eq!(
            parse_socket_frame(&frame).unwrap(),
            SocketFrame::Envelope {
                envelope_id: "env-1".into(),
                message: Some(InboundMessage {
                    user_id: "U1".into(),
                    channel: "C9".into(),
                    text: "cancel trip 12".into(),
                }),
            }
        );
    }

    #[test]
    fn bot_and_textless_events_are_acked_but_ignored() {
        for event in [
            json!({"type": "message", "user": "U1", "channel": "C9", "text": "hi", "bot_id": "B1"}),
            json!({"type": "message", "user": "U1", "channel": "C9"}),
            json!({"type": "message", "user": "U1", "channel": "C9", "text": "  "}),
            json!({"type": "message", "subtype": "message_changed", "channel": "C9", "text": "x", "user": "U1"}),
        ] {
            assert_eq!(
                parse_socket_frame(&event_frame(event.clone())).unwrap(),
                SocketFrame::Envelope {
                    envelope_id: "env-1".into(),
                    message: None
                },
                "{event}"
            );
        }
    }

    #[test]
    fn non_event_envelopes_still_need_ack() {
        let frame = r#"{"envelope_id":"env-7","type":"slash_commands","payload":{}}"#;
        assert_eq!(
            parse_socket_frame(frame).unwrap(),
            SocketFrame::Envelope {
                envelope_id: "env-7".into(),
                message: None
            }
        );
        assert_eq!(parse_socket_frame(r#"{"type":"ping"}"#).unwrap(), SocketFrame::Other);
        assert!(parse_socket_frame("not json").is_err());
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = ReconnectPolicy {
            max_retries: 5,
            base_delay_ms: 100,
            max_delay_ms: 1_000,
        };
        assert_eq!(policy.backoff(0), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(400));
        assert_eq!(policy.backoff(10), Duration::from_millis(1_000));
        assert_eq!(policy.backoff(u32::MAX), Duration::from_millis(1_000));
    }

    // ── Web API against a local stub ─────────────────────────

    #[derive(Clone)]
    struct Stub {
        ws_url: String,
        posts: mpsc::UnboundedSender<(String, Value)>,
        opens: Arc<AtomicUsize>,
    }

    async fn spawn_http(stub: Stub) -> SocketAddr {
        let router = Router::new()
            .route(
                "/apps.connections.open",
                post(|State(stub): State<Stub>, headers: HeaderMap| async move {
                    stub.opens.fetch_add(1, Ordering::SeqCst);
                    let auth = headers
                        .get("authorization")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or_default();
                    if auth == "Bearer xapp-test" {
                        Json(json!({"ok": true, "url": stub.ws_url}))
                    } else {
                        Json(json!({"ok": false, "error": "invalid_auth"}))
                    }
                }),
            )
            .route(
                "/chat.postMessage",
                post(
                    |State(stub): State<Stub>, headers: HeaderMap, Json(body): Json<Value>| async move {
                        let auth = headers
                            .get("authorization")
                            .and_then(|v| v.to_str().ok())
                            .unwrap_or_default()
                            .to_string();
                        let _ = stub.posts.send((auth, body));
                        Json(json!({"ok": true}))
                    },
                ),
            )
            .with_state(stub);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        addr
    }

    #[tokio::test]
    async fn open_connection_returns_url_or_slack_error() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let addr = spawn_http(Stub {
            ws_url: "wss://example.invalid/link".into(),
            posts: tx,
            opens: Arc::default(),
        })
        .await;

        let api = SlackApi::new("xapp-test", "xoxb-test").with_base_url(format!("http://{addr}/"));
        assert_eq!(api.open_connection().await.unwrap(), "wss://example.invalid/link");

        let bad = SlackApi::new("xapp-wrong", "xoxb-test").with_base_url(format!("http://{addr}"));
        let err = bad.open_connection().await.unwrap_err().to_string();
        assert!(err.contains("invalid_auth"), "{err}");
    }

    #[tokio::test]
    async fn envelope_is_acked_dispatched_and_answered() {
        let ws_listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let ws_addr = ws_listener.local_addr().unwrap();
        let (ack_tx, mut ack_rx) = mpsc::unbounded_channel::<String>();

        tokio::spawn(async move {
            let (stream, _) = ws_listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
            ws.send(Message::Text(r#"{"type":"hello"}"#.into())).await.unwrap();
            ws.send(Message::Text(event_frame(json!({
                "type": "message", "user": "U42", "channel": "C7", "text": "hello bot"
            }))))
            .await
            .unwrap();
            while let Some(Ok(msg)) = ws.next().await {
                if let Message::Text(text) = msg {
                    let _ = ack_tx.send(text);
                    break;
                }
            }
            ws.send(Message::Text(r#"{"type":"disconnect","reason":"refresh_requested"}"#.into()))
                .await
                .unwrap();
            while ws.next().await.is_some() {}
        });

        let (post_tx, mut post_rx) = mpsc::unbounded_channel();
        let http = spawn_http(Stub {
            ws_url: format!("ws://{ws_addr}"),
            posts: post_tx,
            opens: Arc::default(),
        })
        .await;

        let api = Arc::new(SlackApi::new("xapp-test", "xoxb-test").with_base_url(format!("http://{http}")));
        let listener = SlackListener::new(api, Arc::new(dispatcher(vec![])));
        listener.connect_and_pump().await.unwrap();

        let ack = ack_rx.recv().await.unwrap();
        assert_eq!(serde_json::from_str::<Value>(&ack).unwrap(), json!({"envelope_id": "env-1"}));

        let (auth, body) = tokio::time::timeout(Duration::from_secs(5), post_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(auth, "Bearer xoxb-test");
        assert_eq!(body, json!({"channel": "C7", "text": "echo: hello bot"}));
    }

    #[tokio::test]
    async fn clean_disconnects_wait_before_reconnecting() {
        let ws_listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let ws_addr = ws_listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((stream, _)) = ws_listener.accept().await {
                tokio::spawn(async move {
                    let Ok(mut ws) = tokio_tungstenite::accept_async(stream).await else {
                        return;
                    };
                    let _ = ws
                        .send(Message::Text(r#"{"type":"disconnect","reason":"warning"}"#.into()))
                        .await;
                    while let Some(Ok(_)) = ws.next().await {}
                });
            }
        });

        let (post_tx, _post_rx) = mpsc::unbounded_channel();
        let opens = Arc::new(AtomicUsize::new(0));
        let http = spawn_http(Stub {
            ws_url: format!("ws://{ws_addr}"),
            posts: post_tx,
            opens: opens.clone(),
        })
        .await;

        let api = Arc::new(SlackApi::new("xapp-test", "xoxb-test").with_base_url(format!("http://{http}")));
        let listener = SlackListener::new(api, Arc::new(dispatcher(vec![]))).with_reconnect_policy(
            ReconnectPolicy {
                max_retries: 3,
                base_delay_ms: 200,
                max_delay_ms: 1_000,
            },
        );
        let outcome = tokio::time::timeout(Duration::from_millis(700), listener.run()).await;
        assert!(outcome.is_err(), "listener keeps reconnecting after clean closes");

        let count = opens.load(Ordering::SeqCst);
        assert!((2..=5).contains(&count), "opened {count} connections in 700ms");
    }
}
