use super::schema::{FieldSpec, ParamSchema, ValidatedParams};
use super::traits::{Tool, ToolError};
use crate::config::CancelTripConfig;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

const TASK_CODE: &str = "TRIP_CANCELLATION";

/// Cancels a trip through the trip-operations HTTP API.
pub struct CancelTripTool {
    endpoint: String,
    /// `host:port` shown to the user when the endpoint is unreachable.
    target: String,
    api_key: String,
    timeout_secs: u64,
    schema: ParamSchema,
    client: Client,
}

impl CancelTripTool {
    pub fn new(config: &CancelTripConfig) -> Self {
        let mut usr = FieldSpec::integer("usr").describe("Operator user id");
        if let Some(id) = config.default_user_id {
            usr = usr.with_default(json!(id));
        }
        let mut auth_token = FieldSpec::string("auth_token").describe("Access token for the trip API");
        if let Some(token) = &config.auth_token {
            auth_token = auth_token.with_default(json!(token));
        }

        Self {
            endpoint: config.endpoint.clone(),
            target: endpoint_target(&config.endpoint),
            api_key: config.api_key.clone().unwrap_or_default(),
            timeout_secs: config.timeout_secs,
            schema: ParamSchema::new(vec![
                FieldSpec::integer("trip_no").describe("Trip number to cancel"),
                FieldSpec::string("reason")
                    .min_len(1)
                    .describe("Why the trip is being cancelled"),
                usr,
                auth_token,
            ]),
            client: Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs))
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    fn map_transport_error(&self, err: &reqwest::Error) -> ToolError {
        if err.is_timeout() {
            ToolError::Timeout(self.timeout_secs)
        } else if err.is_connect() {
            ToolError::Connect(self.target.clone())
        } else {
            ToolError::Other(err.to_string())
        }
    }
}

fn endpoint_target(endpoint: &str) -> String {
    reqwest::Url::parse(endpoint)
        .ok()
        .and_then(|url| {
            let host = url.host_str()?.to_string();
            Some(match url.port_or_known_default() {
                Some(port) => format!("{host}:{port}"),
                None => host,
            })
        })
        .unwrap_or_else(|| endpoint.to_string())
}

fn field_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// `[{result}] {message} | Meta: {meta}`
fn render_success(body: &Value) -> String {
    let meta = body.get("meta").cloned().unwrap_or_else(|| json!({}));
    format!(
        "[{}] {} | Meta: {}",
        field_text(body.get("result")),
        field_text(body.get("message")),
        meta
    )
}

#[async_trait]
impl Tool for CancelTripTool {
    fn name(&self) -> &str {
        "cancel_trip_api"
    }

    fn description(&self) -> &str {
        "Cancel a trip by trip number, with a reason"
    }

    fn schema(&self) -> &ParamSchema {
        &self.schema
    }

    async fn execute(&self, params: &ValidatedParams) -> Result<String, ToolError> {
        let missing = |field: &str| ToolError::Other(format!("{field} is required"));
        let trip_no = params.get_int("trip_no").ok_or_else(|| missing("trip_no"))?;
        let reason = params.get_str("reason").ok_or_else(|| missing("reason"))?;
        let usr = params.get_int("usr").ok_or_else(|| missing("usr"))?;
        let auth_token = params
            .get_str("auth_token")
            .ok_or_else(|| missing("auth_token"))?;

        let payload = json!({
            "task_code": TASK_CODE,
            "usr": usr,
            "meta": {
                "trip_no": trip_no,
                "reason": reason,
                "api_key": self.api_key,
                "auth_token": auth_token,
            }
        });

        tracing::info!(trip_no, usr, endpoint = %self.endpoint, "Sending trip cancellation");

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-access-token", auth_token)
            .header("x-api-key", &self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| self.map_transport_error(&e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ToolError::Http {
                status: status.as_u16(),
                body: crate::providers::sanitize_api_error(&body),
            });
        }

        let body: Value = response.json().await.map_err(|e| {
            if e.is_timeout() {
                ToolError::Timeout(self.timeout_secs)
            } else {
                ToolError::InvalidResponse(e.to_string())
            }
        })?;

        Ok(render_success(&body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::validate::{validate, Validation};
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};
    use std::net::SocketAddr;

    async fn spawn(router: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        addr
    }

    fn config(endpoint: String, timeout_secs: u64) -> CancelTripConfig {
        CancelTripConfig {
            endpoint,
            api_key: Some("trip-key".into()),
            timeout_secs,
            default_user_id: Some(192_731),
            auth_token: Some("token-1".into()),
        }
    }

    fn params(tool: &CancelTripTool) -> ValidatedParams {
        let raw = json!({"trip_no": 4411, "reason": "flight moved"});
        match validate(tool.schema(), raw.as_object().unwrap()) {
            Validation::Valid(p) => p,
            Validation::Invalid(issues) => panic!("unexpected issues: {issues:?}"),
        }
    }

    #[tokio::test]
    async fn success_renders_result_message_and_meta() {
        let router = Router::new().route(
            "/cancel-trip",
            post(|headers: HeaderMap, Json(body): Json<Value>| async move {
                let token = headers
                    .get("x-access-token")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                let key = headers
                    .get("x-api-key")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                Json(json!({
                    "result": "SUCCESS",
                    "message": format!("Trip {} cancelled", body["meta"]["trip_no"]),
                    "meta": {
                        "task_code": body["task_code"],
                        "usr": body["usr"],
                        "token": token,
                        "key": key,
                    }
                }))
            }),
        );
        let addr = spawn(router).await;
        let tool = CancelTripTool::new(&config(format!("http://{addr}/cancel-trip"), 5));

        let out = tool.execute(&params(&tool)).await.unwrap();
        assert!(out.starts_with("[SUCCESS] Trip 4411 cancelled | Meta: "), "{out}");
        assert!(out.contains("\"task_code\":\"TRIP_CANCELLATION\""));
        assert!(out.contains("\"usr\":192731"));
        assert!(out.contains("\"token\":\"token-1\""));
        assert!(out.contains("\"key\":\"trip-key\""));
    }

    #[tokio::test]
    async fn non_2xx_maps_to_http_error() {
        let router = Router::new().route(
            "/cancel-trip",
            post(|| async { (StatusCode::UNPROCESSABLE_ENTITY, "trip already closed") }),
        );
        let addr = spawn(router).await;
        let tool = CancelTripTool::new(&config(format!("http://{addr}/cancel-trip"), 5));

        let err = tool.execute(&params(&tool)).await.unwrap_err();
        assert_eq!(
            err.user_message(),
            "❌ HTTP error: 422 - trip already closed"
        );
    }

    #[tokio::test]
    async fn slow_server_maps_to_timeout() {
        let router = Router::new().route(
            "/cancel-trip",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "late"
            }),
        );
        let addr = spawn(router).await;
        let tool = CancelTripTool::new(&config(format!("http://{addr}/cancel-trip"), 1));

        let err = tool.execute(&params(&tool)).await.unwrap_err();
        assert!(matches!(err, ToolError::Timeout(1)), "{err:?}");
        assert_eq!(err.user_message(), "❌ API call timed out after 1 seconds.");
    }

    #[tokio::test]
    async fn refused_connection_maps_to_connect_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let tool = CancelTripTool::new(&config(format!("http://{addr}/cancel-trip"), 2));
        let err = tool.execute(&params(&tool)).await.unwrap_err();
        assert!(matches!(err, ToolError::Connect(_)), "{err:?}");
        assert_eq!(
            err.user_message(),
            format!("❌ Could not connect to server at {addr}.")
        );
    }

    #[tokio::test]
    async fn non_json_body_is_invalid_response() {
        let router = Router::new().route("/cancel-trip", post(|| async { "ok" }));
        let addr = spawn(router).await;
        let tool = CancelTripTool::new(&config(format!("http://{addr}/cancel-trip"), 5));

        let err = tool.execute(&params(&tool)).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidResponse(_)), "{err:?}");
    }

    #[test]
    fn unconfigured_defaults_make_fields_required() {
        let mut cfg = config("http://localhost:3001/cancel-trip".into(), 5);
        cfg.default_user_id = None;
        cfg.auth_token = None;
        let tool = CancelTripTool::new(&cfg);

        let result = validate(tool.schema(), &serde_json::Map::new());
        assert_eq!(
            result.offending_fields(),
            vec!["trip_no", "reason", "usr", "auth_token"]
        );
    }

    #[test]
    fn placeholder_auth_token_default_is_flagged() {
        let mut cfg = config("http://localhost:3001/cancel-trip".into(), 5);
        cfg.auth_token = Some("unknown".into());
        let tool = CancelTripTool::new(&cfg);

        let raw = json!({"trip_no": 1, "reason": "x"});
        let result = validate(tool.schema(), raw.as_object().unwrap());
        assert_eq!(result.offending_fields(), vec!["auth_token"]);
    }

    #[test]
    fn endpoint_target_uses_host_and_port() {
        assert_eq!(
            endpoint_target("http://localhost:3001/cancel-trip"),
            "localhost:3001"
        );
        assert_eq!(endpoint_target("https://trips.example.com/x"), "trips.example.com:443");
        assert_eq!(endpoint_target("not a url"), "not a url");
    }

    #[test]
    fn render_success_tolerates_missing_fields() {
        assert_eq!(render_success(&json!({})), "[]  | Meta: {}");
    }
}
