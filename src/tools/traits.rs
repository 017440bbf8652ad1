use super::schema::{ParamSchema, ValidatedParams};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Failure of a tool's side effect. Never reaches the user as an error; the
/// executor turns it into a reply line via [`ToolError::user_message`].
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("request timed out after {0} seconds")]
    Timeout(u64),
    #[error("could not connect to {0}")]
    Connect(String),
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("{0}")]
    Other(String),
}

impl ToolError {
    pub fn user_message(&self) -> String {
        match self {
            Self::Timeout(secs) => format!("❌ API call timed out after {secs} seconds."),
            Self::Connect(target) => format!("❌ Could not connect to server at {target}."),
            Self::Http { status, body } => format!("❌ HTTP error: {status} - {body}"),
            Self::InvalidResponse(detail) | Self::Other(detail) => {
                format!("⚠️ Unexpected error: {detail}")
            }
        }
    }

    /// Short label for structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "timeout",
            Self::Connect(_) => "connect",
            Self::Http { .. } => "http",
            Self::InvalidResponse(_) => "invalid_response",
            Self::Other(_) => "other",
        }
    }
}

/// Description of a tool for listings and the classifier prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// A named, schema-described backend action.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique registry key, also the name the classifier must emit.
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn schema(&self) -> &ParamSchema;

    /// Perform the action. Only called with parameters that passed validation.
    async fn execute(&self, params: &ValidatedParams) -> Result<String, ToolError>;

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.schema().to_json_schema(),
        }
    }
}
