//! Hybrid dispatch: per message, either run a validated tool call or hand the
//! message to the conversational responder.
//!
//! Per-user state is `Idle` (no pending clarification) or `AwaitingParameter`
//! (a [`PendingClarification`] is stored). The user's session lock is held from
//! before the pending state is read until after history is appended, so two
//! messages from one user never interleave. Different users never share a lock
//! across a model or tool call.

use super::classifier::{Classification, Classifier};
use super::error::DispatchError;
use super::prompt::RESPONDER_SYSTEM_PROMPT;
use super::traits::{LanguageModel, ModelRole, ProviderModel};
use crate::config::{Config, ModelConfig};
use crate::infra::{create_usage_tracker, UsageTracker};
use crate::providers::create_provider_with_url;
use crate::sessions::{create_session_store, PendingClarification, SessionStore, UserSession};
use crate::tools::validate::{is_sentinel_value, unfilled_fields};
use crate::tools::{
    default_registry, validate, DocumentStore, FieldIssue, RawParams, Tool, ToolExecutor,
    ToolRegistry, Validation,
};
use anyhow::Context;
use serde_json::Value;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    /// Responder output, verbatim.
    Chat,
    /// A tool ran; the text is its result or its error line.
    ToolExecuted,
    /// Validation failed; the user is now asked for the listed fields.
    AwaitingParameters,
    /// The classifier itself asked for a parameter.
    ClarificationRequested,
    UnknownTool,
    ParseFailure,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub kind: ReplyKind,
}

impl Reply {
    fn new(text: impl Into<String>, kind: ReplyKind) -> Self {
        Self {
            text: text.into(),
            kind,
        }
    }

    fn from_error(err: &DispatchError, kind: ReplyKind) -> Self {
        Self::new(err.user_message(), kind)
    }
}

pub struct HybridDispatcher {
    classifier: Classifier,
    responder: Arc<dyn LanguageModel>,
    executor: ToolExecutor,
    sessions: Arc<dyn SessionStore>,
    usage: Arc<dyn UsageTracker>,
}

/// Overlay `incoming` on `base`. A placeholder never replaces a real value.
fn merge_params(mut base: RawParams, incoming: RawParams) -> RawParams {
    for (key, value) in incoming {
        let keeps_existing = is_sentinel_value(&value)
            && base.get(&key).is_some_and(|existing| !is_sentinel_value(existing));
        if !keeps_existing {
            base.insert(key, value);
        }
    }
    base
}

fn provider_model(config: &ModelConfig, role: ModelRole) -> anyhow::Result<ProviderModel> {
    let provider = create_provider_with_url(
        &config.provider,
        config.api_key.as_deref(),
        config.api_url.as_deref(),
    )
    .with_context(|| format!("Failed to create {role} provider"))?;
    Ok(ProviderModel::new(
        provider,
        role,
        &config.model,
        config.temperature,
    ))
}

impl HybridDispatcher {
    pub fn new(
        classifier: Arc<dyn LanguageModel>,
        responder: Arc<dyn LanguageModel>,
        executor: ToolExecutor,
        sessions: Arc<dyn SessionStore>,
        usage: Arc<dyn UsageTracker>,
    ) -> Self {
        Self {
            classifier: Classifier::new(classifier),
            responder,
            executor,
            sessions,
            usage,
        }
    }

    /// Wire both model roles, the built-in tools and in-memory state from config.
    pub fn from_config(config: &Config, documents: Arc<DocumentStore>) -> anyhow::Result<Self> {
        let classifier = provider_model(&config.classifier, ModelRole::Classifier)?;
        let responder = provider_model(&config.responder, ModelRole::Responder)?
            .with_system_prompt(RESPONDER_SYSTEM_PROMPT);
        let registry =
            default_registry(&config.tools, documents).context("Failed to register tools")?;

        tracing::info!(
            classifier = %config.classifier.model,
            responder = %config.responder.model,
            tools = registry.len(),
            "Dispatcher ready"
        );

        Ok(Self::new(
            Arc::new(classifier),
            Arc::new(responder),
            ToolExecutor::new(Arc::new(registry)),
            Arc::from(create_session_store()),
            Arc::from(create_usage_tracker()),
        ))
    }

    pub fn registry(&self) -> &ToolRegistry {
        self.executor.registry()
    }

    pub fn sessions(&self) -> &dyn SessionStore {
        self.sessions.as_ref()
    }

    pub fn usage(&self) -> &dyn UsageTracker {
        self.usage.as_ref()
    }

    /// Handle one user message.
    ///
    /// Returns `Err` only when a model call fails; the user's state and history
    /// are then left exactly as they were.
    pub async fn handle(&self, user_id: &str, message: &str) -> Result<Reply, DispatchError> {
        let mut guard = self.sessions.acquire(user_id).await;
        let session: &mut UserSession = &mut guard;

        let classification = self
            .classifier
            .classify(
                message,
                &session.history,
                session.pending.as_ref(),
                self.registry(),
                self.usage.as_ref(),
            )
            .await
            .map_err(DispatchError::Model)?;

        let reply = match classification {
            Err(err) => {
                tracing::warn!(user_id, error = %err, "Classifier output rejected");
                Reply::from_error(&DispatchError::from(err), ReplyKind::ParseFailure)
            }
            Ok(Classification::General) => match session.pending.clone() {
                Some(pending) => self.fill_pending(session, pending, message).await,
                None => {
                    tracing::debug!(user_id, "Routing to responder");
                    let text = self
                        .responder
                        .respond(message, &session.history, self.usage.as_ref())
                        .await
                        .map_err(DispatchError::Model)?;
                    Reply::new(text, ReplyKind::Chat)
                }
            },
            Ok(Classification::ToolCall { tool, params }) => {
                self.on_tool_call(session, &tool, params).await
            }
            Ok(Classification::MissingParameter {
                tool,
                parameter,
                params,
            }) => self.on_missing_parameter(session, tool.as_deref(), &parameter, params),
        };

        session.record_exchange(message, &reply.text);
        Ok(reply)
    }

    /// `AwaitingParameter` + general message: the text fills the earliest unfilled field.
    async fn fill_pending(
        &self,
        session: &mut UserSession,
        pending: PendingClarification,
        message: &str,
    ) -> Reply {
        let Some(tool) = self.registry().lookup(&pending.tool) else {
            session.pending = None;
            return Reply::from_error(
                &DispatchError::UnknownTool(pending.tool),
                ReplyKind::UnknownTool,
            );
        };

        let mut params = pending.params;
        let target = unfilled_fields(tool.schema(), &params)
            .first()
            .map(ToString::to_string);
        if let Some(field) = target {
            tracing::debug!(user_id = %session.user_id, tool = tool.name(), field = %field, "Filling pending field");
            params.insert(field, Value::String(message.trim().to_string()));
        }

        self.validate_and_run(session, tool, params).await
    }

    async fn on_tool_call(&self, session: &mut UserSession, name: &str, params: RawParams) -> Reply {
        let Some(tool) = self.registry().lookup(name) else {
            tracing::info!(user_id = %session.user_id, tool = name, "Classifier named an unknown tool");
            return Reply::from_error(
                &DispatchError::UnknownTool(name.to_string()),
                ReplyKind::UnknownTool,
            );
        };

        let params = match session.pending.take() {
            Some(pending) if pending.tool == name => merge_params(pending.params, params),
            Some(pending) => {
                tracing::info!(
                    user_id = %session.user_id,
                    discarded = %pending.tool,
                    tool = name,
                    "New tool request replaces pending one"
                );
                params
            }
            None => params,
        };

        self.validate_and_run(session, tool, params).await
    }

    /// The classifier asked for more input. With a known tool, extracted values
    /// merge into the pending call and the reply lists every field still missing.
    fn on_missing_parameter(
        &self,
        session: &mut UserSession,
        tool: Option<&str>,
        parameter: &str,
        params: RawParams,
    ) -> Reply {
        let ask = format!(
            "⚠️ I need the '{parameter}' to continue. Please provide it along with other parameters too."
        );

        let Some(name) = tool else {
            tracing::info!(user_id = %session.user_id, parameter, "Missing parameter for unidentified tool");
            return Reply::new(ask, ReplyKind::ClarificationRequested);
        };
        let Some(tool) = self.registry().lookup(name) else {
            return Reply::from_error(
                &DispatchError::UnknownTool(name.to_string()),
                ReplyKind::UnknownTool,
            );
        };

        let params = match session.pending.take() {
            Some(pending) if pending.tool == name => merge_params(pending.params, params),
            _ => params,
        };
        match validate(tool.schema(), &params) {
            Validation::Invalid(issues) => {
                let mut reply = Self::await_parameters(session, tool, params, issues);
                reply.kind = ReplyKind::ClarificationRequested;
                reply
            }
            Validation::Valid(_) => Reply::new(ask, ReplyKind::ClarificationRequested),
        }
    }

    fn await_parameters(
        session: &mut UserSession,
        tool: &dyn Tool,
        params: RawParams,
        issues: Vec<FieldIssue>,
    ) -> Reply {
        let missing: Vec<String> = issues.iter().map(|i| i.field.clone()).collect();
        tracing::info!(user_id = %session.user_id, tool = tool.name(), missing = ?missing, "Awaiting parameters");
        session.pending = Some(PendingClarification {
            tool: tool.name().to_string(),
            params,
            missing,
        });
        Reply::from_error(
            &DispatchError::Validation {
                tool: tool.name().to_string(),
                issues,
            },
            ReplyKind::AwaitingParameters,
        )
    }

    async fn validate_and_run(
        &self,
        session: &mut UserSession,
        tool: &dyn Tool,
        params: RawParams,
    ) -> Reply {
        match validate(tool.schema(), &params) {
            Validation::Valid(valid) => {
                session.pending = None;
                tracing::info!(user_id = %session.user_id, tool = tool.name(), "Executing tool");
                let text = self.executor.execute(tool.name(), &valid).await;
                Reply::new(text, ReplyKind::ToolExecuted)
            }
            Validation::Invalid(issues) => Self::await_parameters(session, tool, params, issues),
        }
    }
}

#[cfg(test)]
mod merge_tests {
    use super::*;
    use serde_json::json;

    fn raw(v: Value) -> RawParams {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn new_values_win() {
        let merged = merge_params(raw(json!({"trip_no": 1})), raw(json!({"trip_no": 2})));
        assert_eq!(merged["trip_no"], json!(2));
    }

    #[test]
    fn placeholders_do_not_erase_real_values() {
        let merged = merge_params(
            raw(json!({"trip_no": 1, "reason": "sick"})),
            raw(json!({"reason": "unknown", "trip_no": null, "usr": ""})),
        );
        assert_eq!(merged["trip_no"], json!(1));
        assert_eq!(merged["reason"], json!("sick"));
        assert_eq!(merged["usr"], json!(""));
    }
}
