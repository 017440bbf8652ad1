//! Classifier output contract.
//!
//! The model must answer with `general`, a tool call
//! `{"tool": ..., "parameters": {...}}` carrying whatever values it could
//! extract, or `{"missing_parameter": ...}` when it extracted nothing. Values
//! sent alongside `missing_parameter` are kept.
//! Anything else either falls open to conversation (no leading `{`) or is a
//! parse failure (a leading `{` that is not one of the two shapes). No branch
//! here can produce a tool call from text the model did not shape as one.

use super::prompt;
use super::traits::LanguageModel;
use crate::infra::UsageTracker;
use crate::providers::ChatMessage;
use crate::sessions::PendingClarification;
use crate::tools::{RawParams, ToolRegistry};
use serde_json::Value;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    General,
    ToolCall {
        tool: String,
        params: RawParams,
    },
    MissingParameter {
        tool: Option<String>,
        parameter: String,
        params: RawParams,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClassificationError {
    #[error("classifier output is not valid JSON: {0}")]
    InvalidJson(String),
    #[error("classifier output has an unrecognized shape")]
    UnrecognizedShape,
    #[error("tool parameters must be a JSON object")]
    ParametersNotObject,
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
}

fn parameters(value: Option<&Value>) -> Result<RawParams, ClassificationError> {
    match value {
        None | Some(Value::Null) => Ok(RawParams::new()),
        Some(Value::Object(map)) => Ok(map.clone()),
        Some(_) => Err(ClassificationError::ParametersNotObject),
    }
}

/// Parse raw classifier output.
pub fn parse_classification(raw: &str) -> Result<Classification, ClassificationError> {
    let trimmed = raw.trim();
    let unquoted = trimmed.trim_matches(|c| c == '"' || c == '\'').trim();

    if unquoted.eq_ignore_ascii_case("general") || !trimmed.starts_with('{') {
        return Ok(Classification::General);
    }

    let value: Value = serde_json::from_str(trimmed)
        .map_err(|e| ClassificationError::InvalidJson(e.to_string()))?;
    let Value::Object(obj) = value else {
        return Err(ClassificationError::UnrecognizedShape);
    };

    if obj.contains_key("missing_parameter") {
        let parameter = non_empty_str(obj.get("missing_parameter"))
            .ok_or(ClassificationError::UnrecognizedShape)?;
        return Ok(Classification::MissingParameter {
            tool: non_empty_str(obj.get("tool")),
            parameter,
            params: parameters(obj.get("parameters"))?,
        });
    }

    if obj.contains_key("tool") {
        let tool = non_empty_str(obj.get("tool")).ok_or(ClassificationError::UnrecognizedShape)?;
        let params = parameters(obj.get("parameters"))?;
        return Ok(Classification::ToolCall { tool, params });
    }

    Err(ClassificationError::UnrecognizedShape)
}

/// Builds the classification prompt, asks the model, parses the answer.
pub struct Classifier {
    model: Arc<dyn LanguageModel>,
}

impl Classifier {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    /// `Err` only when the model call itself fails; a malformed answer is the
    /// inner `Err`.
    pub async fn classify(
        &self,
        message: &str,
        history: &[ChatMessage],
        pending: Option<&PendingClarification>,
        registry: &ToolRegistry,
        usage: &dyn UsageTracker,
    ) -> anyhow::Result<Result<Classification, ClassificationError>> {
        let prompt = prompt::build_classifier_prompt(message, registry, pending);
        let raw = self.model.respond(&prompt, history, usage).await?;
        tracing::debug!(output = %raw.trim(), "Classifier output");
        Ok(parse_classification(&raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn general_in_any_form() {
        for raw in ["general", "General", "\"general\"", "  GENERAL \n", "'general'"] {
            assert_eq!(parse_classification(raw), Ok(Classification::General), "{raw:?}");
        }
    }

    #[test]
    fn non_brace_output_fails_open() {
        for raw in [
            "",
            "   ",
            "Sure! I can cancel that trip.",
            "```json\n{\"tool\":\"cancel_trip_api\"}\n```",
            "[\"tool\"]",
        ] {
            assert_eq!(parse_classification(raw), Ok(Classification::General), "{raw:?}");
        }
    }

    #[test]
    fn tool_call_with_parameters() {
        let parsed = parse_classification(
            r#"{"tool": "cancel_trip_api", "parameters": {"trip_no": 12, "reason": "sick"}}"#,
        )
        .unwrap();
        let Classification::ToolCall { tool, params } = parsed else {
            panic!("expected tool call");
        };
        assert_eq!(tool, "cancel_trip_api");
        assert_eq!(params["trip_no"], json!(12));
        assert_eq!(params["reason"], json!("sick"));
    }

    #[test]
    fn tool_call_without_parameters_is_empty() {
        for raw in [
            r#"{"tool": "reset_password"}"#,
            r#"{"tool": "reset_password", "parameters": null}"#,
        ] {
            assert_eq!(
                parse_classification(raw),
                Ok(Classification::ToolCall {
                    tool: "reset_password".into(),
                    params: RawParams::new()
                })
            );
        }
    }

    #[test]
    fn missing_parameter_with_and_without_tool() {
        assert_eq!(
            parse_classification(r#"{"missing_parameter": "trip_no"}"#),
            Ok(Classification::MissingParameter {
                tool: None,
                parameter: "trip_no".into(),
                params: RawParams::new()
            })
        );
        assert_eq!(
            parse_classification(r#"{"missing_parameter": "trip_no", "tool": "cancel_trip_api"}"#),
            Ok(Classification::MissingParameter {
                tool: Some("cancel_trip_api".into()),
                parameter: "trip_no".into(),
                params: RawParams::new()
            })
        );
    }

    #[test]
    fn missing_parameter_takes_precedence_over_tool() {
        let parsed = parse_classification(
            r#"{"tool": "cancel_trip_api", "parameters": {}, "missing_parameter": "reason"}"#,
        )
        .unwrap();
        assert!(matches!(parsed, Classification::MissingParameter { .. }));
    }

    #[test]
    fn values_next_to_missing_parameter_are_kept() {
        let parsed = parse_classification(
            r#"{"missing_parameter": "reason", "tool": "cancel_trip_api", "parameters": {"trip_no": 1234}}"#,
        )
        .unwrap();
        let Classification::MissingParameter { tool, parameter, params } = parsed else {
            panic!("expected missing parameter");
        };
        assert_eq!(tool.as_deref(), Some("cancel_trip_api"));
        assert_eq!(parameter, "reason");
        assert_eq!(params["trip_no"], json!(1234));

        assert_eq!(
            parse_classification(r#"{"missing_parameter": "reason", "parameters": [1]}"#),
            Err(ClassificationError::ParametersNotObject)
        );
    }

    #[test]
    fn brace_output_that_is_not_json_is_a_parse_failure() {
        assert!(matches!(
            parse_classification("{tool: cancel}"),
            Err(ClassificationError::InvalidJson(_))
        ));
        assert!(matches!(
            parse_classification(r#"{"tool": "x"} trailing"#),
            Err(ClassificationError::InvalidJson(_))
        ));
    }

    #[test]
    fn unrecognized_shapes_are_parse_failures() {
        for raw in [
            r#"{}"#,
            r#"{"action": "cancel"}"#,
            r#"{"tool": ""}"#,
            r#"{"tool": 7}"#,
            r#"{"missing_parameter": ""}"#,
        ] {
            assert_eq!(
                parse_classification(raw),
                Err(ClassificationError::UnrecognizedShape),
                "{raw:?}"
            );
        }
    }

    #[test]
    fn non_object_parameters_are_rejected() {
        assert_eq!(
            parse_classification(r#"{"tool": "reset_password", "parameters": "jdoe"}"#),
            Err(ClassificationError::ParametersNotObject)
        );
    }
}
