use super::classifier::ClassificationError;
use crate::tools::FieldIssue;

/// Everything that can stop a message from reaching a tool or the responder.
///
/// Only [`DispatchError::Model`] escapes the dispatcher; every other variant is
/// answered with [`DispatchError::user_message`].
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("model call failed: {0}")]
    Model(#[source] anyhow::Error),
    #[error(transparent)]
    Classification(#[from] ClassificationError),
    #[error("unknown tool `{0}`")]
    UnknownTool(String),
    #[error("tool `{tool}` has {} unusable parameter(s)", issues.len())]
    Validation {
        tool: String,
        issues: Vec<FieldIssue>,
    },
}

impl DispatchError {
    pub fn user_message(&self) -> String {
        match self {
            Self::Model(_) => "⚠️ The assistant is unavailable right now. Please try again.".into(),
            Self::Classification(_) => {
                "⚠️ Could not parse JSON. Please check tool request format.".into()
            }
            Self::UnknownTool(name) => format!("⚠️ Tool '{name}' not recognized."),
            Self::Validation { issues, .. } => validation_message(issues),
        }
    }
}

fn validation_message(issues: &[FieldIssue]) -> String {
    let (missing, invalid): (Vec<&FieldIssue>, Vec<&FieldIssue>) =
        issues.iter().partition(|i| i.is_missing());

    let mut parts = Vec::new();
    if !missing.is_empty() {
        let names: Vec<&str> = missing.iter().map(|i| i.field.as_str()).collect();
        parts.push(format!(
            "⚠️ Missing parameters: {}. Please provide them.",
            names.join(", ")
        ));
    }
    if !invalid.is_empty() {
        let details: Vec<String> = invalid.iter().map(ToString::to_string).collect();
        parts.push(format!(
            "⚠️ Invalid parameters: {}. Please correct them.",
            details.join(", ")
        ));
    }
    parts.join("\n")
}
