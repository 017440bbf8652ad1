//! Tool subsystem: the structured backend actions the router can invoke.
//!
//! Each tool implements the [`Tool`] trait defined in [`traits`]: a name, a
//! description, a declarative [`ParamSchema`] and an async `execute` that only
//! ever sees parameters accepted by [`validate`]. Tools are assembled once at
//! startup into a [`ToolRegistry`] by [`default_registry`] and run through the
//! [`ToolExecutor`], which turns every outcome into reply text.
//!
//! # Extension
//!
//! To add a tool, implement [`Tool`] in a new submodule and register it in
//! [`default_registry`].

pub mod cancel_trip;
pub mod executor;
pub mod registry;
pub mod reset_password;
pub mod schema;
pub mod traits;
pub mod update_document;
pub mod validate;

pub use cancel_trip::CancelTripTool;
pub use executor::ToolExecutor;
pub use registry::{RegistryError, ToolRegistry};
pub use reset_password::ResetPasswordTool;
pub use schema::{FieldSpec, ParamKind, ParamSchema, ParamValue, RawParams, ValidatedParams};
pub use traits::{Tool, ToolError, ToolSpec};
pub use update_document::{DocumentStore, UpdateDocumentTool};
pub use validate::{validate, FieldIssue, IssueReason, Validation};

use crate::config::ToolsConfig;
use std::sync::Arc;

/// Build the built-in registry: document update, password reset, trip cancellation.
pub fn default_registry(
    config: &ToolsConfig,
    documents: Arc<DocumentStore>,
) -> Result<ToolRegistry, RegistryError> {
    let mut registry = ToolRegistry::new();
    registry.register(UpdateDocumentTool::new(documents))?;
    registry.register(ResetPasswordTool::new())?;
    registry.register(CancelTripTool::new(&config.cancel_trip))?;
    Ok(registry)
}

/// Human-readable listing for `deskhand tools`.
pub fn describe_registry(registry: &ToolRegistry) -> String {
    let mut out = String::new();
    for tool in registry.iter() {
        out.push_str(&format!("{} - {}\n", tool.name(), tool.description()));
        for field in tool.schema().fields() {
            let requirement = match field.default_value() {
                None => "required".to_string(),
                Some(v) => format!("default {v}"),
            };
            out.push_str(&format!(
                "    {:<12} {:<8} {:<16} {}\n",
                field.name,
                field.kind.type_name(),
                requirement,
                field.description
            ));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> ToolRegistry {
        default_registry(&ToolsConfig::default(), Arc::new(DocumentStore::new())).unwrap()
    }

    #[test]
    fn default_registry_has_builtin_tools_in_order() {
        let registry = registry();
        let names: Vec<&str> = registry.list().into_iter().map(|(n, _)| n).collect();
        assert_eq!(
            names,
            vec!["update_document", "reset_password", "cancel_trip_api"]
        );
    }

    #[test]
    fn default_tools_all_have_descriptions_and_schemas() {
        let registry = registry();
        for tool in registry.iter() {
            assert!(!tool.description().is_empty(), "{} has no description", tool.name());
            let spec = tool.spec();
            assert_eq!(spec.name, tool.name());
            assert!(
                spec.parameters["properties"].is_object(),
                "{} schema has no properties",
                tool.name()
            );
        }
    }

    #[test]
    fn describe_registry_lists_every_field() {
        let text = describe_registry(&registry());
        for needle in ["update_document", "doc_name", "reset_password", "trip_no", "reason"] {
            assert!(text.contains(needle), "listing is missing {needle}");
        }
    }
}
