use super::registry::ToolRegistry;
use super::schema::ValidatedParams;
use std::sync::Arc;
use std::time::Instant;

/// Runs validated tool calls and turns every outcome into reply text.
#[derive(Clone)]
pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
}

impl ToolExecutor {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Execute `name` with `params`. Never fails: errors become a user-facing line.
    pub async fn execute(&self, name: &str, params: &ValidatedParams) -> String {
        let Some(tool) = self.registry.lookup(name) else {
            tracing::warn!(tool = name, "Executor asked for unregistered tool");
            return format!("⚠️ Tool '{name}' not recognized.");
        };

        let started = Instant::now();
        match tool.execute(params).await {
            Ok(output) => {
                tracing::info!(
                    tool = name,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Tool executed"
                );
                output
            }
            Err(err) => {
                tracing::warn!(
                    tool = name,
                    kind = err.kind(),
                    error = %err,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Tool failed"
                );
                err.user_message()
            }
        }
    }
}
