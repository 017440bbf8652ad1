use super::schema::{FieldSpec, ParamSchema, ValidatedParams};
use super::traits::{Tool, ToolError};
use async_trait::async_trait;

/// Acknowledges a password reset for a user account.
pub struct ResetPasswordTool {
    schema: ParamSchema,
}

impl ResetPasswordTool {
    pub fn new() -> Self {
        Self {
            schema: ParamSchema::new(vec![FieldSpec::string("user")
                .min_len(1)
                .describe("Account name or user id whose password should be reset")]),
        }
    }
}

impl Default for ResetPasswordTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for ResetPasswordTool {
    fn name(&self) -> &str {
        "reset_password"
    }

    fn description(&self) -> &str {
        "Reset a user's password"
    }

    fn schema(&self) -> &ParamSchema {
        &self.schema
    }

    async fn execute(&self, params: &ValidatedParams) -> Result<String, ToolError> {
        let user = params
            .get_str("user")
            .ok_or_else(|| ToolError::Other("user is required".into()))?;
        tracing::info!(user = %crate::security::redact(user), "Password reset requested");
        Ok(format!("Password for {user} reset successfully."))
    }
}
