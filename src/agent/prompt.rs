use crate::sessions::PendingClarification;
use crate::tools::ToolRegistry;
use std::fmt::Write;

/// System prompt for the conversational responder.
pub const RESPONDER_SYSTEM_PROMPT: &str = "You are a friendly, concise tech support assistant. \
Answer general questions directly. You cannot perform account or booking actions yourself; \
if the user asks for one, tell them what details to provide.";

/// Build the classification prompt for one user message.
pub fn build_classifier_prompt(
    message: &str,
    registry: &ToolRegistry,
    pending: Option<&PendingClarification>,
) -> String {
    let mut prompt = String::new();
    prompt.push_str("You are a strict tech support assistant.\n");
    let _ = write!(prompt, "The user said:\n'{message}'\n\n");

    prompt.push_str("Available tools:\n");
    for tool in registry.iter() {
        let _ = writeln!(
            prompt,
            "{}: {} Parameters: {}",
            tool.name(),
            tool.description(),
            tool.schema().to_json_schema()
        );
    }
    prompt.push('\n');

    if let Some(pending) = pending {
        let _ = write!(
            prompt,
            "A '{}' request is waiting for: {}. Values already given: {}.\n\
             If the message supplies any of these, answer with the tool JSON and include every \
             value already given. If the message only states a bare value, answer \"general\".\n\n",
            pending.tool,
            pending.missing.join(", "),
            serde_json::Value::Object(pending.params.clone())
        );
    }

    prompt.push_str(
        "Your task:\n\
         - Decide whether this message requires a tool or is general chat.\n\
         - If it requires a tool, respond ONLY in strict JSON format:\n  \
         {\"tool\": \"TOOL_NAME\", \"parameters\": {\"param1\": \"value1\", ...}}\n\
         Include every value the user stated, even when other required parameters are still \
         missing. Partial parameters are expected; missing ones will be asked for.\n\n\
         NEVER assume or invent any parameter values. Leave out any parameter the user did not state.\n\
         Only when the tool is clear but the message gives no parameter values at all, respond ONLY with:\n  \
         {\"missing_parameter\": \"name_of_parameter\", \"tool\": \"TOOL_NAME\"}\n\n\
         If the user is just chatting, respond ONLY with:\n  \"general\"\n",
    );
    prompt
}
