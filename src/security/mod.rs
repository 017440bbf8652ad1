//! Secret hygiene helpers used by logging and status output.

/// Redact sensitive values for safe logging. Shows first 4 chars + "***" suffix.
pub fn redact(value: &str) -> String {
    match value.char_indices().nth(4) {
        Some((idx, _)) => format!("{}***", &value[..idx]),
        None => "***".to_string(),
    }
}

/// Render an optional credential for display: redacted when set, a marker otherwise.
pub fn describe_credential(value: Option<&str>) -> String {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(v) => redact(v),
        None => "(not set)".to_string(),
    }
}
