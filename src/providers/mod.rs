//! Provider subsystem for the two model roles (classifier and responder).
//!
//! Every provider implements the [`Provider`] trait defined in [`traits`] and is
//! resolved by its canonical string key in [`create_provider_with_url`]. All
//! built-in backends speak the OpenAI-compatible chat completions API, so they
//! share [`compatible::OpenAiCompatibleProvider`] and differ only in base URL and
//! credential lookup.

pub mod compatible;
pub mod traits;

#[allow(unused_imports)]
pub use traits::{ChatMessage, ChatResponse, Provider, TokenUsage};

use compatible::{AuthStyle, OpenAiCompatibleProvider};

const MAX_API_ERROR_CHARS: usize = 200;

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const PERPLEXITY_BASE_URL: &str = "https://api.perplexity.ai";

fn is_secret_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':')
}

fn token_end(input: &str, from: usize) -> usize {
    let mut end = from;
    for (i, c) in input[from..].char_indices() {
        if is_secret_char(c) {
            end = from + i + c.len_utf8();
        } else {
            break;
        }
    }
    end
}

/// Scrub known secret-like token prefixes from provider error strings.
///
/// Redacts OpenAI (`sk-`), Perplexity (`pplx-`) and Slack (`xoxb-`, `xoxp-`,
/// `xapp-`) style tokens.
pub fn scrub_secret_patterns(input: &str) -> String {
    const PREFIXES: [&str; 5] = ["sk-", "pplx-", "xoxb-", "xoxp-", "xapp-"];

    let mut scrubbed = input.to_string();

    for prefix in PREFIXES {
        let mut search_from = 0;
        loop {
            let Some(rel) = scrubbed[search_from..].find(prefix) else {
                break;
            };

            let start = search_from + rel;
            let content_start = start + prefix.len();
            let end = token_end(&scrubbed, content_start);

            if end == content_start {
                search_from = content_start;
                continue;
            }

            scrubbed.replace_range(start..end, "[REDACTED]");
            search_from = start + "[REDACTED]".len();
        }
    }

    scrubbed
}

/// Sanitize API error text by scrubbing secrets and truncating length.
pub fn sanitize_api_error(input: &str) -> String {
    let scrubbed = scrub_secret_patterns(input);

    if scrubbed.chars().count() <= MAX_API_ERROR_CHARS {
        return scrubbed;
    }

    let mut end = MAX_API_ERROR_CHARS;
    while end > 0 && !scrubbed.is_char_boundary(end) {
        end -= 1;
    }

    format!("{}...", &scrubbed[..end])
}

/// Build a sanitized provider error from a failed HTTP response.
pub async fn api_error(provider: &str, response: reqwest::Response) -> anyhow::Error {
    let status = response.status();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<failed to read provider error body>".to_string());
    let sanitized = sanitize_api_error(&body);
    anyhow::anyhow!("{provider} API error ({status}): {sanitized}")
}

/// Environment variables consulted for a provider's key, most specific first.
pub fn provider_env_candidates(name: &str) -> &'static [&'static str] {
    match name {
        "openai" => &["OPENAI_API_KEY"],
        "perplexity" => &["PERPLEXITY_API_KEY", "PPLX_API_KEY"],
        _ => &[],
    }
}

/// Resolve API key for a provider from config and environment variables.
pub fn resolve_provider_credential(
    name: &str,
    credential_override: Option<&str>,
) -> Option<String> {
    if let Some(raw_override) = credential_override {
        let trimmed_override = raw_override.trim();
        if !trimmed_override.is_empty() {
            return Some(trimmed_override.to_owned());
        }
    }

    let generic = ["DESKHAND_API_KEY", "API_KEY"];
    for env_var in provider_env_candidates(name).iter().chain(generic.iter()) {
        if let Ok(value) = std::env::var(env_var) {
            let value = value.trim();
            if !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }

    None
}

/// Factory: create the right provider from config (without custom URL)
pub fn create_provider(name: &str, api_key: Option<&str>) -> anyhow::Result<Box<dyn Provider>> {
    create_provider_with_url(name, api_key, None)
}

/// Factory: create the right provider from config with optional custom base URL
pub fn create_provider_with_url(
    name: &str,
    api_key: Option<&str>,
    api_url: Option<&str>,
) -> anyhow::Result<Box<dyn Provider>> {
    let resolved_credential = resolve_provider_credential(name, api_key);
    let key = resolved_credential.as_deref();

    match name {
        "openai" => Ok(Box::new(OpenAiCompatibleProvider::new(
            "openai",
            api_url.unwrap_or(OPENAI_BASE_URL),
            key,
            AuthStyle::Bearer,
        ))),
        "perplexity" => Ok(Box::new(OpenAiCompatibleProvider::new(
            "perplexity",
            api_url.unwrap_or(PERPLEXITY_BASE_URL),
            key,
            AuthStyle::Bearer,
        ))),
        _ if name.starts_with("custom:") => {
            let base_url = name.trim_start_matches("custom:").trim();
            if base_url.is_empty() {
                anyhow::bail!("Custom provider requires a URL, e.g. custom:https://host/v1");
            }
            reqwest::Url::parse(base_url)
                .map_err(|e| anyhow::anyhow!("Invalid custom provider URL {base_url}: {e}"))?;
            Ok(Box::new(OpenAiCompatibleProvider::new(
                "custom",
                base_url,
                key,
                AuthStyle::Bearer,
            )))
        }
        _ => anyhow::bail!(
            "Unknown provider: {name}. Supported: \"openai\", \"perplexity\", \"custom:<url>\"."
        ),
    }
}

/// Information about a supported provider for display purposes.
pub struct ProviderInfo {
    /// Canonical name used in config (e.g. `"openai"`)
    pub name: &'static str,
    /// Human-readable display name
    pub display_name: &'static str,
    /// Model used when config leaves it empty
    pub default_model: &'static str,
}

/// Return the list of built-in providers for display in `deskhand status`.
pub fn list_providers() -> Vec<ProviderInfo> {
    vec![
        ProviderInfo {
            name: "openai",
            display_name: "OpenAI",
            default_model: "gpt-4o-mini",
        },
        ProviderInfo {
            name: "perplexity",
            display_name: "Perplexity",
            default_model: "sonar-pro",
        },
    ]
}
