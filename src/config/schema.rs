use crate::providers::{provider_env_candidates, resolve_provider_credential};
use anyhow::{Context, Result};
use directories::UserDirs;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
#[cfg(unix)]
use tokio::fs::File;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

const CONFIG_FILE_NAME: &str = "config.toml";
const DEFAULT_CANCEL_TRIP_ENDPOINT: &str = "http://localhost:3001/cancel-trip";
const DEFAULT_CANCEL_TRIP_TIMEOUT_SECS: u64 = 5;

// ── Top-level config ──────────────────────────────────────────────

/// Top-level Deskhand configuration, loaded from `config.toml`.
///
/// Resolution order: `--config-dir` flag → `DESKHAND_CONFIG_DIR` env → `~/.deskhand/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Config {
    /// Path to config.toml - computed at load time, not serialized
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Model that decides between tool calls and conversation (`[classifier]`).
    #[serde(default = "ModelConfig::classifier")]
    pub classifier: ModelConfig,

    /// Model that answers general conversation (`[responder]`).
    #[serde(default = "ModelConfig::responder")]
    pub responder: ModelConfig,

    /// Tool settings (`[tools]`).
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Slack Socket Mode credentials (`[slack]`).
    #[serde(default)]
    pub slack: SlackConfig,
}

// ── Models ────────────────────────────────────────────────────────

/// One model instance: which provider, which model, how it samples.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ModelConfig {
    /// Provider key: `"openai"`, `"perplexity"` or `"custom:<url>"`.
    pub provider: String,
    /// Model name routed through the provider.
    pub model: String,
    /// Sampling temperature (0.0–2.0).
    #[serde(default)]
    pub temperature: f64,
    /// API key. Falls back to the provider's env vars (`OPENAI_API_KEY`, `PERPLEXITY_API_KEY`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Base URL override for the provider API.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
}

impl ModelConfig {
    fn classifier() -> Self {
        Self {
            provider: "openai".into(),
            model: "gpt-4o-mini".into(),
            temperature: 0.0,
            api_key: None,
            api_url: None,
        }
    }

    fn responder() -> Self {
        Self {
            provider: "perplexity".into(),
            model: "sonar-pro".into(),
            temperature: 0.7,
            api_key: None,
            api_url: None,
        }
    }

    /// Key from config or the provider's environment variables.
    pub fn resolved_api_key(&self) -> Option<String> {
        resolve_provider_credential(&self.provider, self.api_key.as_deref())
    }

    fn apply_env_overrides(&mut self, section: &str) {
        let upper = section.to_ascii_uppercase();
        if let Some(provider) = env_non_empty(&format!("DESKHAND_{upper}_PROVIDER")) {
            self.provider = provider;
        }
        if let Some(model) = env_non_empty(&format!("DESKHAND_{upper}_MODEL")) {
            self.model = model;
        }
        if let Some(key) = env_non_empty(&format!("DESKHAND_{upper}_API_KEY")) {
            self.api_key = Some(key);
        }
        if let Some(url) = env_non_empty(&format!("DESKHAND_{upper}_API_URL")) {
            self.api_url = Some(url);
        }
        if let Some(raw) = env_non_empty(&format!("DESKHAND_{upper}_TEMPERATURE")) {
            match raw.parse::<f64>() {
                Ok(temp) if (0.0..=2.0).contains(&temp) => self.temperature = temp,
                _ => tracing::warn!(
                    section,
                    value = %raw,
                    "Ignoring invalid temperature override (expected 0.0–2.0)"
                ),
            }
        }
    }

    fn validate(&self, section: &str) -> Result<()> {
        if self.provider.trim().is_empty() {
            anyhow::bail!("{section}.provider must not be empty");
        }
        if self.model.trim().is_empty() {
            anyhow::bail!("{section}.model must not be empty");
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            anyhow::bail!(
                "{section}.temperature must be between 0.0 and 2.0 (got {})",
                self.temperature
            );
        }
        Ok(())
    }

    fn require_credential(&self, section: &str) -> Result<()> {
        if self.resolved_api_key().is_some() {
            return Ok(());
        }
        let mut vars: Vec<String> = provider_env_candidates(&self.provider)
            .iter()
            .map(ToString::to_string)
            .collect();
        vars.push(format!("DESKHAND_{}_API_KEY", section.to_ascii_uppercase()));
        anyhow::bail!(
            "No API key for {section} provider \"{}\". Set {section}.api_key in config.toml or export {}.",
            self.provider,
            vars.join(" / ")
        )
    }
}

// ── Tools ─────────────────────────────────────────────────────────

/// Tool configuration (`[tools]` section).
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct ToolsConfig {
    /// Trip cancellation API (`[tools.cancel_trip]`).
    #[serde(default)]
    pub cancel_trip: CancelTripConfig,
}

/// Trip cancellation endpoint settings.
///
/// `default_user_id` and `auth_token` become parameter defaults when set; left
/// unset, the user has to supply them.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CancelTripConfig {
    /// Endpoint receiving the cancellation POST.
    #[serde(default = "default_cancel_trip_endpoint")]
    pub endpoint: String,
    /// Sent as `x-api-key` and `meta.api_key`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Request timeout in seconds.
    #[serde(default = "default_cancel_trip_timeout_secs")]
    pub timeout_secs: u64,
    /// Default for the `usr` parameter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_user_id: Option<i64>,
    /// Default for the `auth_token` parameter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
}

fn default_cancel_trip_endpoint() -> String {
    DEFAULT_CANCEL_TRIP_ENDPOINT.into()
}

fn default_cancel_trip_timeout_secs() -> u64 {
    DEFAULT_CANCEL_TRIP_TIMEOUT_SECS
}

impl Default for CancelTripConfig {
    fn default() -> Self {
        Self {
            endpoint: default_cancel_trip_endpoint(),
            api_key: None,
            timeout_secs: default_cancel_trip_timeout_secs(),
            default_user_id: None,
            auth_token: None,
        }
    }
}

// ── Slack ─────────────────────────────────────────────────────────

/// Slack Socket Mode credentials (`[slack]` section).
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct SlackConfig {
    /// App-level token (`xapp-…`) used to open the Socket Mode connection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_token: Option<String>,
    /// Bot token (`xoxb-…`) used for `chat.postMessage`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot_token: Option<String>,
}

// ── Config impl ──────────────────────────────────────────────────

impl Default for Config {
    fn default() -> Self {
        let home =
            UserDirs::new().map_or_else(|| PathBuf::from("."), |u| u.home_dir().to_path_buf());

        Self {
            config_path: home.join(".deskhand").join(CONFIG_FILE_NAME),
            classifier: ModelConfig::classifier(),
            responder: ModelConfig::responder(),
            tools: ToolsConfig::default(),
            slack: SlackConfig::default(),
        }
    }
}

fn default_config_dir() -> Result<PathBuf> {
    let home = UserDirs::new()
        .map(|u| u.home_dir().to_path_buf())
        .context("Could not find home directory")?;
    Ok(home.join(".deskhand"))
}

fn expand_dir(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(raw).into_owned())
}

/// Pick the config directory: explicit flag, then `DESKHAND_CONFIG_DIR`, then `~/.deskhand`.
pub fn resolve_config_dir(cli_override: Option<&str>) -> Result<PathBuf> {
    if let Some(dir) = cli_override.map(str::trim).filter(|d| !d.is_empty()) {
        return Ok(expand_dir(dir));
    }
    if let Some(dir) = env_non_empty("DESKHAND_CONFIG_DIR") {
        return Ok(expand_dir(&dir));
    }
    default_config_dir()
}

fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn config_dir_creation_error(path: &Path) -> String {
    format!(
        "Failed to initialize config directory {}. Pass --config-dir or set DESKHAND_CONFIG_DIR to a writable path.",
        path.display()
    )
}

impl Config {
    /// Load `config.toml` from the resolved directory, writing defaults on first run.
    pub async fn load_or_init(cli_override: Option<&str>) -> Result<Self> {
        let config_dir = resolve_config_dir(cli_override)?;
        Self::load_or_init_in(&config_dir).await
    }

    pub async fn load_or_init_in(config_dir: &Path) -> Result<Self> {
        let config_path = config_dir.join(CONFIG_FILE_NAME);

        fs::create_dir_all(config_dir)
            .await
            .with_context(|| config_dir_creation_error(config_dir))?;

        let initialized = !config_path.exists();
        let mut config = if initialized {
            let mut config = Config::default();
            config.config_path = config_path.clone();
            config.save().await?;
            config
        } else {
            // Warn if config file is world-readable (may contain API keys)
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                if let Ok(meta) = fs::metadata(&config_path).await {
                    if meta.permissions().mode() & 0o004 != 0 {
                        tracing::warn!(
                            "Config file {:?} is world-readable (mode {:o}). \
                             Consider restricting with: chmod 600 {:?}",
                            config_path,
                            meta.permissions().mode() & 0o777,
                            config_path,
                        );
                    }
                }
            }

            let contents = fs::read_to_string(&config_path)
                .await
                .context("Failed to read config file")?;
            let mut config: Config =
                toml::from_str(&contents).context("Failed to parse config file")?;
            config.config_path = config_path.clone();
            config
        };

        config.apply_env_overrides();
        config.validate()?;
        tracing::info!(
            path = %config.config_path.display(),
            initialized,
            "Config loaded"
        );
        Ok(config)
    }

    /// Validate configuration values that would cause runtime failures.
    pub fn validate(&self) -> Result<()> {
        self.classifier.validate("classifier")?;
        self.responder.validate("responder")?;

        let trip = &self.tools.cancel_trip;
        if trip.endpoint.trim().is_empty() {
            anyhow::bail!("tools.cancel_trip.endpoint must not be empty");
        }
        reqwest::Url::parse(trip.endpoint.trim()).with_context(|| {
            format!(
                "tools.cancel_trip.endpoint is not a valid URL: {}",
                trip.endpoint
            )
        })?;
        if trip.timeout_secs == 0 {
            anyhow::bail!("tools.cancel_trip.timeout_secs must be greater than 0");
        }

        Ok(())
    }

    /// Apply environment variable overrides to config
    pub fn apply_env_overrides(&mut self) {
        self.classifier.apply_env_overrides("classifier");
        self.responder.apply_env_overrides("responder");

        let trip = &mut self.tools.cancel_trip;
        if let Some(endpoint) = env_non_empty("DESKHAND_CANCEL_TRIP_ENDPOINT") {
            trip.endpoint = endpoint;
        }
        if let Some(key) = env_non_empty("DESKHAND_CANCEL_TRIP_API_KEY") {
            trip.api_key = Some(key);
        }
        if let Some(token) = env_non_empty("DESKHAND_CANCEL_TRIP_AUTH_TOKEN") {
            trip.auth_token = Some(token);
        }
        if let Some(raw) = env_non_empty("DESKHAND_CANCEL_TRIP_USER_ID") {
            match raw.parse::<i64>() {
                Ok(id) => trip.default_user_id = Some(id),
                Err(_) => tracing::warn!(value = %raw, "Ignoring non-numeric DESKHAND_CANCEL_TRIP_USER_ID"),
            }
        }
        if let Some(raw) = env_non_empty("DESKHAND_CANCEL_TRIP_TIMEOUT_SECS") {
            match raw.parse::<u64>() {
                Ok(secs) if secs > 0 => trip.timeout_secs = secs,
                _ => tracing::warn!(value = %raw, "Ignoring invalid DESKHAND_CANCEL_TRIP_TIMEOUT_SECS"),
            }
        }

        // Slack: DESKHAND_* wins, then the platform's own names.
        if let Some(token) = env_non_empty("DESKHAND_SLACK_APP_TOKEN")
            .or_else(|| env_non_empty("SLACK_APP_TOKEN"))
        {
            self.slack.app_token = Some(token);
        }
        if let Some(token) = env_non_empty("DESKHAND_SLACK_BOT_TOKEN")
            .or_else(|| env_non_empty("SLACK_BOT_TOKEN"))
        {
            self.slack.bot_token = Some(token);
        }
    }

    /// Both model roles need a key before any message is handled.
    pub fn require_model_credentials(&self) -> Result<()> {
        self.classifier.require_credential("classifier")?;
        self.responder.require_credential("responder")
    }

    /// Returns `(app_token, bot_token)` or a diagnostic naming the missing variable.
    pub fn require_slack_tokens(&self) -> Result<(String, String)> {
        let app = self
            .slack
            .app_token
            .clone()
            .filter(|t| !t.trim().is_empty())
            .context("Slack app token missing. Set slack.app_token in config.toml or export SLACK_APP_TOKEN.")?;
        let bot = self
            .slack
            .bot_token
            .clone()
            .filter(|t| !t.trim().is_empty())
            .context("Slack bot token missing. Set slack.bot_token in config.toml or export SLACK_BOT_TOKEN.")?;
        Ok((app, bot))
    }

    pub async fn save(&self) -> Result<()> {
        let toml_str = toml::to_string_pretty(self).context("Failed to serialize config")?;

        let parent_dir = self
            .config_path
            .parent()
            .context("Config path must have a parent directory")?;

        fs::create_dir_all(parent_dir).await.with_context(|| {
            format!(
                "Failed to create config directory: {}",
                parent_dir.display()
            )
        })?;

        let file_name = self
            .config_path
            .file_name()
            .and_then(|v| v.to_str())
            .unwrap_or(CONFIG_FILE_NAME);
        let temp_path = parent_dir.join(format!(".{file_name}.tmp-{}", uuid::Uuid::new_v4()));

        let mut temp_file = OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&temp_path)
            .await
            .with_context(|| {
                format!(
                    "Failed to create temporary config file: {}",
                    temp_path.display()
                )
            })?;
        temp_file
            .write_all(toml_str.as_bytes())
            .await
            .context("Failed to write temporary config contents")?;
        temp_file
            .sync_all()
            .await
            .context("Failed to fsync temporary config file")?;
        drop(temp_file);

        // Restrict before the rename so the final path is never world-readable.
        #[cfg(unix)]
        {
            use std::{fs::Permissions, os::unix::fs::PermissionsExt};
            fs::set_permissions(&temp_path, Permissions::from_mode(0o600))
                .await
                .context("Failed to restrict config file permissions")?;
        }

        if let Err(e) = fs::rename(&temp_path, &self.config_path).await {
            let _ = fs::remove_file(&temp_path).await;
            anyhow::bail!("Failed to atomically replace config file: {e}");
        }

        sync_directory(parent_dir).await
    }
}

/// JSON Schema for `config.toml`, printed by `deskhand config schema`.
pub fn schema_json() -> Result<String> {
    let schema = schemars::schema_for!(Config);
    serde_json::to_string_pretty(&schema).context("Failed to serialize config schema")
}

async fn sync_directory(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        let dir = File::open(path)
            .await
            .with_context(|| format!("Failed to open directory for fsync: {}", path.display()))?;
        dir.sync_all()
            .await
            .with_context(|| format!("Failed to fsync directory metadata: {}", path.display()))?;
        Ok(())
    }

    #[cfg(not(unix))]
    {
        let _ = path;
        Ok(())
    }
}
