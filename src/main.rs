#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::doc_markdown,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::needless_pass_by_value,
    clippy::too_many_lines,
    clippy::uninlined_format_args,
    clippy::unnecessary_wraps
)]

use anyhow::{bail, Result};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use deskhand::channels::cli::{run_interactive, run_once, DEFAULT_USER_ID};
use deskhand::channels::slack::{SlackApi, SlackListener};
use deskhand::config::{Config, ModelConfig};
use deskhand::security::describe_credential;
use deskhand::tools::{default_registry, describe_registry, DocumentStore};
use deskhand::{providers, HybridDispatcher};
use std::io::Write;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CompletionShell {
    #[value(name = "bash")]
    Bash,
    #[value(name = "fish")]
    Fish,
    #[value(name = "zsh")]
    Zsh,
    #[value(name = "powershell")]
    PowerShell,
    #[value(name = "elvish")]
    Elvish,
}

/// `Deskhand` - tech-support assistant that routes each message to a tool or to conversation.
#[derive(Parser, Debug)]
#[command(name = "deskhand")]
#[command(version)]
#[command(about = "Tech-support assistant with validated tool calls.", long_about = None)]
struct Cli {
    /// Directory holding config.toml (default: ~/.deskhand)
    #[arg(long, global = true)]
    config_dir: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Chat in the terminal
    #[command(long_about = "\
Chat with the assistant in the terminal.

Each line is classified as a tool request or conversation. Tool \
requests are validated before anything runs; missing details are \
asked for and filled from your next message. Type 'exit' to quit.

Examples:
  deskhand chat                                   # interactive session
  deskhand chat -u alice                          # skip the user-id prompt
  deskhand chat -m \"reset the password for jdoe\"  # single message")]
    Chat {
        /// Single message mode (don't enter interactive mode)
        #[arg(short, long)]
        message: Option<String>,

        /// User id whose session the messages belong to
        #[arg(short, long)]
        user: Option<String>,
    },

    /// Listen for Slack messages over Socket Mode
    #[command(long_about = "\
Listen for Slack messages over Socket Mode.

Needs an app-level token (SLACK_APP_TOKEN) and a bot token \
(SLACK_BOT_TOKEN). Every Slack user gets an independent session; \
replies are posted to the channel the message came from.")]
    Slack,

    /// List the tools the assistant can run
    Tools,

    /// Show configuration and credential status
    Status,

    /// Manage configuration
    #[command(long_about = "\
Manage Deskhand configuration.

Use 'schema' to dump the JSON Schema for config.toml, which documents \
every available key, type, and default value.

Examples:
  deskhand config schema              # print JSON Schema to stdout
  deskhand config schema > schema.json")]
    Config {
        #[command(subcommand)]
        config_command: ConfigCommands,
    },

    /// Generate shell completion script to stdout
    #[command(long_about = "\
Generate shell completion scripts for `deskhand`.

The script is printed to stdout so it can be sourced directly:

Examples:
  source <(deskhand completions bash)
  deskhand completions zsh > ~/.zfunc/_deskhand
  deskhand completions fish > ~/.config/fish/completions/deskhand.fish")]
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Dump the full configuration JSON Schema to stdout
    Schema,
}

fn build_dispatcher(config: &Config) -> Result<HybridDispatcher> {
    config.require_model_credentials()?;
    HybridDispatcher::from_config(config, Arc::new(DocumentStore::new()))
}

fn print_model_status(label: &str, model: &ModelConfig) {
    println!("{label}");
    println!("   Provider:      {}", model.provider);
    println!("   Model:         {}", model.model);
    println!("   Temperature:   {}", model.temperature);
    println!(
        "   API key:       {}",
        describe_credential(model.resolved_api_key().as_deref())
    );
    if let Some(url) = &model.api_url {
        println!("   Base URL:      {url}");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Install default crypto provider for Rustls TLS.
    if let Err(e) = rustls::crypto::ring::default_provider().install_default() {
        eprintln!("Warning: Failed to install default crypto provider: {e:?}");
    }

    let cli = Cli::parse();

    if let Some(config_dir) = &cli.config_dir {
        if config_dir.trim().is_empty() {
            bail!("--config-dir cannot be empty");
        }
    }

    // Completions must remain stdout-only and should not load config or initialize logging.
    if let Commands::Completions { shell } = &cli.command {
        let mut stdout = std::io::stdout().lock();
        write_shell_completion(*shell, &mut stdout)?;
        return Ok(());
    }

    // A missing .env is normal.
    let _ = dotenvy::dotenv();

    // Initialize logging - respects RUST_LOG env var, defaults to INFO
    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let config = Config::load_or_init(cli.config_dir.as_deref()).await?;

    match cli.command {
        Commands::Completions { .. } => unreachable!(),

        Commands::Chat { message, user } => {
            let dispatcher = build_dispatcher(&config)?;
            match message {
                Some(message) => {
                    let user_id = user.as_deref().unwrap_or(DEFAULT_USER_ID);
                    println!("{}", run_once(&dispatcher, user_id, &message).await);
                    Ok(())
                }
                None => {
                    let stdin = std::io::stdin();
                    run_interactive(&dispatcher, user.as_deref(), stdin.lock(), std::io::stdout())
                        .await
                }
            }
        }

        Commands::Slack => {
            let (app_token, bot_token) = config.require_slack_tokens()?;
            let dispatcher = build_dispatcher(&config)?;
            info!("Starting Slack Socket Mode listener");
            let api = Arc::new(SlackApi::new(app_token, bot_token));
            let listener = SlackListener::new(api, Arc::new(dispatcher));
            tokio::select! {
                result = listener.run() => result,
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutting down Slack listener");
                    Ok(())
                }
            }
        }

        Commands::Tools => {
            let registry = default_registry(&config.tools, Arc::new(DocumentStore::new()))?;
            print!("{}", describe_registry(&registry));
            Ok(())
        }

        Commands::Status => {
            println!("Deskhand Status");
            println!();
            println!("Version:     {}", env!("CARGO_PKG_VERSION"));
            println!("Config:      {}", config.config_path.display());
            println!();
            print_model_status("🔎 Classifier", &config.classifier);
            print_model_status("💬 Responder", &config.responder);
            println!();

            let trip = &config.tools.cancel_trip;
            println!("🧳 Trip cancellation");
            println!("   Endpoint:      {}", trip.endpoint);
            println!("   Timeout:       {}s", trip.timeout_secs);
            println!("   API key:       {}", describe_credential(trip.api_key.as_deref()));
            println!(
                "   Default usr:   {}",
                trip.default_user_id
                    .map_or_else(|| "(ask user)".to_string(), |id| id.to_string())
            );
            println!(
                "   Auth token:    {}",
                trip.auth_token
                    .as_deref()
                    .map_or_else(|| "(ask user)".to_string(), |t| describe_credential(Some(t)))
            );
            println!();

            println!("Channels:");
            println!("  CLI:      ✅ always");
            let slack_ready = config.require_slack_tokens().is_ok();
            println!(
                "  Slack:    {}",
                if slack_ready { "✅ tokens set" } else { "❌ tokens missing" }
            );
            println!();

            println!("Providers:");
            for p in providers::list_providers() {
                println!("  {:<12} {:<12} default model {}", p.name, p.display_name, p.default_model);
            }
            println!("  custom:<URL>              Any OpenAI-compatible endpoint");
            Ok(())
        }

        Commands::Config { config_command } => match config_command {
            ConfigCommands::Schema => {
                println!("{}", deskhand::config::schema_json()?);
                Ok(())
            }
        },
    }
}

fn write_shell_completion<W: Write>(shell: CompletionShell, writer: &mut W) -> Result<()> {
    use clap_complete::generate;
    use clap_complete::shells;

    let mut cmd = Cli::command();
    let bin_name = cmd.get_name().to_string();

    match shell {
        CompletionShell::Bash => generate(shells::Bash, &mut cmd, bin_name.clone(), writer),
        CompletionShell::Fish => generate(shells::Fish, &mut cmd, bin_name.clone(), writer),
        CompletionShell::Zsh => generate(shells::Zsh, &mut cmd, bin_name.clone(), writer),
        CompletionShell::PowerShell => {
            generate(shells::PowerShell, &mut cmd, bin_name.clone(), writer);
        }
        CompletionShell::Elvish => generate(shells::Elvish, &mut cmd, bin_name, writer),
    }

    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::{CommandFactory, Parser};

    #[test]
    fn cli_definition_has_no_flag_conflicts() {
        Cli::command().debug_assert();
    }

    #[test]
    fn chat_accepts_message_and_user() {
        let cli = Cli::try_parse_from(["deskhand", "chat", "-m", "hi", "-u", "alice"])
            .expect("chat invocation should parse");
        match cli.command {
            Commands::Chat { message, user } => {
                assert_eq!(message.as_deref(), Some("hi"));
                assert_eq!(user.as_deref(), Some("alice"));
            }
            other => panic!("expected chat command, got {other:?}"),
        }
    }

    #[test]
    fn config_dir_is_global() {
        let cli = Cli::try_parse_from(["deskhand", "status", "--config-dir", "/tmp/dh"])
            .expect("global flag should parse after subcommand");
        assert_eq!(cli.config_dir.as_deref(), Some("/tmp/dh"));
        assert!(matches!(cli.command, Commands::Status));
    }

    #[test]
    fn config_schema_subcommand_parses() {
        let cli = Cli::try_parse_from(["deskhand", "config", "schema"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Config {
                config_command: ConfigCommands::Schema
            }
        ));
    }

    #[test]
    fn completions_cli_parses_supported_shells() {
        for shell in ["bash", "fish", "zsh", "powershell", "elvish"] {
            let cli = Cli::try_parse_from(["deskhand", "completions", shell])
                .expect("completions invocation should parse");
            match cli.command {
                Commands::Completions { .. } => {}
                other => panic!("expected completions command, got {other:?}"),
            }
        }
    }

    #[test]
    fn completion_generation_mentions_binary_name() {
        let mut output = Vec::new();
        write_shell_completion(CompletionShell::Bash, &mut output)
            .expect("completion generation should succeed");
        let script = String::from_utf8(output).expect("completion output should be valid utf-8");
        assert!(
            script.contains("deskhand"),
            "completion script should reference binary name"
        );
    }
}
