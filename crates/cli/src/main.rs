//! chatrelay CLI: the main entry point.
//!
//! Commands:
//! - `serve`     Start the HTTP gateway (`POST /api/chat`, `GET /health`)
//! - `chat`      Interactive or single-message chat with the demo tools
//! - `models`    List configured adapters and their models
//! - `summarize` Summarize a file or stdin
//! - `embed`     Create embeddings for some text
//! - `config`    Show, validate, or initialize configuration

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "chatrelay",
    about = "chatrelay: streaming chat orchestration with tool calling",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway server
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Chat with a model; tools get_weather and get_time are available
    Chat {
        /// Send a single message instead of entering interactive mode
        #[arg(short, long)]
        message: Option<String>,

        /// Adapter to use instead of the configured default
        #[arg(long)]
        provider: Option<String>,

        /// Model to use instead of the configured default
        #[arg(long)]
        model: Option<String>,

        /// Print raw SSE frames instead of rendered text
        #[arg(long)]
        raw: bool,
    },

    /// List configured adapters and their models
    Models,

    /// Summarize a file, or stdin when no file is given
    Summarize {
        file: Option<std::path::PathBuf>,

        /// bullet-points, paragraph, or concise
        #[arg(short, long, default_value = "paragraph")]
        style: String,

        /// Upper bound on summary tokens
        #[arg(long)]
        max_length: Option<u32>,

        /// Topics to focus on (repeatable)
        #[arg(long)]
        focus: Vec<String>,

        #[arg(long)]
        provider: Option<String>,

        #[arg(long)]
        model: Option<String>,
    },

    /// Create embeddings for each argument
    Embed {
        #[arg(required = true)]
        input: Vec<String>,

        #[arg(long, default_value = "openai")]
        provider: String,

        #[arg(long, default_value = "text-embedding-3-small")]
        model: String,

        #[arg(long)]
        dimensions: Option<u32>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration (keys redacted)
    Show,
    /// Load and validate the configuration
    Validate,
    /// Write a starter config file if none exists
    Init,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Serve { port } => commands::serve::run(port).await?,
        Commands::Chat {
            message,
            provider,
            model,
            raw,
        } => commands::chat::run(message, provider, model, raw).await?,
        Commands::Models => commands::models::run().await?,
        Commands::Summarize {
            file,
            style,
            max_length,
            focus,
            provider,
            model,
        } => {
            commands::summarize::run(commands::summarize::Args {
                file,
                style,
                max_length,
                focus,
                provider,
                model,
            })
            .await?
        }
        Commands::Embed {
            input,
            provider,
            model,
            dimensions,
        } => commands::embed::run(input, provider, model, dimensions).await?,
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_cmd::show().await?,
            ConfigAction::Validate => commands::config_cmd::validate().await?,
            ConfigAction::Init => commands::config_cmd::init().await?,
        },
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_chat_flags() {
        let cli = Cli::try_parse_from([
            "chatrelay", "chat", "-m", "hello", "--model", "gpt-4o", "--raw", "-v",
        ])
        .unwrap();
        assert!(cli.verbose);
        match cli.command {
            Commands::Chat {
                message,
                model,
                raw,
                ..
            } => {
                assert_eq!(message.as_deref(), Some("hello"));
                assert_eq!(model.as_deref(), Some("gpt-4o"));
                assert!(raw);
            }
            _ => panic!("expected chat"),
        }
    }

    #[test]
    fn parses_serve_port() {
        let cli = Cli::try_parse_from(["chatrelay", "serve", "--port", "9000"]).unwrap();
        assert!(matches!(cli.command, Commands::Serve { port: Some(9000) }));
    }

    #[test]
    fn embed_requires_input() {
        assert!(Cli::try_parse_from(["chatrelay", "embed"]).is_err());
    }

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
