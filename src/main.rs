mod commands;

use std::path::PathBuf;

use anyhow::Result;
use calfeed_core::FeedConfig;
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "calfeed")]
#[command(about = "Build one subscribable calendar from stored topic events and published feeds")]
struct Cli {
    /// Config file (defaults to ~/.config/calfeed/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Synthesize a calendar and write it as ICS
    Render {
        /// Preference token to look up in --preferences
        #[arg(long, conflicts_with = "topics", requires = "preferences")]
        token: Option<String>,

        /// JSON file mapping tokens to stored preferences
        #[arg(long)]
        preferences: Option<PathBuf>,

        /// Preference list, e.g. 'chess,major:Music' or a JSON array
        #[arg(long)]
        topics: Option<String>,

        /// JSON file of event store rows
        #[arg(long)]
        events: Option<PathBuf>,

        /// Write the calendar here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Parse one feed (file path or URL) and print its events as JSON
    Parse {
        input: String,

        /// Source name to attribute events to (defaults to the file or host name)
        #[arg(short, long)]
        source: Option<String>,
    },
    /// List configured external sources
    Sources,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = FeedConfig::load(cli.config.as_deref())?;

    init_logging(&config.logging.level);
    tracing::debug!(
        store_timezone = %config.store_timezone,
        sources = config.sources.len(),
        "Loaded configuration"
    );

    match cli.command {
        Commands::Render {
            token,
            preferences,
            topics,
            events,
            output,
        } => {
            let args = commands::render::RenderArgs {
                token,
                preferences,
                topics,
                events,
                output,
            };
            commands::render::run(&config, args).await
        }
        Commands::Parse { input, source } => commands::parse::run(&config, &input, source).await,
        Commands::Sources => commands::sources::run(&config),
    }
}

/// Log to stderr so rendered calendars on stdout stay clean. RUST_LOG wins
/// over the configured level.
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();
}
