//! `kindred` -- a voice companion in the terminal.
//!
//! # Examples
//!
//! ```text
//! kindred chat
//! kindred talk --voice console-es
//! kindred profile show
//! kindred --config ./kindred.json config show
//! ```

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "kindred",
    about = "kindred -- an empathetic voice companion that remembers you",
    version
)]
struct Cli {
    /// Enable verbose (debug-level) logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file path (overrides auto-discovery).
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Text conversation: type a message, read the reply.
    Chat,

    /// Voice conversation over the terminal recognizer and synthesizer.
    Talk {
        /// Synthesizer voice id (see `/voices` inside the session).
        #[arg(long)]
        voice: Option<String>,
    },

    /// Inspect or reset what kindred remembers about you.
    Profile {
        #[command(subcommand)]
        action: ProfileCmd,
    },

    /// Inspect the resolved configuration.
    Config {
        #[command(subcommand)]
        action: ConfigCmd,
    },
}

#[derive(Subcommand)]
enum ProfileCmd {
    /// Print the remembered facts as a table.
    Show,

    /// Forget every remembered fact.
    Clear,
}

#[derive(Subcommand)]
enum ConfigCmd {
    /// Print the resolved configuration as JSON.
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let platform = std::sync::Arc::new(kindred_platform::NativePlatform::new());
    let cfg = commands::load_config(&*platform, cli.config.as_deref()).await?;

    match cli.command {
        Commands::Chat => commands::chat::run(platform, cfg).await?,
        Commands::Talk { voice } => commands::talk::run(platform, cfg, voice).await?,
        Commands::Profile { action } => match action {
            ProfileCmd::Show => commands::profile::profile_show(platform, &cfg).await,
            ProfileCmd::Clear => commands::profile::profile_clear(platform, &cfg).await?,
        },
        Commands::Config { action } => match action {
            ConfigCmd::Show => commands::config_cmd::config_show(&cfg),
        },
    }

    Ok(())
}
