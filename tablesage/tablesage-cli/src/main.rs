//! TableSage CLI - ask a restaurant assistant about menus, dishes and ingredients.
//!
//! # Usage
//!
//! ```bash
//! # One question
//! tablesage ask "Which restaurants serve gluten-free pasta in Chicago?"
//!
//! # Full report as JSON
//! tablesage ask --format json "What is the history of ramen?"
//!
//! # Interactive session
//! tablesage chat
//!
//! # Inspect routing and configuration
//! tablesage routes
//! tablesage config show
//! tablesage config init ./tablesage.toml
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::process;
use tablesage_cli::{OutputFormat, commands, output};
use tablesage_core::AssistantConfig;

#[derive(Parser)]
#[command(name = "tablesage")]
#[command(about = "TableSage - restaurant and menu assistant", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true, env = "TABLESAGE_CONFIG_PATH")]
    config: Option<PathBuf>,

    /// Log output format (overrides the configuration file)
    #[arg(long, global = true)]
    log_format: Option<LogFormatArg>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormatArg {
    Pretty,
    Json,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputFormatArg {
    Human,
    Json,
}

impl From<OutputFormatArg> for OutputFormat {
    fn from(arg: OutputFormatArg) -> Self {
        match arg {
            OutputFormatArg::Human => OutputFormat::Human,
            OutputFormatArg::Json => OutputFormat::Json,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Ask a single question
    Ask {
        /// The question
        question: String,

        /// Output format
        #[arg(short, long, default_value = "human")]
        format: OutputFormatArg,
    },

    /// Start an interactive session (/history, /quit)
    Chat,

    /// Print the routing table
    Routes {
        /// Output format
        #[arg(short, long, default_value = "human")]
        format: OutputFormatArg,
    },

    /// Configuration management
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show the effective configuration with secrets masked
    Show {
        /// Output format
        #[arg(short, long, default_value = "human")]
        format: OutputFormatArg,
    },

    /// Write a default configuration file
    Init {
        /// Destination path
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        output::error(format!("{:#}", e));
        process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    // Writing a fresh file must not depend on the current one being valid.
    if let Commands::Config(ConfigCommands::Init { path, force }) = &cli.command {
        init_logging(cli.verbose, "info", cli.log_format.map_or("pretty", log_format_name));
        return commands::config_init(path, *force);
    }

    let config = AssistantConfig::load(cli.config.as_deref())?;
    let log_format = cli
        .log_format
        .map_or(config.general.log_format.as_str(), |arg| log_format_name(arg));
    init_logging(cli.verbose, &config.general.log_level, log_format);

    match cli.command {
        Commands::Ask { question, format } => {
            commands::ask(&config, &question, format.into()).await?;
        }
        Commands::Chat => {
            commands::chat(&config).await?;
        }
        Commands::Routes { format } => {
            commands::routes(&config, format.into())?;
        }
        Commands::Config(ConfigCommands::Show { format }) => {
            commands::config_show(&config, format.into())?;
        }
        Commands::Config(ConfigCommands::Init { .. }) => {}
    }

    Ok(())
}

fn log_format_name(arg: LogFormatArg) -> &'static str {
    match arg {
        LogFormatArg::Pretty => "pretty",
        LogFormatArg::Json => "json",
    }
}

fn init_logging(verbose: bool, level: &str, format: &str) {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    const CRATES: [&str; 4] = [
        "tablesage_core",
        "tablesage_backends",
        "tablesage_engine",
        "tablesage_cli",
    ];
    let directives = |level: &str| {
        let mut directives: Vec<String> = CRATES.iter().map(|c| format!("{c}={level}")).collect();
        directives.push("warn".to_string());
        directives.join(",")
    };

    let filter = if verbose {
        EnvFilter::new(directives("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directives(level)))
    };

    let registry = tracing_subscriber::registry().with(filter);
    if format == "json" {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}
