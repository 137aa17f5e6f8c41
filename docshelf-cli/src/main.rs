//! docshelf - offline documentation sets from the command line

use anyhow::Result;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use docshelf_core::Config;

mod docset_cli;

/// Log levels
#[derive(Debug, Clone, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_filter_directive(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

#[derive(Parser, Debug)]
#[clap(
    name = "docshelf",
    about = "Install, update and search offline documentation sets",
    version
)]
struct Cli {
    #[clap(subcommand)]
    command: docset_cli::Command,

    /// Emit trace-level core logs as JSON
    #[clap(long, global = true)]
    trace: bool,

    /// Set log level
    #[clap(long, default_value = "warn", global = true)]
    log_level: LogLevel,

    /// Override the settings file path
    #[clap(long, global = true)]
    config: Option<PathBuf>,

    /// Override the docset storage directory
    #[clap(long, global = true)]
    storage: Option<PathBuf>,

    /// Feed to use: a configured feed name or a URL
    #[clap(long, global = true)]
    feed: Option<String>,

    /// Use fuzzy matching when searching
    #[clap(long, global = true)]
    fuzzy: bool,

    /// Maximum number of search results
    #[clap(long, global = true)]
    limit: Option<usize>,
}

/// Initialize tracing with CLI flags
///
/// Logs always go to stderr so command output on stdout stays parseable.
fn initialize_tracing(log_level: &LogLevel, trace: bool) {
    let mut filter = EnvFilter::new(log_level.to_filter_directive());

    if trace {
        if let Ok(directive) = "docshelf_core=trace".parse() {
            filter = filter.add_directive(directive);
        }

        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .with_writer(std::io::stderr)
            .init();

        tracing::info!("docshelf tracing enabled");
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    initialize_tracing(&cli.log_level, cli.trace);

    let config = match cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };

    let mut settings = config.settings().clone();
    if let Some(storage) = cli.storage {
        settings.storage_root = storage;
    }
    if cli.fuzzy {
        settings.fuzzy_search = true;
    }
    if let Some(limit) = cli.limit {
        settings.search_limit = limit;
    }

    let ctx = docset_cli::Context {
        config,
        settings,
        feed: cli.feed,
    };
    cli.command.execute(ctx).await
}
