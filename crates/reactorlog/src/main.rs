mod commands;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use commands::{CombineArgs, CompareArgs, CrossCompareArgs, ProcessArgs, ReportsCommand};
use reactorlog::{server, AppState};
use reactorlog_core::{ProcessingConfig, ReportStore};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Reactor log processing CLI and report server", long_about = None)]
struct Cli {
    /// TOML file overriding log schemas, alignment window and plot channels
    #[arg(long, global = true, env = "REACTORLOG_CONFIG")]
    config: Option<PathBuf>,

    /// Folder holding one sub-folder per report
    #[arg(long, global = true, env = "REACTORLOG_REPORTS_DIR", default_value = "reports")]
    reports_dir: PathBuf,

    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Parse, segment and align one LV/GC log pair and write a report
    Process(ProcessArgs),
    /// Inspect and manage stored reports
    Reports {
        #[command(subcommand)]
        command: ReportsCommand,
    },
    /// Plot selected stages of a report against relative time
    Compare(CompareArgs),
    /// Concatenate selected stages of a report into one CSV
    Combine(CombineArgs),
    /// Merge stored stage comparisons and stages of a report into one figure
    CrossCompare(CrossCompareArgs),
    /// Start the HTTP API server
    Serve {
        #[arg(long, env = "REACTORLOG_BIND", default_value = "0.0.0.0:3000")]
        bind: SocketAddr,
    },
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let config = ProcessingConfig::load_or_default(cli.config.as_deref()).with_context(|| {
        match &cli.config {
            Some(path) => format!("failed to load config {}", path.display()),
            None => "invalid default config".to_string(),
        }
    })?;
    let store = ReportStore::new(&cli.reports_dir);

    match cli.command {
        Command::Process(args) => commands::process(&store, &config, args),
        Command::Reports { command } => commands::reports(&store, command),
        Command::Compare(args) => commands::compare(&store, &config, args),
        Command::Combine(args) => commands::combine(&store, &config, args),
        Command::CrossCompare(args) => commands::cross_compare(&store, &config, args),
        Command::Serve { bind } => {
            std::fs::create_dir_all(&cli.reports_dir).with_context(|| {
                format!("failed to create {}", cli.reports_dir.display())
            })?;
            info!("Starting reactorlog API server");
            server::serve(bind, Arc::new(AppState::new(store, config))).await
        }
    }
}
