//! Server CLI definition and tracing setup.

use std::path::PathBuf;

use clap::Parser;

use docqa_shared::Mode;

/// DocQA — chat with a small set of web documents.
#[derive(Parser)]
#[command(
    name = "docqa-server",
    version,
    about = "HTTP service that answers questions against web documents via retrieval and an LLM.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Address to bind the HTTP server to (host:port). Overrides config.
    #[arg(long)]
    pub bind: Option<String>,

    /// Deployment mode: development or production. Overrides config.
    #[arg(long, value_parser = parse_mode)]
    pub mode: Option<Mode>,

    /// Path to a config file (defaults to ~/.docqa/docqa.toml).
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text")]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// clap value parser for the deployment mode flag.
fn parse_mode(s: &str) -> Result<Mode, String> {
    s.parse::<Mode>().map_err(|e| e.to_string())
}

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "docqa=info",
        1 => "docqa=debug",
        _ => "docqa=trace",
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}
