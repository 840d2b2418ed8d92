use clap::Parser;
use deepseek_chat_export::config::{self, ExportConfig};
use deepseek_chat_export::export;
use eyre::Result;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Export DeepSeek chat history to a JSON file.
/// Unchanged sessions from a previous export are reused.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// JSON file to write the export to. An existing file is read first
    /// and used to skip unchanged sessions.
    /// Defaults to chat_data.json if not set in config.
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,
}

fn run(cli: Cli) -> Result<()> {
    // 1. Load config file (missing file means defaults)
    let file_cfg = config::load_file_config(config::default_config_path().as_deref())?;

    // 2. Resolve settings (CLI > Config > Default)
    let config = ExportConfig::resolve(cli.output, file_cfg);

    // 3. Run the export
    export::execute(&config)
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Failures are reported, not signalled through the exit status.
    if let Err(e) = run(cli) {
        println!("An error occurred: {e:#}");
    }
}
