mod extract;
mod metrics;
mod summary;
mod table;

use clap::{Parser, ValueEnum};
use metrics::TokenCounts;
use std::path::PathBuf;

/// Summarize llama-bench run logs: extract the embedded benchmark table
/// from each log, derive TTFT/TPOT/latency/throughput, and print one
/// summary table for the whole directory.
#[derive(Parser, Debug)]
#[command(name = "benchsum", version, about)]
struct Cli {
    /// Directory containing the run log files
    #[arg(long = "run_log_dir", default_value = "./run_logs")]
    run_log_dir: PathBuf,

    /// Output format for the summary table
    #[arg(long, value_enum, default_value_t = Format::Markdown)]
    format: Format,

    /// Extra logging (per-file parse decisions)
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Format {
    Markdown,
    Json,
}

fn run(cli: &Cli) -> Result<String, Box<dyn std::error::Error>> {
    let results = summary::generate_summary(&cli.run_log_dir, TokenCounts::default())?;
    let rendered = match cli.format {
        Format::Markdown => summary::render_markdown(&results),
        Format::Json => {
            let mut json = summary::render_json(&results)?;
            json.push('\n');
            json
        }
    };
    Ok(rendered)
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(false)
        .with_max_level(if cli.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::WARN
        })
        .init();

    match run(&cli) {
        Ok(rendered) => print!("{rendered}"),
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    }
}
