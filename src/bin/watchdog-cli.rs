use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use pair_watchdog::health::summary::{check_all, parse_timeout};

#[derive(Parser)]
#[command(name = "watchdog-cli")]
#[command(about = "Status CLI for a pair-watchdog deployment", long_about = None)]
struct Cli {
    /// Per-request timeout in seconds
    #[arg(short, long, default_value = "2", value_parser = parse_timeout)]
    timeout: Duration,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Query one or more /health URLs
    Health {
        #[arg(required = true)]
        urls: Vec<String>,
    },
    /// Combined view of both watchdogs and the supervised service
    Pair {
        #[arg(long, default_value = "http://127.0.0.1:9050/health")]
        primary: String,
        #[arg(long, default_value = "http://127.0.0.1:9049/health")]
        secondary: String,
        #[arg(long, default_value = "http://127.0.0.1:9051/health")]
        service: String,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::builder().timeout(cli.timeout).build()?;

    let targets: Vec<(String, String)> = match cli.command {
        Commands::Health { urls } => urls.into_iter().map(|u| (u.clone(), u)).collect(),
        Commands::Pair {
            primary,
            secondary,
            service,
        } => vec![
            ("primary".to_string(), primary),
            ("secondary".to_string(), secondary),
            ("service".to_string(), service),
        ],
    };

    let summary = check_all(&client, targets).await;
    println!("{}", serde_json::to_string_pretty(&summary)?);

    Ok(ExitCode::from(summary.exit_status()))
}
