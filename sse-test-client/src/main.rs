use anyhow::Result;
use clap::Parser;
use colored::*;

mod api_client;
mod output;
mod scenarios;
mod sse_client;

use api_client::ApiClient;
use output::print_test_summary;
use sse_client::Connection;

#[derive(Parser)]
#[command(name = "sse-test-client")]
#[command(about = "SSE Hub Integration Testing Tool")]
struct Cli {
    /// Base URL of the hub (e.g., http://localhost:4000)
    #[arg(long, default_value = "http://127.0.0.1:4000")]
    base_url: String,

    /// Number of concurrent streams to open
    #[arg(long, default_value_t = 3, value_parser = clap::value_parser!(u16).range(1..))]
    clients: u16,

    /// Test scenario to run
    #[arg(long, value_enum, default_value_t = ScenarioChoice::All)]
    scenario: ScenarioChoice,

    /// Enable verbose output
    #[arg(long, short)]
    verbose: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, PartialEq, Eq)]
enum ScenarioChoice {
    /// Open the streams and check the hub counts them
    ConnectionTest,
    /// Publish one event and check every stream receives it
    FanOut,
    /// Publish multi-line data and check its lines survive the wire format
    MultiLine,
    /// Publish an event type with a line break and check it is rejected
    InvalidField,
    /// Run every scenario
    All,
}

impl ScenarioChoice {
    fn includes(self, scenario: ScenarioChoice) -> bool {
        self == ScenarioChoice::All || self == scenario
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Debug)
            .init();
    }

    println!("{}", "=== SETUP PHASE ===".bright_white().bold());

    let api_client = ApiClient::new(reqwest::Client::new(), cli.base_url.clone());

    println!("{} Checking hub health...", "→".blue());
    api_client.health().await?;
    println!("{} Hub is healthy", "✓".green());

    println!("\n{} Establishing {} SSE connections...", "→".blue(), cli.clients);
    let mut connections = (1..=cli.clients)
        .map(|n| Connection::establish(&api_client.stream_url(), format!("Client {n}")))
        .collect::<Result<Vec<_>>>()?;
    println!("{} {} SSE connections opened", "✓".green(), connections.len());

    println!("\n{}", "=== TEST PHASE ===".bright_white().bold());

    let mut results = Vec::new();

    if cli.scenario.includes(ScenarioChoice::ConnectionTest) {
        results.push(scenarios::test_connection(&api_client, &connections).await?);
    }
    if cli.scenario.includes(ScenarioChoice::FanOut) {
        results.push(scenarios::test_fan_out(&api_client, &mut connections).await?);
    }
    if cli.scenario.includes(ScenarioChoice::MultiLine) {
        results.push(scenarios::test_multi_line(&api_client, &mut connections[0]).await?);
    }
    if cli.scenario.includes(ScenarioChoice::InvalidField) {
        results.push(scenarios::test_invalid_field(&api_client).await?);
    }

    if cli.verbose {
        let stats = api_client.stats().await?;
        println!(
            "\n{} Hub stats: {} subscribers, {} published, {} dropped{}",
            "→".blue(),
            stats.subscribers,
            stats.published,
            stats.dropped,
            if stats.closed { " (closed)" } else { "" }
        );
    }

    // Print summary
    println!("\n{}", "=== RESULTS ===".bright_white().bold());
    print_test_summary(&results);

    let all_passed = results.iter().all(|r| r.passed);

    if all_passed {
        println!("\n{}", "All tests passed! ✓".bright_green().bold());
    } else {
        println!("\n{}", "Some tests failed! ✗".bright_red().bold());
    }

    std::process::exit(if all_passed { 0 } else { 1 });
}
