use anyhow::Result;
use colored::*;
use reqwest::StatusCode;
use std::time::{Duration, Instant};

use crate::api_client::{ApiClient, PublishRequest};
use crate::output::{print_event, TestResult};
use crate::sse_client::Connection;

const EVENT_TIMEOUT: Duration = Duration::from_secs(5);
const SUBSCRIBE_TIMEOUT: Duration = Duration::from_secs(5);

fn unique_id(scenario: &str) -> String {
    format!("{scenario}-{}", uuid::Uuid::new_v4())
}

/// Streams only receive what is published after they subscribe, so wait for
/// the server to count every connection before publishing.
async fn wait_for_subscribers(api_client: &ApiClient, expected: usize) -> Result<()> {
    let deadline = Instant::now() + SUBSCRIBE_TIMEOUT;

    loop {
        let stats = api_client.stats().await?;
        if stats.subscribers >= expected {
            return Ok(());
        }
        if Instant::now() >= deadline {
            anyhow::bail!(
                "Only {} of {} streams subscribed",
                stats.subscribers,
                expected
            );
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

pub async fn test_connection(
    api_client: &ApiClient,
    connections: &[Connection],
) -> Result<TestResult> {
    let start = Instant::now();

    println!("\n{}", "=== TEST: Connection ===".bright_cyan().bold());
    println!(
        "{} Waiting for {} streams to subscribe...",
        "→".blue(),
        connections.len()
    );

    match wait_for_subscribers(api_client, connections.len()).await {
        Ok(()) => {
            println!("{} All streams subscribed", "✓".green());
            Ok(TestResult::pass("connection_test", start.elapsed()))
        }
        Err(e) => {
            println!("{} {}", "✗".red(), e);
            Ok(TestResult::fail("connection_test", e.to_string(), start.elapsed()))
        }
    }
}

pub async fn test_fan_out(
    api_client: &ApiClient,
    connections: &mut [Connection],
) -> Result<TestResult> {
    let start = Instant::now();

    println!("\n{}", "=== TEST: Fan Out ===".bright_cyan().bold());
    wait_for_subscribers(api_client, connections.len()).await?;

    let id = unique_id("fan-out");
    println!("{} Publishing event {}...", "→".blue(), id);
    let status = api_client
        .publish(&PublishRequest {
            id: Some(id.clone()),
            event: Some("fan_out".to_string()),
            data: "hello from sse-test-client".to_string(),
        })
        .await?;
    if status != StatusCode::ACCEPTED {
        return Ok(TestResult::fail(
            "fan_out",
            format!("Publish returned {status}"),
            start.elapsed(),
        ));
    }

    for connection in connections.iter_mut() {
        match connection.wait_for_event(&id, EVENT_TIMEOUT).await {
            Ok(event) if event.event_type == "fan_out" => {
                print_event(&connection.label, &event);
            }
            Ok(event) => {
                return Ok(TestResult::fail(
                    "fan_out",
                    format!(
                        "{} got event type {:?}, expected \"fan_out\"",
                        connection.label, event.event_type
                    ),
                    start.elapsed(),
                ));
            }
            Err(e) => {
                println!("{} {}: {}", "✗".red(), connection.label, e);
                return Ok(TestResult::fail(
                    "fan_out",
                    format!("{}: {}", connection.label, e),
                    start.elapsed(),
                ));
            }
        }
    }

    println!("{} Every stream received the event", "✓".green());
    Ok(TestResult::pass("fan_out", start.elapsed()))
}

pub async fn test_multi_line(
    api_client: &ApiClient,
    connection: &mut Connection,
) -> Result<TestResult> {
    let start = Instant::now();
    let data = "first line\nsecond line\n\nfourth line";

    println!("\n{}", "=== TEST: Multi-line Data ===".bright_cyan().bold());
    wait_for_subscribers(api_client, 1).await?;

    let id = unique_id("multi-line");
    api_client
        .publish(&PublishRequest {
            id: Some(id.clone()),
            event: None,
            data: data.to_string(),
        })
        .await?;

    match connection.wait_for_event(&id, EVENT_TIMEOUT).await {
        Ok(event) if event.data == data => {
            print_event(&connection.label, &event);
            println!("{} Line structure preserved", "✓".green());
            Ok(TestResult::pass("multi_line", start.elapsed()))
        }
        Ok(event) => Ok(TestResult::fail(
            "multi_line",
            format!("Expected {:?}, got {:?}", data, event.data),
            start.elapsed(),
        )),
        Err(e) => Ok(TestResult::fail(
            "multi_line",
            e.to_string(),
            start.elapsed(),
        )),
    }
}

pub async fn test_invalid_field(api_client: &ApiClient) -> Result<TestResult> {
    let start = Instant::now();

    println!("\n{}", "=== TEST: Invalid Field ===".bright_cyan().bold());
    println!(
        "{} Publishing an event type containing a line break...",
        "→".blue()
    );

    let status = api_client
        .publish(&PublishRequest {
            id: None,
            event: Some("bad\nevent".to_string()),
            data: "never delivered".to_string(),
        })
        .await?;

    if status == StatusCode::UNPROCESSABLE_ENTITY {
        println!("{} Rejected with {}", "✓".green(), status);
        Ok(TestResult::pass("invalid_field", start.elapsed()))
    } else {
        Ok(TestResult::fail(
            "invalid_field",
            format!("Expected 422, got {status}"),
            start.elapsed(),
        ))
    }
}
