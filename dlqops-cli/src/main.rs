//! dlqops-cli: command line client for the dlqops HTTP API
//!
//! # Subcommands
//! - `summary [--max <n>] [--json]`   — run the DLQ summary pipeline
//! - `brackets <ids...> [--json]`     — first/last ERROR log per event id
//! - `count <queue>`                  — approximate depth of one DLQ
//! - `dlqs`                           — list configured DLQs
//! - `status`                         — show server health

use std::collections::BTreeMap;

use clap::{Parser, Subcommand};
use serde::Deserialize;

const DEFAULT_SERVER: &str = "http://127.0.0.1:3002";

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(
    name = "dlqops-cli",
    version,
    about = "DLQ summaries and error-log brackets from a dlqops server"
)]
struct Cli {
    /// dlqops HTTP server URL (overrides DLQOPS_HTTP_URL env var)
    #[arg(long, env = "DLQOPS_HTTP_URL", default_value = DEFAULT_SERVER)]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Summarize every configured DLQ (messages are not deleted)
    Summary {
        /// Messages to fetch per queue (server default when omitted)
        #[arg(long = "max")]
        max_messages: Option<usize>,

        /// Print the raw JSON response
        #[arg(long)]
        json: bool,
    },

    /// Resolve first and last ERROR logs for event ids
    Brackets {
        /// Event ids to look up
        #[arg(required = true)]
        event_ids: Vec<String>,

        /// Print the raw JSON response
        #[arg(long)]
        json: bool,
    },

    /// Show the approximate message count of a DLQ
    Count {
        queue: String,
    },

    /// List configured DLQs
    Dlqs,

    /// Show dlqops server status
    Status,
}

// ============================================================================
// API Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct LogDetails {
    pub message: Option<String>,
    #[serde(rename = "serviceName")]
    pub service_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Bracket {
    #[serde(rename = "firstErrorLogDetails")]
    pub first: LogDetails,
    #[serde(rename = "lastErrorLogDetails")]
    pub last: LogDetails,
}

#[derive(Debug, Deserialize)]
pub struct BracketsResponse {
    pub brackets: BTreeMap<String, Option<Bracket>>,
}

#[derive(Debug, Deserialize)]
pub struct QueueRunError {
    pub stage: String,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct QueueSummary {
    pub queue_name: String,
    pub approximate_count: u64,
    pub backups_written: usize,
    #[serde(default)]
    pub records: Vec<serde_json::Value>,
    pub artifact: Option<String>,
    pub error: Option<QueueRunError>,
}

#[derive(Debug, Deserialize)]
pub struct SummaryResponse {
    pub summaries: Vec<QueueSummary>,
    pub took_ms: Option<u64>,
}

// ============================================================================
// Output Formatting
// ============================================================================

/// One line per queue: name, depth, records, artifact or failure.
pub fn format_summary_line(s: &QueueSummary) -> String {
    match &s.error {
        Some(e) => format!(
            "✗ {:<32} depth {:>5}  failed at {}: {}",
            s.queue_name, s.approximate_count, e.stage, e.message
        ),
        None => format!(
            "✓ {:<32} depth {:>5}  {} records, {} backups  {}",
            s.queue_name,
            s.approximate_count,
            s.records.len(),
            s.backups_written,
            s.artifact.as_deref().unwrap_or("-")
        ),
    }
}

pub fn format_bracket_line(event_id: &str, bracket: Option<&Bracket>) -> String {
    let describe = |d: &LogDetails| {
        format!(
            "[{}] {}",
            d.service_name.as_deref().unwrap_or("?"),
            d.message.as_deref().unwrap_or("")
        )
    };
    match bracket {
        None => format!("{}: no error logs", event_id),
        Some(b) => format!(
            "{}:\n  first {}\n  last  {}",
            event_id,
            describe(&b.first),
            describe(&b.last)
        ),
    }
}

// ============================================================================
// HTTP Client Calls
// ============================================================================

fn client(timeout_secs: u64) -> anyhow::Result<reqwest::blocking::Client> {
    Ok(reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()?)
}

/// Send a request and return the JSON body, exiting on transport or HTTP errors.
fn fetch(req: reqwest::blocking::RequestBuilder, url: &str) -> serde_json::Value {
    let resp = match req.send() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("dlqops-cli: connection failed to {}: {}", url, e);
            std::process::exit(1);
        }
    };

    let status = resp.status();
    let body: serde_json::Value = resp.json().unwrap_or_default();
    if !status.is_success() {
        eprintln!(
            "dlqops-cli: server returned {}: {}",
            status,
            body["error"].as_str().unwrap_or("unknown error")
        );
        std::process::exit(1);
    }
    body
}

fn print_json(body: &serde_json::Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(body)?);
    Ok(())
}

fn do_summary(server: &str, max_messages: Option<usize>, json_output: bool) -> anyhow::Result<()> {
    // Draining and log lookups can take a while on large queues
    let client = client(600)?;
    let url = format!("{}/summary", server);
    let body = fetch(
        client
            .post(&url)
            .json(&serde_json::json!({ "max_messages": max_messages })),
        &url,
    );

    if json_output {
        return print_json(&body);
    }

    let resp: SummaryResponse = serde_json::from_value(body)?;
    if resp.summaries.is_empty() {
        println!("All DLQs are empty.");
        return Ok(());
    }
    for s in &resp.summaries {
        println!("{}", format_summary_line(s));
    }
    if let Some(ms) = resp.took_ms {
        println!("\nFinished in {} ms", ms);
    }
    Ok(())
}

fn do_brackets(server: &str, event_ids: Vec<String>, json_output: bool) -> anyhow::Result<()> {
    let client = client(120)?;
    let url = format!("{}/brackets", server);
    let body = fetch(
        client
            .post(&url)
            .json(&serde_json::json!({ "event_ids": event_ids })),
        &url,
    );

    if json_output {
        return print_json(&body);
    }

    let resp: BracketsResponse = serde_json::from_value(body)?;
    for (event_id, bracket) in &resp.brackets {
        println!("{}", format_bracket_line(event_id, bracket.as_ref()));
    }
    Ok(())
}

fn do_count(server: &str, queue: &str) -> anyhow::Result<()> {
    let client = client(30)?;
    let url = format!("{}/dlqs/{}/count", server, queue);
    let body = fetch(client.get(&url), &url);
    println!(
        "{}: {}",
        queue,
        body["approximate_count"].as_u64().unwrap_or_default()
    );
    Ok(())
}

fn do_dlqs(server: &str) -> anyhow::Result<()> {
    let client = client(10)?;
    let url = format!("{}/dlqs", server);
    let body = fetch(client.get(&url), &url);
    for name in body["dlqs"].as_array().into_iter().flatten() {
        println!("{}", name.as_str().unwrap_or_default());
    }
    Ok(())
}

/// Show the server status by calling GET /health.
fn do_status(server: &str) -> anyhow::Result<()> {
    let client = client(10)?;
    let url = format!("{}/health", server);

    match client.get(&url).send() {
        Ok(r) if r.status().is_success() => {
            let body: serde_json::Value = r.json().unwrap_or_default();
            println!("dlqops server: {}", body["status"].as_str().unwrap_or("unknown"));
            println!("Version:       {}", body["version"].as_str().unwrap_or("?"));
            println!("Environment:   {}", body["environment"].as_str().unwrap_or("?"));
            println!("DLQs:          {}", body["dlqs"].as_u64().unwrap_or_default());
            println!("Search:        {}", body["search_backend"].as_str().unwrap_or("?"));
            println!("Orders:        {}", body["order_store"].as_str().unwrap_or("?"));
            println!("Socket:        {}", body["socket"].as_str().unwrap_or("?"));
        }
        Ok(r) => {
            eprintln!("dlqops-cli: server unhealthy (HTTP {})", r.status());
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("dlqops-cli: cannot reach {}: {}", url, e);
            std::process::exit(1);
        }
    }

    Ok(())
}

// ============================================================================
// Main
// ============================================================================

fn main() {
    let cli = Cli::parse();
    let server = cli.server.trim_end_matches('/').to_string();

    let result = match cli.command {
        Commands::Summary { max_messages, json } => do_summary(&server, max_messages, json),
        Commands::Brackets { event_ids, json } => do_brackets(&server, event_ids, json),
        Commands::Count { queue } => do_count(&server, &queue),
        Commands::Dlqs => do_dlqs(&server),
        Commands::Status => do_status(&server),
    };

    if let Err(e) = result {
        eprintln!("dlqops-cli: {}", e);
        std::process::exit(1);
    }
}

// ============================================================================
// Tests
// ============================================================================
