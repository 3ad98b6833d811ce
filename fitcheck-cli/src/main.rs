//! fitcheck-cli: terminal front end for the Fitcheck HTTP API
//!
//! # Subcommands
//! - `status`                                          : show server health
//! - `analyze <file> [-q <question>] [-o <path>] [--json]`: upload a spreadsheet
//!   and ask questions about it. Without `-q`, questions are read from stdin,
//!   one per line.

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use reqwest::blocking::{multipart, Client};
use serde::Deserialize;

const DEFAULT_SERVER: &str = "http://127.0.0.1:8780";
const DEFAULT_REPORT: &str = "suitability_report.pdf";

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(
    name = "fitcheck-cli",
    version,
    about = "Ask questions about job descriptions, resumes and interviews"
)]
struct Cli {
    /// Fitcheck HTTP server URL (overrides FITCHECK_HTTP_URL env var)
    #[arg(long, env = "FITCHECK_HTTP_URL", default_value = DEFAULT_SERVER)]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Upload a spreadsheet and ask questions about it
    Analyze {
        /// Spreadsheet with JD NAME, JD, RESUME, Q AND A and TAG columns
        file: PathBuf,

        /// Ask a single question instead of reading them from stdin
        #[arg(short, long)]
        question: Option<String>,

        /// Where to save the PDF report
        #[arg(short, long, default_value = DEFAULT_REPORT)]
        out: PathBuf,

        /// Print the raw JSON answer
        #[arg(long)]
        json: bool,
    },

    /// Show Fitcheck server status
    Status,
}

// ============================================================================
// API Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct SessionCreated {
    pub session_id: String,
}

#[derive(Debug, Deserialize)]
pub struct SourceMetadata {
    #[serde(rename = "Category")]
    pub category: String,
    #[serde(rename = "Acceptance")]
    pub acceptance: String,
}

#[derive(Debug, Deserialize)]
pub struct SourceHit {
    pub score: f64,
    pub metadata: SourceMetadata,
}

/// Body of a successful POST /sessions/:id/query
#[derive(Debug, Deserialize)]
pub struct QueryResponse {
    pub answer: String,
    #[serde(default)]
    pub thought_process: Vec<String>,
    #[serde(default = "default_true")]
    pub enough_context: bool,
    #[serde(default)]
    pub sources: Vec<SourceHit>,
    pub report_url: String,
    pub took_ms: Option<u64>,
}

fn default_true() -> bool {
    true
}

/// Error text from a `{"error", "status"}` body, or the raw body.
pub fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v["error"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

/// Human-readable rendering of an answer.
pub fn format_answer(resp: &QueryResponse, saved_to: &Path) -> String {
    let mut out = String::new();
    out.push_str(&resp.answer);
    out.push_str("\n\n");
    if !resp.enough_context {
        out.push_str("(The retrieved records may not be enough to answer fully.)\n\n");
    }
    if !resp.sources.is_empty() {
        out.push_str("Sources:\n");
        for hit in &resp.sources {
            out.push_str(&format!(
                "  {:>3.0}%  {} [{}]\n",
                hit.score * 100.0,
                hit.metadata.category,
                hit.metadata.acceptance
            ));
        }
    }
    out.push_str(&format!("Report saved to {}", saved_to.display()));
    out
}

// ============================================================================
// HTTP Client Calls
// ============================================================================

fn fail(msg: impl std::fmt::Display) -> ! {
    eprintln!("fitcheck-cli: {}", msg);
    std::process::exit(1);
}

fn create_session(client: &Client, server: &str) -> anyhow::Result<String> {
    let url = format!("{}/sessions", server);
    let resp = match client.post(&url).send() {
        Ok(r) => r,
        Err(e) => fail(format!("connection failed to {}: {}", url, e)),
    };
    if !resp.status().is_success() {
        let status = resp.status();
        fail(format!("server returned {}: {}", status, resp.text().unwrap_or_default()));
    }
    Ok(resp.json::<SessionCreated>()?.session_id)
}

fn upload(client: &Client, server: &str, session: &str, file: &Path) -> anyhow::Result<u64> {
    let form = multipart::Form::new().file("file", file)?;
    let url = format!("{}/sessions/{}/upload", server, session);
    let resp = client.post(&url).multipart(form).send()?;

    let status = resp.status();
    let body = resp.text().unwrap_or_default();
    if !status.is_success() {
        fail(format!("upload failed ({}): {}", status, error_message(&body)));
    }
    let json: serde_json::Value = serde_json::from_str(&body)?;
    Ok(json["state"]["records"].as_u64().unwrap_or(0))
}

/// Ask one question and save its report. Server-side refusals are printed, not returned.
fn ask(
    client: &Client,
    server: &str,
    session: &str,
    question: &str,
    out: &Path,
    json_output: bool,
) -> anyhow::Result<()> {
    let url = format!("{}/sessions/{}/query", server, session);
    let resp = client
        .post(&url)
        .json(&serde_json::json!({ "question": question }))
        .send()?;

    let status = resp.status();
    let body = resp.text().unwrap_or_default();
    if !status.is_success() {
        eprintln!("{}", error_message(&body));
        return Ok(());
    }

    let answer: QueryResponse = serde_json::from_str(&body)?;
    let pdf = client
        .get(format!("{}{}", server, answer.report_url))
        .send()?
        .error_for_status()?
        .bytes()?;
    std::fs::write(out, &pdf)?;

    if json_output {
        let value: serde_json::Value = serde_json::from_str(&body)?;
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        println!("{}", format_answer(&answer, out));
    }
    Ok(())
}

fn do_analyze(
    server: &str,
    file: &Path,
    question: Option<String>,
    out: &Path,
    json_output: bool,
) -> anyhow::Result<()> {
    let client = Client::builder().timeout(Duration::from_secs(300)).build()?;

    let session = create_session(&client, server)?;
    let records = upload(&client, server, &session, file)?;
    eprintln!("Data insertion complete ({} records).", records);

    let result = match question {
        Some(q) => ask(&client, server, &session, &q, out, json_output),
        None => ask_from_stdin(&client, server, &session, out, json_output),
    };

    // Also removes the server-side report directory.
    let _ = client
        .delete(format!("{}/sessions/{}", server, session))
        .send();

    result
}

fn ask_from_stdin(
    client: &Client,
    server: &str,
    session: &str,
    out: &Path,
    json_output: bool,
) -> anyhow::Result<()> {
    let stdin = std::io::stdin();
    eprint!("Question: ");
    std::io::stderr().flush()?;
    for line in stdin.lock().lines() {
        let line = line?;
        let question = line.trim();
        if !question.is_empty() {
            ask(client, server, session, question, out, json_output)?;
        }
        eprint!("Question: ");
        std::io::stderr().flush()?;
    }
    eprintln!();
    Ok(())
}

/// Show the server status by calling GET /health.
fn do_status(server: &str) -> anyhow::Result<()> {
    let client = Client::builder().timeout(Duration::from_secs(10)).build()?;

    let url = format!("{}/health", server);
    match client.get(&url).send() {
        Ok(r) if r.status().is_success() => {
            let body: serde_json::Value = r.json().unwrap_or_default();
            println!("Fitcheck server: {}", body["status"].as_str().unwrap_or("unknown"));
            println!("Version:         {}", body["version"].as_str().unwrap_or("?"));
            println!("Store:           {}", body["store"].as_str().unwrap_or("?"));
            println!("Detail:          {}", body["detail"].as_str().unwrap_or("?"));
        }
        Ok(r) => fail(format!("server unhealthy (HTTP {})", r.status())),
        Err(e) => fail(format!("cannot reach {}: {}", url, e)),
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
        Commands::Analyze {
            file,
            question,
            out,
            json,
        } => do_analyze(&server, &file, question, &out, json),
        Commands::Status => do_status(&server),
    };

    if let Err(e) = result {
        fail(e);
    }
}

// ============================================================================
// Tests
// ============================================================================
