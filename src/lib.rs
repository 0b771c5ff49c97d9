//! soc2-ledger: a local-first SOC 2 compliance ledger.
//!
//! Compliance state lives in a plain directory tree of markdown documents with
//! YAML headers: controls, policies, evidence, gap reports, readiness checks,
//! asset inventory and an AI agent registry. Live infrastructure signals come
//! from provider CLIs run through a single process layer and are folded into
//! control-keyed findings.
//!
//! # Layout
//!
//! ```text
//! <root>/
//!   controls/      TSC-to-control mapping documents
//!   policies/
//!   evidence/      artifacts plus manifest.md (the evidence ledger)
//!   gaps/          gap-analysis-YYYY-MM-DD.md
//!   assessments/   readiness-check-YYYY-MM-DD.md
//!   inventory/
//!   config/        process.toml (optional)
//!   agents/        agent registry entries
//! ```
//!
//! # Usage
//!
//! ```bash
//! # One request per line in, one pretty-printed response out
//! echo '{"op":"get_compliance_dashboard"}' | soc2-ledger rpc
//!
//! # Single call without stdin
//! soc2-ledger rpc --op list_controls --params '{"criteria":"CC6"}'
//!
//! soc2-ledger capabilities
//! ```
//!
//! `COMPLIANCE_ROOT` selects the root (default `./compliance`);
//! `COMPLIANCE_LOG` sets the tracing filter. Logs go to stderr.
//!
//! # Crate Structure
//!
//! - [`core`]: document codec and store, control parser, process layer,
//!   evidence/assessment/agent operations, and the tool-call boundary.

pub mod core;

use crate::core::config::{ComplianceConfig, LOG_ENV};
use crate::core::error::ComplianceError;
use crate::core::process::CliRunner;
use crate::core::rpc::{self, ToolContext, ToolError, ToolRequest};
use crate::core::store::DocumentStore;
use clap::{Parser, Subcommand};
use serde_json::Value as JsonValue;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[clap(
    name = "soc2-ledger",
    version = env!("CARGO_PKG_VERSION"),
    about = "Local-first SOC 2 compliance ledger"
)]
struct Cli {
    /// Compliance root (overrides COMPLIANCE_ROOT).
    #[clap(long, global = true)]
    root: Option<PathBuf>,
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve tool calls: JSON requests on stdin, JSON responses on stdout.
    Rpc {
        /// Run one operation instead of reading stdin.
        #[clap(long)]
        op: Option<String>,
        /// JSON params for `--op`.
        #[clap(long, requires = "op")]
        params: Option<String>,
    },
    /// List every operation and its parameters.
    Capabilities,
    /// Print the version.
    Version,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn build_context(root: Option<PathBuf>) -> Result<ToolContext, ComplianceError> {
    let config = match root {
        Some(root) => ComplianceConfig::with_root(root),
        None => ComplianceConfig::from_env()?,
    }
    .load_process_config()?;
    info!(root = %config.root.display(), "compliance root resolved");
    Ok(ToolContext::new(
        DocumentStore::from_config(&config),
        CliRunner::new(config.process),
    ))
}

/// Turn one input line into a request; malformed lines become an error
/// response rather than ending the session.
pub fn parse_request_line(line: &str) -> Result<ToolRequest, rpc::ToolResponse> {
    serde_json::from_str::<ToolRequest>(line).map_err(|e| {
        rpc::error_response(
            rpc::default_request_id(),
            String::new(),
            &JsonValue::Null,
            ToolError {
                code: "parse_error".to_string(),
                message: format!("invalid request: {}", e),
            },
        )
    })
}

async fn serve_stdio(ctx: &ToolContext) -> Result<(), ComplianceError> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = match parse_request_line(&line) {
            Ok(request) => ctx.handle(request).await,
            Err(response) => response,
        };
        let mut out = serde_json::to_string_pretty(&response)?;
        out.push('\n');
        stdout.write_all(out.as_bytes()).await?;
        stdout.flush().await?;
    }
    Ok(())
}

pub async fn run() -> Result<(), ComplianceError> {
    let cli = Cli::parse();
    init_tracing();

    match cli.command {
        Command::Version => {
            println!("v{}", env!("CARGO_PKG_VERSION"));
        }
        Command::Capabilities => {
            println!("{}", serde_json::to_string_pretty(&rpc::capabilities())?);
        }
        Command::Rpc { op: Some(op), params } => {
            let ctx = build_context(cli.root)?;
            let params = match params {
                Some(raw) => serde_json::from_str(&raw)?,
                None => JsonValue::Null,
            };
            let response = ctx
                .handle(ToolRequest {
                    op,
                    params,
                    id: rpc::default_request_id(),
                })
                .await;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Command::Rpc { op: None, .. } => {
            let ctx = build_context(cli.root)?;
            serve_stdio(&ctx).await?;
        }
    }
    Ok(())
}
