// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
//! Stdio entry point: reads one JSON request per line from stdin, dispatches
//! it through [`rwm_protocol::Engine`], and writes one JSON response per
//! line to stdout.

use std::path::PathBuf;

use clap::Parser;
use rwm_core::ModelFamily;
use rwm_protocol::{Engine, Request};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::EnvFilter;

/// Exit code for fatal initialization failure (DB open, artifact dir creation).
const EXIT_INIT_ERROR: i32 = 1;

/// Default bundle token budget when neither `--bundleTokens` nor
/// `RWM_BUNDLE_TOKENS` is set.
const DEFAULT_BUNDLE_TOKENS: u32 = 4500;

#[derive(Parser, Debug)]
#[command(name = "rwm", version, about = "Resumable working memory engine for terminal coding agents")]
struct Cli {
    /// Path to the structured store. Defaults to `<root>/rwm.db`.
    #[arg(long)]
    db: Option<PathBuf>,

    /// Workspace root the session and artifact paths are resolved against.
    #[arg(long, default_value = ".")]
    root: PathBuf,

    /// Path to the content-addressed artifact pool. Defaults to `<root>/rwm_artifacts`.
    #[arg(long)]
    artifacts: Option<PathBuf>,

    /// Default bundle token budget for `memory_resume` when the request omits one.
    #[arg(long = "bundleTokens")]
    bundle_tokens: Option<u32>,

    /// Default model family for token estimation.
    #[arg(long = "modelFamily", default_value = "generic")]
    model_family: String,

    /// Enable debug logging.
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    let filter = if cli.debug {
        EnvFilter::new("rwm=debug")
    } else {
        EnvFilter::new("rwm=info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let root = match cli.root.canonicalize() {
        Ok(root) => root,
        Err(e) => {
            eprintln!("error: cannot resolve workspace root {}: {e}", cli.root.display());
            return std::process::ExitCode::from(EXIT_INIT_ERROR as u8);
        }
    };
    let db_path = cli.db.unwrap_or_else(|| root.join("rwm.db"));
    let pool_dir = cli.artifacts.unwrap_or_else(|| root.join("rwm_artifacts"));
    let default_budget = cli
        .bundle_tokens
        .or_else(|| std::env::var("RWM_BUNDLE_TOKENS").ok().and_then(|v| v.parse().ok()))
        .unwrap_or(DEFAULT_BUNDLE_TOKENS);
    let default_family: ModelFamily = match cli.model_family.parse() {
        Ok(f) => f,
        Err(e) => {
            eprintln!("error: {e}");
            return std::process::ExitCode::from(EXIT_INIT_ERROR as u8);
        }
    };

    let mut engine = match Engine::open(&root, db_path, pool_dir, default_budget, default_family) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("error: failed to initialize engine: {e}");
            return std::process::ExitCode::from(EXIT_INIT_ERROR as u8);
        }
    };

    run_stdio_loop(&mut engine).await;
    std::process::ExitCode::SUCCESS
}

/// Reads one JSON request per line from stdin and writes one JSON response
/// per line to stdout, until stdin closes. One request is processed to
/// completion before the next line is read — no concurrent handling.
async fn run_stdio_loop(engine: &mut Engine) {
    let stdin = tokio::io::stdin();
    let mut stdout = tokio::io::stdout();
    let mut reader = BufReader::new(stdin).lines();

    loop {
        let line = match reader.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(target: "rwm.cli", error = %e, "error reading stdin line");
                break;
            }
        };
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<Request>(trimmed) {
            Ok(request) => engine.dispatch(request),
            Err(e) => rwm_protocol::Response::from_error(&rwm_error::RwmError::validation(format!(
                "malformed request: {e}"
            ))),
        };

        let encoded = match serde_json::to_string(&response) {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(target: "rwm.cli", error = %e, "failed to encode response");
                continue;
            }
        };
        if stdout.write_all(encoded.as_bytes()).await.is_err() {
            break;
        }
        if stdout.write_all(b"\n").await.is_err() {
            break;
        }
        if stdout.flush().await.is_err() {
            break;
        }
    }
}
