//! Palisade - prompt firewall for LLM gateways.
//!
//! Runs the HTTP API server over an explicitly wired pipeline:
//! classifier, policy engine, sanitizer, and audit ledger.

use std::fs;
use std::path::PathBuf;

use clap::Parser;
use directories::ProjectDirs;
use tracing::{info, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use palisade_core::classifier::{
    LexicalClassifier, RemoteClassifier, RemoteConfig, ThreatClassifier,
};
use palisade_core::policy::PolicyEngine;
use palisade_ledger::AuditLedger;
use palisade_server::{AppState, Server, ServerConfig};

/// Palisade - prompt firewall for LLM gateways
#[derive(Parser, Debug)]
#[command(name = "palisade", version, about)]
struct Args {
    /// Host to bind the API server to
    #[arg(long, default_value = palisade_server::DEFAULT_HOST)]
    host: String,

    /// Port to bind the API server to
    #[arg(long, default_value_t = palisade_server::DEFAULT_PORT)]
    port: u16,

    /// Path to a JSON policy document; built-in defaults are used when
    /// omitted or when the document fails validation
    #[arg(long)]
    policy: Option<PathBuf>,

    /// Directory for audit ledger files (defaults to the app data dir)
    #[arg(long)]
    ledger_dir: Option<PathBuf>,

    /// Keep the audit ledger in memory only
    #[arg(long)]
    memory_ledger: bool,

    /// Endpoint of an external scoring service; lexical classification
    /// is used when omitted or unreachable
    #[arg(long)]
    remote_classifier: Option<String>,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// Get the application data directory.
fn data_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "palisade", "Palisade").map(|dirs| dirs.data_dir().to_path_buf())
}

/// Initialize logging with daily file rotation plus console output.
fn init_logging(args: &Args) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let log_level = if args.debug { "debug" } else { &args.log_level };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("palisade={},warn", log_level)));

    if let Some(log_dir) = data_dir().map(|dir| dir.join("logs")) {
        if fs::create_dir_all(&log_dir).is_ok() {
            let file_appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .max_log_files(5)
                .filename_prefix("palisade")
                .filename_suffix("log")
                .build(&log_dir)
                .ok();

            if let Some(appender) = file_appender {
                let (non_blocking, guard) = tracing_appender::non_blocking(appender);

                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().with_writer(std::io::stdout))
                    .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
                    .init();

                tracing::info!("logging to {:?}", log_dir);
                return Some(guard);
            }
        }
    }

    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    tracing::warn!("file logging unavailable, using console only");
    None
}

/// Build the classifier strategy selected by the arguments.
fn build_classifier(args: &Args) -> Box<dyn ThreatClassifier> {
    if let Some(endpoint) = &args.remote_classifier {
        match RemoteClassifier::try_new(RemoteConfig::new(endpoint.clone())) {
            Some(remote) => {
                info!(endpoint = %endpoint, "remote classifier configured with lexical fallback");
                return Box::new(remote);
            }
            None => {
                warn!(endpoint = %endpoint, "remote classifier unusable, using lexical strategy");
            }
        }
    }

    Box::new(LexicalClassifier::new())
}

/// Build the policy engine, loading a document when one was given.
fn build_policy(args: &Args) -> PolicyEngine {
    let mut engine = PolicyEngine::new();

    if let Some(path) = &args.policy {
        let loaded = fs::read_to_string(path)
            .map_err(|err| err.to_string())
            .and_then(|document| {
                engine
                    .load_str(&document)
                    .map_err(|err| err.to_string())
            });

        match loaded {
            Ok(count) => info!(count, path = %path.display(), "policy rules loaded"),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "policy load failed, keeping default rules");
            }
        }
    }

    engine
}

/// Build the audit ledger. Falls back to memory when the directory is
/// unusable rather than refusing to start.
fn build_ledger(args: &Args) -> AuditLedger {
    if args.memory_ledger {
        info!("audit ledger kept in memory");
        return AuditLedger::in_memory();
    }

    let dir = args
        .ledger_dir
        .clone()
        .or_else(|| data_dir().map(|d| d.join("ledger")));

    if let Some(dir) = dir {
        match AuditLedger::jsonl(&dir) {
            Ok(ledger) => return ledger,
            Err(err) => {
                warn!(dir = %dir.display(), error = %err, "ledger directory unusable, keeping records in memory");
            }
        }
    } else {
        warn!("no data directory available, keeping audit records in memory");
    }

    AuditLedger::in_memory()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let _guard = init_logging(&args);

    let classifier = build_classifier(&args);
    let engine = build_policy(&args);
    let ledger = build_ledger(&args);

    let state = AppState::with_components(classifier, engine, ledger);
    info!(
        classifier = state.firewall.classifier_name(),
        "firewall initialized"
    );

    let config = ServerConfig::new(args.host.clone(), args.port);
    let server = Server::with_state(config, state)?;

    server.run().await?;
    Ok(())
}
