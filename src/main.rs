//! `branch-search`: run one discovery call from the command line.
//!
//! Startup sequence:
//!   1. Load .env (if present)
//!   2. Load config (`--config` or `config/default.toml`)
//!   3. Init logger at the configured level
//!   4. Build the client (HTTP, or canned replies with `--offline`)
//!   5. Run one command, print the result, exit
//!
//! ```text
//! branch-search [--config <path>] [--offline] <command>
//!
//! Commands:
//!   search <query>   search apps and content
//!   suggest <query>  autosuggest completions
//!   hint             query hints
//!   enabled [key]    check whether the service is enabled for a key
//! ```

use std::path::PathBuf;
use std::process;
use std::sync::mpsc;
use std::time::Duration;

use serde::Serialize;
use tracing::info;

use branch_search::config::{self, SearchConfig};
use branch_search::dispatch::ExecutionPool;
use branch_search::error::AppError;
use branch_search::logger;
use branch_search::parse::{QueryResult, SearchResult, ServiceEnabledResult};
use branch_search::payload::{DeviceInfo, QueryHintRequest, SearchRequest};
use branch_search::transport::http::HttpTransport;
use branch_search::transport::scripted::{ScriptedReply, ScriptedTransport};
use branch_search::transport::Transport;
use branch_search::{BranchSearch, CancelPolicy, ChannelDispatcher, SearchError};

const OFFLINE_KEY: &str = "key_live_offline";

struct Args {
    config: Option<PathBuf>,
    offline: bool,
    command: Option<String>,
    rest: Vec<String>,
}

fn parse_args() -> Args {
    let mut args = Args { config: None, offline: false, command: None, rest: Vec::new() };
    let mut iter = std::env::args().skip(1);

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" | "-c" => args.config = iter.next().map(PathBuf::from),
            "--offline" => args.offline = true,
            "--help" | "-h" => {
                print_help();
                process::exit(0);
            }
            "--" => {
                args.rest.extend(iter);
                break;
            }
            _ if args.command.is_none() => args.command = Some(arg),
            _ => args.rest.push(arg),
        }
    }
    args
}

fn print_help() {
    eprintln!("usage: branch-search [--config <path>] [--offline] <command>");
    eprintln!();
    eprintln!("commands:");
    eprintln!("  search <query>     search apps and content");
    eprintln!("  suggest <query>    autosuggest completions");
    eprintln!("  hint               query hints");
    eprintln!("  enabled [key]      check whether search is enabled for a key");
    eprintln!();
    eprintln!("flags:");
    eprintln!("  --config, -c <path>   config file (default: config/default.toml)");
    eprintln!("  --offline             answer from canned replies, no network");
    eprintln!("  --help,   -h          print this help");
}

fn main() {
    if let Err(e) = run() {
        eprintln!("error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), AppError> {
    // Load .env if present; the file is optional.
    let _ = dotenvy::dotenv();

    let args = parse_args();
    let Some(command) = args.command.clone() else {
        print_help();
        process::exit(2);
    };

    let mut config = match &args.config {
        Some(path) => config::load_path(path)?,
        None => config::load()?,
    };
    logger::init(config.log_level, true)?;

    let transport = if args.offline {
        if !config.has_valid_key() {
            config.branch_key = OFFLINE_KEY.to_string();
        }
        Transport::Scripted(offline_transport(&config))
    } else {
        Transport::Http(HttpTransport::new(config.dispatch.timeout)?)
    };
    info!(offline = args.offline, command = %command, "starting");

    let pool = ExecutionPool::new(&config.dispatch.pool_config())?;
    let dispatcher = ChannelDispatcher::new(transport, pool);
    // The main thread only waits, so inline cancellation is fine.
    let client = BranchSearch::with_dispatcher(config, DeviceInfo::detect(), dispatcher)?
        .with_cancel_policy(CancelPolicy::Synchronous);

    let wait = client.config().dispatch.timeout * 3;
    match command.as_str() {
        "search" => {
            let query = required_query(&args.rest, "search")?;
            let result: Result<SearchResult, SearchError> =
                wait_for(wait, |tx| client.query(&SearchRequest::new(query), tx))?;
            print_outcome(result)
        }
        "suggest" => {
            let query = required_query(&args.rest, "suggest")?;
            let result: Result<QueryResult, SearchError> =
                wait_for(wait, |tx| client.auto_suggest(&SearchRequest::new(query), tx))?;
            print_outcome(result)
        }
        "hint" => {
            let result: Result<QueryResult, SearchError> =
                wait_for(wait, |tx| client.query_hint(&QueryHintRequest::new(), tx))?;
            print_outcome(result)
        }
        "enabled" => {
            let key = args.rest.first().cloned().unwrap_or_else(|| client.config().branch_key.clone());
            let result: ServiceEnabledResult = wait_for(wait, |tx| client.is_service_enabled(&key, tx))?;
            print_json(&result)
        }
        other => Err(AppError::Config(format!(
            "unknown command: {other}\n  run 'branch-search --help' for usage"
        ))),
    }
}

fn required_query(rest: &[String], command: &str) -> Result<String, AppError> {
    if rest.is_empty() {
        return Err(AppError::Config(format!("usage: branch-search {command} <query>")));
    }
    Ok(rest.join(" "))
}

/// Start a callback-based call and block until it reports.
fn wait_for<T, S>(timeout: Duration, start: S) -> Result<T, AppError>
where
    T: Send + 'static,
    S: FnOnce(Box<dyn FnOnce(T) + Send>),
{
    let (tx, rx) = mpsc::channel();
    start(Box::new(move |value| {
        let _ = tx.send(value);
    }));
    rx.recv_timeout(timeout)
        .map_err(|e| AppError::Transport(format!("no answer within {timeout:?}: {e}")))
}

fn print_outcome<T: Serialize>(result: Result<T, SearchError>) -> Result<(), AppError> {
    match result {
        Ok(value) => print_json(&value),
        Err(e) => {
            println!("error  {}  {}", e.kind, e.message);
            Ok(())
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), AppError> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| AppError::Transport(format!("cannot render result: {e}")))?;
    println!("{text}");
    Ok(())
}

fn offline_transport(config: &SearchConfig) -> ScriptedTransport {
    let endpoints = &config.endpoints;
    let search = serde_json::json!({
        "success": true,
        "request_id": "offline",
        "results": [{
            "app_name": "Offline Maps",
            "app_store_id": "com.example.maps",
            "app_icon_url": "",
            "score": 1.0,
            "deep_links": [{"name": "Nearby coffee", "type": "place", "score": 0.9}]
        }]
    });
    ScriptedTransport::new()
        .route(&endpoints.search_url, ScriptedReply::json(200, search.to_string()))
        .route(&endpoints.autosuggest_url, ScriptedReply::json(200, r#"{"results":["coffee","coffee near me"]}"#))
        .route(&endpoints.queryhint_url, ScriptedReply::json(200, r#"{"results":["coffee","pizza","movies"]}"#))
        .route(&endpoints.configuration_url(&config.branch_key), ScriptedReply::json(200, "{}"))
}
