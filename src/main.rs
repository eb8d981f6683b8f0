use castor::config::{Config, DEFAULT_CONFIG_FILE};
use castor::paging::{BodyMarkerPaging, HeaderPaging};
use castor::{
    CastorError, ContinuationToken, HistoryRecorder, IsRetryable, LocationMode, LogicalRequest,
    PipelineBuilder, PipelineResponse,
};
use clap::{Parser, Subcommand, ValueEnum};
use mimalloc::MiMalloc;
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// sysexits EX_TEMPFAIL: the operation may succeed if re-run later.
const EXIT_TEMPFAIL: u8 = 75;

#[derive(Debug, Parser)]
#[command(name = "castor", version, about = "Replica-aware storage request pipeline")]
struct Cli {
    /// Configuration file; `CASTOR_*` environment variables override it.
    #[arg(long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Location mode for this invocation, e.g. `secondary-then-primary`.
    #[arg(long, global = true)]
    mode: Option<LocationMode>,

    /// Print every attempt, including the failed ones.
    #[arg(long, global = true)]
    history: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Read a single resource.
    Get {
        path: String,
        /// Extra query parameters as `key=value`.
        #[arg(long = "query", value_parser = parse_pair)]
        query: Vec<(String, String)>,
    },
    /// Page through a listing, following continuation tokens.
    List {
        path: String,
        #[arg(long = "query", value_parser = parse_pair)]
        query: Vec<(String, String)>,
        #[arg(long, value_enum, default_value_t = Paging::NextMarker)]
        paging: Paging,
        /// Stop after this many pages.
        #[arg(long, default_value_t = 10)]
        max_pages: usize,
        /// Resume from a token printed by a previous run.
        #[arg(long)]
        token: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Paging {
    /// `<NextMarker>` in the body, replayed as `marker=`.
    NextMarker,
    /// `x-ms-continuation-NextTableName`.
    Tables,
    /// `x-ms-continuation-NextPartitionKey` / `NextRowKey`.
    Entities,
}

fn parse_pair(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected key=value, got {raw:?}"))
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let cfg = match Config::load_from(&cli.config) {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("castor: {}", CastorError::from(err));
            return ExitCode::FAILURE;
        }
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cfg.basic.loglevel.clone()));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_level(true)
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Signal received, cancelling the running operation.");
        on_signal.cancel();
    });

    match run(cli, &cfg, &cancel).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("castor: {err}");
            if err.is_retryable() {
                ExitCode::from(EXIT_TEMPFAIL)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

async fn run(cli: Cli, cfg: &Config, cancel: &CancellationToken) -> Result<(), CastorError> {
    let history = HistoryRecorder::new();
    let mut builder = PipelineBuilder::from_config(cfg)?;
    if cli.history {
        builder = builder.observer(history.clone());
    }
    let pipeline = builder.build()?;

    match cli.command {
        Command::Get { path, query } => {
            let request = query
                .into_iter()
                .fold(LogicalRequest::read(path), |req, (k, v)| req.with_query(k, v));
            let response = pipeline
                .execute_with_cancel(&request, cli.mode, None, cancel)
                .await;
            print_history(&history);
            let response = response?;
            print_page(1, &response);
            println!("{}", String::from_utf8_lossy(&response.body));
        }
        Command::List {
            path,
            query,
            paging,
            max_pages,
            token,
        } => {
            let request = query.into_iter().fold(
                match paging {
                    Paging::NextMarker => LogicalRequest::list(path, BodyMarkerPaging::next_marker()),
                    Paging::Tables => LogicalRequest::list(path, HeaderPaging::tables()),
                    Paging::Entities => LogicalRequest::list(path, HeaderPaging::entities()),
                },
                |req, (k, v)| req.with_query(k, v),
            );

            let mut token = match token {
                Some(raw) => ContinuationToken::decode_optional(&raw)?,
                None => None,
            };

            for page in 1..=max_pages {
                let response = pipeline
                    .execute_with_cancel(&request, cli.mode, token.as_ref(), cancel)
                    .await;
                print_history(&history);
                history.clear();
                let response = response?;
                print_page(page, &response);

                token = response.continuation;
                if token.is_none() {
                    break;
                }
            }

            if let Some(token) = token {
                warn!(max_pages, "Stopped before the listing completed");
                println!("next token: {token}");
            }
        }
    }

    Ok(())
}

fn print_page(page: usize, response: &PipelineResponse) {
    println!(
        "page {page}: status={} location={} attempts={} bytes={} more={}",
        response.status,
        response.location,
        response.attempts,
        response.body.len(),
        response.continuation.is_some()
    );
}

fn print_history(history: &HistoryRecorder) {
    for record in history.history() {
        let outcome = match record.outcome().failure() {
            Some(failure) => failure.to_string(),
            None => "ok".to_string(),
        };
        println!(
            "  #{} {} {} {} ({:?}) {}",
            record.sequence(),
            record.location(),
            record.request().method,
            record.request().url,
            record.elapsed(),
            outcome
        );
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        _ = terminate => {},
    }
}
