use std::{env, fs::OpenOptions, net::SocketAddr, path::PathBuf, sync::Arc};

use axum::{
    Router,
    extract::{MatchedPath, Request},
    middleware,
};
use axum_server::Handle;
use clap::Parser;
use rusqlite::Connection;
use time::Duration;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{EnvFilter, filter, layer::SubscriberExt, util::SubscriberInitExt, Layer};

use home_ledger::{AppConfig, AppState, build_router, graceful_shutdown, logging_middleware};

/// The REST API server for HomeLedger.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// File path to the application SQLite database.
    #[arg(long)]
    db_path: String,

    /// The port to serve the API from.
    #[arg(short, long, default_value_t = 3000)]
    port: u16,

    /// Directory that uploaded avatars are written to and served from.
    #[arg(long, default_value = "uploads")]
    upload_dir: PathBuf,

    /// How many minutes access tokens stay valid for.
    #[arg(long, default_value_t = 30)]
    token_minutes: i64,

    /// Treat members who have never had a balance as having 0.00, so they
    /// cannot pay until they have been credited.
    #[arg(long)]
    strict_first_debit: bool,

    /// Only change the status when tasks are completed or rewards approved,
    /// without posting to the ledger.
    #[arg(long)]
    no_workflow_events: bool,
}

#[tokio::main]
async fn main() {
    setup_logging();

    let args = Args::parse();

    let addr = SocketAddr::from(([127, 0, 0, 1], args.port));

    let secret = env::var("SECRET").expect("The environment variable 'SECRET' must be set");

    let mut config = AppConfig::new(&secret);
    config.token_duration = Duration::minutes(args.token_minutes);
    config.upload_dir = args.upload_dir;
    config.ledger_policy.allow_unchecked_first_debit = !args.strict_first_debit;
    config.ledger_policy.post_workflow_events = !args.no_workflow_events;
    tracing::debug!("Starting with {config:?}");

    std::fs::create_dir_all(config.upload_dir.join("avatars"))
        .expect("Could not create the upload directory");

    let conn = Connection::open(&args.db_path).expect("Could not open the database");
    let state = AppState::new(conn, config).expect("Could not initialize the database");

    let handle = Handle::new();
    tokio::spawn(graceful_shutdown(handle.clone()));

    let router = add_tracing_layer(
        build_router(state).layer(middleware::from_fn(logging_middleware)),
    );

    tracing::info!("HTTP server listening on {}", addr);
    axum_server::bind(addr)
        .handle(handle)
        .serve(router.into_make_service())
        .await
        .expect("The server stopped unexpectedly");
}

fn setup_logging() {
    let stdout_log = tracing_subscriber::fmt::layer().pretty();

    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open("debug.log")
        .expect("Could not create log file");

    let debug_log = tracing_subscriber::fmt::layer()
        .pretty()
        .with_writer(Arc::new(log_file));

    tracing_subscriber::registry()
        .with(
            stdout_log
                .with_filter(filter::LevelFilter::INFO)
                .and_then(debug_log)
                .with_filter(
                    EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| EnvFilter::new("debug")),
                ),
        )
        .init();
}

fn add_tracing_layer(router: Router) -> Router {
    let tracing_layer = TraceLayer::new_for_http()
        .make_span_with(|req: &Request| {
            let method = req.method();
            let uri = req.uri();

            let matched_path = req
                .extensions()
                .get::<MatchedPath>()
                .map(|matched_path| matched_path.as_str());

            tracing::debug_span!("request", %method, %uri, matched_path)
        })
        // Errors are logged where they are turned into responses.
        .on_failure(());

    router.layer(tracing_layer)
}
