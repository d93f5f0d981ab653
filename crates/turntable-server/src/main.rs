use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::{Query, State};
use axum::http::header::SET_COOKIE;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use turntable_server::broker::ConnectionBroker;
use turntable_server::collab::NullProvider;
use turntable_server::session::SessionRegistry;
use turntable_server::store::StateStore;
use turntable_server::{ws, AppContext};

#[derive(Parser, Debug)]
#[command(name = "turntable-server")]
struct Args {
    #[arg(long, default_value = "")]
    addr: String,
    /// Attach the GPIO board (motor, hinge, encoder, scan button).
    #[arg(long, default_value_t = false)]
    gpio: bool,
    #[arg(long, default_value = "")]
    capture_dir: String,
    #[arg(long, default_value_t = false)]
    debug: bool,
}

#[derive(Clone, Debug)]
struct Config {
    addr: String,
    gpio: bool,
    capture_dir: PathBuf,
    debug: bool,
}

fn load_config() -> Config {
    let args = Args::parse();
    let addr = if args.addr.is_empty() {
        std::env::var("TURNTABLE_ADDR").unwrap_or_else(|_| "127.0.0.1:8491".to_string())
    } else {
        args.addr
    };
    let capture_dir = if args.capture_dir.is_empty() {
        std::env::var("TURNTABLE_CAPTURE_DIR").unwrap_or_else(|_| "/tmp/turntable".to_string())
    } else {
        args.capture_dir
    };
    Config {
        addr,
        gpio: args.gpio || env_true("TURNTABLE_GPIO"),
        capture_dir: PathBuf::from(capture_dir),
        debug: args.debug || env_true("TURNTABLE_DEBUG"),
    }
}

fn env_true(name: &str) -> bool {
    std::env::var(name)
        .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

fn init_logging(config: &Config) {
    let default_level = if config.debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config();
    init_logging(&config);
    info!(event = "startup", addr = %config.addr, gpio = config.gpio);

    if config.gpio {
        anyhow::bail!(
            "--gpio needs a board backend, and this binary links none; \
             build a site binary that wires its Board implementation in \
             via turntable_server::dispatch::attach_board"
        );
    }

    let broker = Arc::new(ConnectionBroker::new());
    let store = StateStore::new("none".into(), broker.clone(), None);
    let ctx = Arc::new(AppContext {
        registry: SessionRegistry::new(),
        store,
        broker,
        provider: Arc::new(NullProvider),
        classifier: None,
        camera: None,
        motor: None,
        capture_dir: config.capture_dir.clone(),
    });

    let app = Router::new()
        .route("/ws", get(ws::ws_handler))
        .route("/session", post(create_session))
        .route("/health", get(|| async { "ok" }))
        .with_state(ctx);

    let listener = tokio::net::TcpListener::bind(&config.addr)
        .await
        .with_context(|| format!("binding {}", config.addr))?;
    info!(event = "listening", addr = %config.addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!(event = "shutdown");
        })
        .await
        .context("server error")?;
    Ok(())
}

/// Mint a session and hand its id back both as the body and as the
/// cookie the websocket handshake will present.
async fn create_session(
    Query(params): Query<HashMap<String, String>>,
    State(ctx): State<Arc<AppContext>>,
) -> impl IntoResponse {
    let is_host = params
        .get("host")
        .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    let id = ctx.registry.mint(is_host);
    info!(event = "session_created", session_id = %id, is_host);
    (
        [(SET_COOKIE, format!("sessionID={id}; Path=/"))],
        id,
    )
}
