//! Browser trackpad bridge for LG webOS televisions.
//!
//! Run with: cargo run -p trackpad-bridge -- --config config.json
//!
//! Then open http://<host>:8080 on a phone.

use std::path::PathBuf;

use anyhow::Context as _;
use axum::{Json, Router, response::Html, routing::get};
use clap::Parser;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use trackpad_core::{BridgeConfig, GestureConfig};
use trackpad_session::RecordingSession;
use trackpad_transport::{RelayTimeouts, SessionFactory, create_ws_router};
use trackpad_webos::{WebOsClient, WebOsConfig};

const INDEX_HTML: &str = include_str!("../static/index.html");

#[derive(Parser)]
#[command(name = "trackpad-bridge", about = "Use a phone as a trackpad for an LG webOS TV")]
struct Args {
    /// JSON config file with `tv_ip` and `client_key`.
    #[arg(short, long, env = "TRACKPAD_CONFIG", default_value = "config.json")]
    config: PathBuf,

    /// Override the listening port from the config file.
    #[arg(short, long)]
    port: Option<u16>,

    /// Record commands instead of talking to the TV.
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    let mut config = BridgeConfig::load(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;
    if let Some(port) = args.port {
        config.port = port;
    }
    config.dry_run |= args.dry_run;

    if config.dry_run {
        tracing::warn!("Dry run: commands are recorded, nothing is sent to the TV");
        serve(&config, RecordingSession::new).await
    } else {
        let tv = WebOsConfig::from_bridge(&config);
        tracing::info!(tv = %tv.url(), "Using webOS TV");
        serve(&config, move || WebOsClient::new(tv.clone())).await
    }
}

async fn serve(config: &BridgeConfig, factory: impl SessionFactory) -> anyhow::Result<()> {
    let app = build_router(config, factory).layer(CorsLayer::permissive());

    let addr = config.listen_addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!("Server listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Server stopped");
    Ok(())
}

fn build_router(config: &BridgeConfig, factory: impl SessionFactory) -> Router {
    let gesture = config.gesture.clone();
    Router::new()
        .route("/", get(index_handler))
        .route("/gesture.json", get(move || gesture_handler(gesture.clone())))
        .merge(create_ws_router(factory, RelayTimeouts::from_config(config)))
        .layer(TraceLayer::new_for_http())
}

async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

/// Gesture tuning for the page's classifier.
async fn gesture_handler(gesture: GestureConfig) -> Json<GestureConfig> {
    Json(gesture)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}
