//! Backend of a lucky draw voucher campaign.
//!
//! A customer registers with name and phone, gets a 6 character code, redeems it for a single
//! spin and the voucher they win is written back to the campaign's Google Sheet.
//!
//!
//!
//! # Flow
//!
//! - `POST /api/register` issues the code, one row per phone
//! - `POST /api/redeem` checks the code still has its spin, consumes nothing
//! - `POST /api/log-voucher` records the amount the client drew, spin count drops to 0
//! - `POST /api/spin` draws on the server instead and records it the same way
//! - `GET /api/sheet-data` read-only proxy to the sheet with the public API key
//! - `GET /api/health`
//!
//! Anything else falls through to `STATIC_DIR` when it is set.
//!
//!
//!
//! # Notes
//!
//! ## Sheet as Database
//! There is no transaction support in the values API. Spends are serialized inside this process
//! (read, check, write under one lock), which is enough for a single instance. Running several
//! instances against one sheet brings back the double spend window.
//!
//! ## Outages
//! Registration keeps working while the sheet is down, codes are held in the fallback cache and
//! appended once the sheet answers again. Spends always need the sheet.
//!
//!
//!
//! # Setup
//!
//! Share the sheet with the service account as editor, then:
//! ```sh
//! export SHEET_ID=...
//! export GOOGLE_SERVICE_ACCOUNT_EMAIL=...
//! export GOOGLE_SERVICE_ACCOUNT_KEY="$(cat key.pem)"
//! RUST_LOG=info cargo run --bin lucky-draw
//! ```
//!
//! View docs.
//! ```sh
//! cargo doc --open
//! ```
use std::{sync::Arc, time::Duration};

use axum::{
    Router,
    http::{Method, header::CONTENT_TYPE},
    routing::{get, post},
};

use sheets::RowStore;
use signal::ctrl_c;
#[cfg(unix)]
use signal::unix::{SignalKind, signal};
use tokio::{net::TcpListener, signal};
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};

pub mod cache;
pub mod campaign;
pub mod config;
pub mod draw;
pub mod error;
pub mod routes;
pub mod state;
pub mod utils;

use config::Config;
use routes::{
    health_handler, log_voucher_handler, redeem_handler, register_handler, sheet_data_handler,
    spin_handler,
};
use state::State;

pub async fn start_server() -> anyhow::Result<()> {
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Loading config...");
    let config = Config::load()?;

    info!("Initializing state...");
    let state = State::new(config)?;

    info!("Starting server...");
    let address = format!("0.0.0.0:{}", state.config.port);
    let app = router(state);

    info!("Binding to {address}");
    let listener = TcpListener::bind(&address).await?;
    info!("Server running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shut down");
    Ok(())
}

pub fn router<S: RowStore>(state: Arc<State<S>>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(60 * 60));

    let api = Router::new()
        .route("/api/register", post(register_handler::<S>))
        .route("/api/redeem", post(redeem_handler::<S>))
        .route("/api/log-voucher", post(log_voucher_handler::<S>))
        .route("/api/spin", post(spin_handler::<S>))
        .route("/api/sheet-data", get(sheet_data_handler::<S>))
        .route("/api/health", get(health_handler));

    let app = match &state.config.static_dir {
        Some(dir) => {
            info!("Serving static files from {}", dir.display());
            api.fallback_service(ServeDir::new(dir))
        }
        None => api,
    };

    app.layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(e) => {
                error!("Failed to install Ctrl+C handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                terminate.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                error!("Failed to install signal handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
