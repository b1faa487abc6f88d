//! Documentation of the ProfileForge backend: profiles, a points game and account administration.
//!
//!
//!
//! # General Infrastructure
//! - Frontend talks to this server over JSON, every call carries a Supabase access token
//! - Server resolves the token against Supabase, it never issues sessions itself
//! - Profiles and game history live in Postgres, migrations are embedded in the binary
//! - Administrators are ordinary users whose profile has the `ADMIN` role
//!
//!
//!
//! # Routes
//!
//! | Method | Path | Caller |
//! |--------|------|--------|
//! | `POST` | `/api/game/play` | user |
//! | `GET` | `/api/game/history` | user |
//! | `GET` `POST` `PUT` | `/api/profile` | user |
//! | `GET` `POST` | `/api/admin/users` | admin |
//! | `PUT` `DELETE` | `/api/admin/users/{id}` | admin |
//! | `GET` | `/api/admin/users/{id}/history` | admin |
//!
//! Errors are `{ "error": "..." }` with 400, 401, 403, 404, 409, 500 or 502.
//!
//!
//!
//! # Number Game
//!
//! See [`game`]. The balance update and its history row commit together or not at all, and
//! concurrent rounds for one user are serialized by a row lock, see [`database`].
//!
//!
//!
//! # Setup
//!
//! Run against Postgres and Supabase.
//! ```sh
//! DATABASE_URL=postgres://... SUPABASE_URL=https://xyz.supabase.co \
//! SUPABASE_ANON_KEY=... SUPABASE_SERVICE_ROLE_KEY=... \
//! RUST_LOG=info cargo run --bin profileforge
//! ```
//!
//! Run without any external service, authenticate with `Bearer dev-admin`.
//! ```sh
//! RUST_LOG=info cargo run --bin profileforge -- --memory
//! ```
//!
//! Promote the first administrator.
//! ```sh
//! cargo run --bin forge-admin -- promote someone@example.com
//! ```
//!
//! View current docs.
//! ```sh
//! cargo doc --open
//! ```
use std::{sync::Arc, time::Duration};

use axum::{
    Router,
    http::{
        HeaderValue, Method,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    routing::{get, post, put},
};

use signal::{
    ctrl_c,
    unix::{SignalKind, signal},
};
use tokio::{net::TcpListener, signal};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

pub mod auth;
pub mod config;
pub mod database;
pub mod error;
pub mod game;
pub mod identity;
pub mod memory;
pub mod models;
pub mod payloads;
pub mod routes;
pub mod state;
pub mod store;
pub mod utils;

use config::Config;
use routes::{
    create_user_handler, delete_user_handler, history_handler, list_users_handler, play_handler,
    profile_handler, provision_handler, update_profile_handler, update_user_handler,
    user_history_handler,
};
use state::AppState;

pub struct ServerOptions {
    pub port: Option<u16>,
    pub memory: bool,
}

pub fn app(state: Arc<AppState>) -> Router {
    let mut cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .max_age(Duration::from_secs(60 * 60));

    match HeaderValue::from_str(&state.config.cors_origin) {
        Ok(origin) => cors = cors.allow_origin(origin),
        Err(e) => warn!("Invalid CORS_ORIGIN, cross-origin calls disabled: {e}"),
    }

    Router::new()
        .route("/api/game/play", post(play_handler))
        .route("/api/game/history", get(history_handler))
        .route(
            "/api/profile",
            get(profile_handler)
                .post(provision_handler)
                .put(update_profile_handler),
        )
        .route(
            "/api/admin/users",
            get(list_users_handler).post(create_user_handler),
        )
        .route(
            "/api/admin/users/{id}",
            put(update_user_handler).delete(delete_user_handler),
        )
        .route("/api/admin/users/{id}/history", get(user_history_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

pub async fn start_server(options: ServerOptions) -> anyhow::Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    info!("Initializing state...");
    let mut config = Config::load();
    if let Some(port) = options.port {
        config.port = port;
    }

    let state = if options.memory {
        AppState::in_memory(config).await?
    } else {
        AppState::new(config).await?
    };

    info!("Starting server...");

    let address = format!("0.0.0.0:{}", state.config.port);
    let app = app(state);

    info!("Binding to {address}");
    let listener = TcpListener::bind(&address).await?;
    info!("Server running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shut down");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        ctrl_c().await.expect("Failed to install Ctrl+C handler");

        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        signal(SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;

        info!("Received terminate signal, shutting down");
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
