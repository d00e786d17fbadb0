pub mod api;
pub mod auth;
pub mod cli;
pub mod client;
pub mod db;
pub mod jwt;
pub mod password;
pub mod rate_limit;
pub mod session;

use api::create_api_router;
use axum::{
    Json, Router,
    http::{HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use db::Database;
use jwt::JwtConfig;
use rate_limit::{RateLimitConfig, RateLimitSettings};
use std::any::Any;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::{catch_panic::CatchPanicLayer, cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};

pub struct ServerConfig {
    /// Database connection (cloneable, uses connection pool internally)
    pub db: Database,
    /// Secret for signing access tokens
    pub jwt_secret: Vec<u8>,
    /// Secret for signing refresh tokens, distinct from `jwt_secret`
    pub jwt_refresh_secret: Vec<u8>,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    /// Whether to set Secure flag on cookies (should be true in production with HTTPS)
    pub secure_cookies: bool,
    /// Whether a registration may request the `ADMIN` role
    pub allow_admin_registration: bool,
    /// Browser origin allowed to call the API with credentials
    pub cors_origin: Option<String>,
    pub rate_limits: RateLimitSettings,
    /// Key rate limits on `X-Forwarded-For` (requires running behind a proxy)
    pub trust_forwarded: bool,
}

impl ServerConfig {
    /// Configuration with default lifetimes and limits.
    pub fn new(db: Database, jwt_secret: Vec<u8>, jwt_refresh_secret: Vec<u8>) -> Self {
        Self {
            db,
            jwt_secret,
            jwt_refresh_secret,
            access_ttl: jwt::DEFAULT_ACCESS_TTL,
            refresh_ttl: jwt::DEFAULT_REFRESH_TTL,
            secure_cookies: false,
            allow_admin_registration: true,
            cors_origin: None,
            rate_limits: RateLimitSettings::default(),
            trust_forwarded: false,
        }
    }
}

/// Create the application router with the given configuration.
pub fn create_app(config: &ServerConfig) -> Router {
    let jwt = Arc::new(JwtConfig::with_lifetimes(
        &config.jwt_secret,
        &config.jwt_refresh_secret,
        config.access_ttl,
        config.refresh_ttl,
    ));

    let rate_limit_config = Arc::new(RateLimitConfig::new(
        config.rate_limits,
        config.trust_forwarded,
    ));

    let api_router = create_api_router(
        config.db.clone(),
        jwt,
        config.secure_cookies,
        config.allow_admin_registration,
        rate_limit_config,
    );

    let mut app = Router::new()
        .route("/", get(banner))
        .nest("/api", api_router);

    if let Some(cors) = config.cors_origin.as_deref().and_then(cors_layer) {
        app = app.layer(cors);
    }

    app.layer(TraceLayer::new_for_http())
        .layer(CatchPanicLayer::custom(handle_panic))
}

async fn banner() -> &'static str {
    "Ticketdesk session API"
}

fn cors_layer(origin: &str) -> Option<CorsLayer> {
    let origin = match HeaderValue::from_str(origin) {
        Ok(origin) => origin,
        Err(e) => {
            warn!(origin = %origin, error = %e, "Ignoring invalid CORS origin");
            return None;
        }
    };

    Some(
        CorsLayer::new()
            .allow_origin(origin)
            .allow_credentials(true)
            .allow_methods([Method::GET, Method::POST])
            .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]),
    )
}

/// Last line of defense: a panicking handler becomes a generic 500 and the
/// process keeps serving.
fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.as_str()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s
    } else {
        "unknown panic payload"
    };
    error!(panic = %detail, "Request handler panicked");

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({ "error": "Internal server error" })),
    )
        .into_response()
}

/// Run the server on the given listener until a shutdown signal arrives.
/// The database pool is closed once in-flight requests have drained.
pub async fn run_server(config: ServerConfig, listener: TcpListener) -> Result<(), std::io::Error> {
    let app = create_app(&config);
    let make_service = app.into_make_service_with_connect_info::<SocketAddr>();

    axum::serve(listener, make_service)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped, closing database");
    config.db.close().await;
    Ok(())
}

/// Start the server on the given port in a background task. Use port 0 to let the OS choose a random port.
/// Returns the actual address the server is listening on.
/// Note: For production use, prefer `run_server` directly in main.
pub async fn start_server(
    config: ServerConfig,
    port: u16,
) -> Result<(tokio::task::JoinHandle<()>, SocketAddr), std::io::Error> {
    let listener = TcpListener::bind(("127.0.0.1", port)).await?;
    let local_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        let app = create_app(&config);
        let make_service = app.into_make_service_with_connect_info::<SocketAddr>();
        if let Err(e) = axum::serve(listener, make_service).await {
            error!(error = %e, "Server error");
        }
    });

    Ok((handle, local_addr))
}

/// Resolves on Ctrl-C, or SIGTERM on Unix.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
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

    info!("Shutdown signal received");
}
