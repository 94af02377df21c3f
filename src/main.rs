//! CompliCal Backend
//!
//! REST API serving Australian and New Zealand compliance deadlines, with
//! API-key access for data endpoints, JWT accounts and hosted billing.

mod api;
mod auth;
mod billing;
mod config;
mod db;
mod errors;
mod models;
mod query;
mod seed;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    http::{header, HeaderName, HeaderValue, Method},
    middleware,
    routing::{delete, get, post},
    Router,
};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use billing::{PaymentsProvider, StripeClient};
use config::{Config, LogFormat};
use db::Repository;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub config: Arc<Config>,
    pub payments: Arc<dyn PaymentsProvider>,
}

#[derive(Debug, Parser)]
#[command(name = "complical", version, about = "AU/NZ compliance deadline API")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Validate and load a deadline seed file, then exit
    Seed {
        /// Path to a `{"deadlines": [...]}` JSON file
        file: PathBuf,
    },
}

fn init_tracing(config: &Config) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let registry = tracing_subscriber::registry().with(env_filter);
    match config.log_format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Load configuration
    let config = Config::from_env()?;
    init_tracing(&config);

    tracing::info!(environment = %config.environment, "Starting CompliCal backend");
    tracing::info!("Database path: {:?}", config.db_path);

    // Initialize database
    let pool = db::init_database(&config.db_path).await?;
    let repo = Arc::new(Repository::new(pool));

    match cli.command.unwrap_or(Command::Serve) {
        Command::Seed { file } => {
            let report = seed::seed_from_file(&repo, &file).await?;
            for rejected in &report.rejected {
                tracing::warn!(index = rejected.index, errors = ?rejected.errors, "rejected record");
            }
            for warning in &report.warnings {
                tracing::warn!("{}", warning);
            }
            tracing::info!(
                "Loaded {} of {} deadlines from {:?}",
                report.loaded,
                report.total,
                file
            );
            Ok(())
        }
        Command::Serve => serve(config, repo).await,
    }
}

async fn serve(config: Config, repo: Arc<Repository>) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(path) = &config.seed_path {
        let report = seed::seed_from_file(&repo, path).await?;
        tracing::info!("Seeded {} of {} deadlines", report.loaded, report.total);
    }
    let stored = repo.count_deadlines().await?;
    if stored == 0 {
        tracing::warn!("No deadlines stored. Run `complical seed <file>` to load data.");
    }

    if config.billing.stripe_secret_key.is_none() {
        tracing::warn!("STRIPE_SECRET_KEY not configured. Checkout and portal calls will fail!");
    }
    if config.billing.webhook_secret.is_none() {
        tracing::warn!("STRIPE_WEBHOOK_SECRET not configured. Webhooks will be rejected!");
    }

    tracing::info!(
        "New API keys join usage plan {} ({} requests/month, enforced at the gateway)",
        config.usage_plan.id,
        config.usage_plan.monthly_quota
    );

    tokio::spawn(sweep_expired_keys(
        repo.clone(),
        Duration::from_secs(config.key_sweep_secs.max(1)),
    ));

    let bind_addr = config.bind_addr;
    let state = AppState {
        repo,
        payments: Arc::new(StripeClient::new(config.billing.stripe_secret_key.clone())),
        config: Arc::new(config),
    };

    // Build router
    let app = create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!("Server listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

/// Delete API keys past their expiry at a fixed interval.
async fn sweep_expired_keys(repo: Arc<Repository>, every: Duration) {
    let mut interval = tokio::time::interval(every);
    loop {
        interval.tick().await;
        match repo.purge_expired_keys(Utc::now()).await {
            Ok(0) => {}
            Ok(removed) => tracing::info!(removed, "expired API keys purged"),
            Err(e) => tracing::warn!("Failed to purge expired API keys: {}", e),
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

/// Security headers set on every response unless a handler already did.
const SECURITY_HEADERS: [(&str, &str); 6] = [
    (
        "strict-transport-security",
        "max-age=31536000; includeSubDomains",
    ),
    ("x-content-type-options", "nosniff"),
    ("x-frame-options", "DENY"),
    ("x-xss-protection", "1; mode=block"),
    ("referrer-policy", "strict-origin-when-cross-origin"),
    ("content-security-policy", "default-src 'none'; frame-ancestors 'none'"),
];

fn cors_layer(config: &Config) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static(auth::API_KEY_HEADER),
        ])
        .expose_headers([
            HeaderName::from_static("x-warning"),
            HeaderName::from_static("x-request-id"),
        ])
        .allow_credentials(true)
        .max_age(Duration::from_secs(3600))
}

/// Create the application router with all routes.
pub fn create_router(state: AppState) -> Router {
    // Deadline data, authorized by API key
    let data_routes = Router::new()
        .route("/v1/deadlines", get(api::list_global_deadlines))
        .route(
            "/v1/deadlines/{country}/{year}/{month}",
            get(api::list_monthly_deadlines),
        )
        .route(
            "/v1/{jurisdiction}/{agency}/deadlines",
            get(api::list_deadlines),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::api_key_auth,
        ));

    // Account endpoints, authorized by JWT access token
    let account_routes = Router::new()
        .route("/v1/auth/logout", post(api::logout))
        .route(
            "/v1/auth/api-keys",
            post(api::create_api_key).get(api::list_api_keys),
        )
        .route("/v1/auth/api-keys/{id}", delete(api::revoke_api_key))
        .route("/v1/billing/checkout", post(api::create_checkout))
        .route("/v1/billing/portal", post(api::create_portal))
        .route("/v1/billing/subscription", get(api::get_subscription))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::jwt_auth));

    // No auth required
    let public_routes = Router::new()
        .route("/health", get(api::health_check))
        .route("/v1/auth/register", post(api::register))
        .route("/v1/auth/login", post(api::login))
        .route("/v1/auth/refresh", post(api::refresh))
        .route("/v1/billing/plans", get(api::list_plans))
        .route("/v1/billing/webhooks", post(api::handle_webhook));

    let mut router = Router::new()
        .merge(public_routes)
        .merge(account_routes)
        .merge(data_routes)
        .fallback(api::not_found);

    for (name, value) in SECURITY_HEADERS {
        router = router.layer(SetResponseHeaderLayer::if_not_present(
            HeaderName::from_static(name),
            HeaderValue::from_static(value),
        ));
    }

    let x_request_id = HeaderName::from_static("x-request-id");
    router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(
                    x_request_id.clone(),
                    MakeRequestUuid,
                ))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::new(x_request_id))
                .layer(cors_layer(&state.config)),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests;
