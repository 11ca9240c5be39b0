use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rust_leads_gateway::config::Config;
use rust_leads_gateway::handlers::{self, AppState};
use rust_leads_gateway::store::FileStore;

/// Largest accepted upload (lead spreadsheets).
const MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;

/// Main entry point for the local facade.
///
/// Initializes tracing, loads configuration, opens the session store,
/// builds the single gateway and serves canonical records over HTTP.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rust_leads_gateway=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;

    let store = Arc::new(FileStore::open(&config.store_path));
    let app_state = Arc::new(AppState::new(config.clone(), store)?);
    tracing::info!("✓ Gateway ready at {}", app_state.gateway.address());

    tokio::spawn(handlers::watch_gateway_events(app_state.gateway.clone()));

    let api_routes = Router::new()
        // Session
        .route("/session/login", post(handlers::login))
        .route("/session/logout", post(handlers::logout))
        .route("/session/me", get(handlers::me))
        // Leads
        .route("/leads", get(handlers::list_leads).post(handlers::create_lead))
        .route("/leads/export", get(handlers::export_leads))
        .route("/leads/upload", post(handlers::upload_leads))
        .route(
            "/leads/:id",
            get(handlers::get_lead)
                .put(handlers::update_lead)
                .delete(handlers::delete_lead),
        )
        .route("/leads/:id/status", put(handlers::update_lead_status))
        .route("/leads/:id/assign", post(handlers::assign_lead))
        // Users
        .route("/users", get(handlers::list_users).post(handlers::create_user))
        .route(
            "/users/:id",
            get(handlers::get_user)
                .put(handlers::update_user)
                .delete(handlers::delete_user),
        )
        // Districts
        .route(
            "/districts",
            get(handlers::list_districts).post(handlers::create_district),
        )
        .route(
            "/districts/:id",
            get(handlers::get_district)
                .put(handlers::update_district)
                .delete(handlers::delete_district),
        )
        // Dashboard
        .route("/dashboard/stats", get(handlers::dashboard_stats))
        .layer(
            ServiceBuilder::new()
                .layer(DefaultBodyLimit::disable())
                .layer(RequestBodyLimitLayer::new(MAX_UPLOAD_BYTES)),
        );

    let app = Router::new()
        .route("/health", get(handlers::health))
        .merge(api_routes)
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Facade listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
