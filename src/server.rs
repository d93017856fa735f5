//! # Server Configuration
//!
//! This module contains the application state, router construction, and
//! server lifecycle for the Intel Bridge API.

use std::sync::Arc;

use axum::{
    Router,
    extract::Request,
    http::{HeaderValue, Method, header},
    middleware::Next,
    response::Response,
    routing::{get, post},
};
use sea_orm::DatabaseConnection;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::AppConfig;
use crate::crypto::{CryptoKey, EncryptionService};
use crate::handlers;
use crate::hubspot::HubSpotClient;
use crate::intel::IntelClient;
use crate::link_token::LinkSigner;
use crate::telemetry::{self, RequestContext};
use crate::token_store::TokenStore;

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: Arc<DatabaseConnection>,
    pub token_store: Arc<TokenStore>,
    pub hubspot: Arc<HubSpotClient>,
    pub intel: Arc<IntelClient>,
    pub link_signer: LinkSigner,
}

impl AppState {
    /// Construct every component from validated configuration.
    pub fn from_config(
        config: Arc<AppConfig>,
        db: DatabaseConnection,
    ) -> anyhow::Result<Self> {
        let db = Arc::new(db);

        let encryption_key = config
            .security
            .encryption_key
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("encryption key is not configured"))?;
        let crypto = EncryptionService::new(CryptoKey::new(encryption_key.clone().into_bytes())?);

        let link_signing_secret = config
            .security
            .link_signing_secret
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("link signing secret is not configured"))?;

        let token_store = Arc::new(TokenStore::new(db.clone(), crypto));
        let hubspot = Arc::new(HubSpotClient::from_config(&config.hubspot)?);
        let intel = Arc::new(IntelClient::from_config(&config.intel)?);
        let link_signer = LinkSigner::new(link_signing_secret);

        Ok(Self {
            config,
            db,
            token_store,
            hubspot,
            intel,
            link_signer,
        })
    }
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    let cors = cors_layer(&state.config);

    Router::new()
        .route("/", get(handlers::root))
        .route("/api/health", get(handlers::health))
        .route("/api/auth/install", get(handlers::auth::install))
        .route("/api/auth/callback", get(handlers::auth::callback))
        .route("/api/auth/refresh", post(handlers::auth::refresh))
        .route("/api/auth/status", get(handlers::auth::status))
        .route("/api/reports/available", get(handlers::reports::available))
        .route(
            "/api/reports/generate-url",
            post(handlers::reports::generate_url),
        )
        .layer(axum::middleware::from_fn(request_context_middleware))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
}

/// Assign each request a correlation id, visible to handlers through
/// task-local storage and echoed back in the `x-request-id` header.
async fn request_context_middleware(request: Request, next: Next) -> Response {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(telemetry::generate_request_id);

    let context = RequestContext {
        request_id: request_id.clone(),
    };

    let mut response = telemetry::with_request_context(context, next.run(request)).await;

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert("x-request-id", value);
    }

    response
}

fn cors_layer(config: &AppConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

/// Starts the server with the given configuration
pub async fn run_server(
    config: AppConfig,
    db: DatabaseConnection,
) -> Result<(), Box<dyn std::error::Error>> {
    use migration::{Migrator, MigratorTrait};

    Migrator::up(&db, None).await?;

    let addr = config
        .bind_addr()
        .map_err(|e| format!("Invalid server address: {}", e))?;
    let profile = config.profile.clone();

    let state = AppState::from_config(Arc::new(config), db)?;
    let app = create_app(state);

    let shutdown = CancellationToken::new();
    let shutdown_signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown signal received");
            shutdown_signal.cancel();
        }
    });

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %addr, profile = %profile, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    Ok(())
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::health,
        crate::handlers::auth::install,
        crate::handlers::auth::callback,
        crate::handlers::auth::refresh,
        crate::handlers::auth::status,
        crate::handlers::reports::available,
        crate::handlers::reports::generate_url,
    ),
    components(
        schemas(
            crate::models::ServiceInfo,
            crate::error::ErrorDetail,
            crate::error::ErrorEnvelope,
            crate::intel::ReportDescriptor,
            crate::handlers::types::HealthData,
            crate::handlers::types::RefreshRequest,
            crate::handlers::types::RefreshData,
            crate::handlers::types::TokenStatusData,
            crate::handlers::types::ReportAvailabilityData,
            crate::handlers::types::GenerateUrlRequest,
            crate::handlers::types::GenerateUrlData,
        )
    ),
    info(
        title = "Intel Bridge API",
        description = "OAuth broker and report discovery bridge for CRM sales-intel cards",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;
