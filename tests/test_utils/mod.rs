//! Test utilities for integration tests.
//!
//! Provides in-memory SQLite databases with migrations applied, complete
//! test configurations pointed at mock upstream servers, and a helper to
//! spawn the full application on an ephemeral port.

use anyhow::Result;
use chrono::{Duration, Utc};
use migration::{Migrator, MigratorTrait};
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use std::sync::Arc;
use tokio::task::JoinHandle;

use intel_bridge::config::{AppConfig, HubSpotConfig, IntelConfig, SecurityConfig};
use intel_bridge::crypto::{CryptoKey, EncryptionService};
use intel_bridge::models::oauth_token::OAuthToken;
use intel_bridge::server::{AppState, create_app};
use intel_bridge::token_store::TokenStore;

/// 32-character key used across tests.
pub const TEST_ENCRYPTION_KEY: &str = "0123456789abcdef0123456789abcdef";

#[allow(dead_code)]
pub const TEST_LINK_SECRET: &str = "test-link-signing-secret";

/// Sets up an in-memory SQLite database with all migrations applied.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    // A single-connection pool is required: each connection to
    // `sqlite::memory:` otherwise gets its own throwaway database, so
    // queries on a different pooled connection than the one that ran
    // migrations would see an empty schema.
    let mut opt = ConnectOptions::new("sqlite::memory:");
    opt.max_connections(1);
    let db = Database::connect(opt).await?;
    Migrator::up(&db, None).await?;
    Ok(db)
}

/// Sets up an in-memory SQLite database and returns it wrapped in an Arc.
#[allow(dead_code)]
pub async fn setup_test_db_arc() -> Result<Arc<DatabaseConnection>> {
    Ok(Arc::new(setup_test_db().await?))
}

/// Encryption service keyed with the shared test key.
#[allow(dead_code)]
pub fn test_encryption_service() -> EncryptionService {
    EncryptionService::new(
        CryptoKey::new(TEST_ENCRYPTION_KEY.as_bytes().to_vec()).expect("valid test key"),
    )
}

/// Token store over the given database, keyed with the shared test key.
#[allow(dead_code)]
pub fn test_token_store(db: Arc<DatabaseConnection>) -> TokenStore {
    TokenStore::new(db, test_encryption_service())
}

/// Complete configuration pointing both upstream clients at mock servers.
#[allow(dead_code)]
pub fn test_config(hubspot_base: &str, intel_base: &str) -> AppConfig {
    AppConfig {
        public_base_url: "https://bridge.example.com".to_string(),
        hubspot: HubSpotConfig {
            client_id: Some("test-client-id".to_string()),
            client_secret: Some("test-client-secret".to_string()),
            redirect_uri: Some("https://bridge.example.com/api/auth/callback".to_string()),
            authorize_base: hubspot_base.to_string(),
            api_base: hubspot_base.to_string(),
            ..HubSpotConfig::default()
        },
        security: SecurityConfig {
            encryption_key: Some(TEST_ENCRYPTION_KEY.to_string()),
            link_signing_secret: Some(TEST_LINK_SECRET.to_string()),
        },
        intel: IntelConfig {
            api_url: Some(intel_base.to_string()),
            api_key: Some("test-intel-key".to_string()),
            retry_base_delay_ms: 10,
            ..IntelConfig::default()
        },
        ..AppConfig::default()
    }
}

/// Spawn the full application on an ephemeral port.
///
/// Returns the base URL, the shared state (for poking at the token store
/// and database), and the server task handle.
#[allow(dead_code)]
pub async fn spawn_test_app(config: AppConfig) -> Result<(String, AppState, JoinHandle<()>)> {
    let db = setup_test_db().await?;
    let state = AppState::from_config(Arc::new(config), db)?;
    let app = create_app(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    Ok((format!("http://{}", addr), state, handle))
}

/// A live token expiring `expires_in_minutes` from now.
#[allow(dead_code)]
pub fn sample_token(portal_id: &str, expires_in_minutes: i64) -> OAuthToken {
    let now = Utc::now();
    OAuthToken {
        portal_id: portal_id.to_string(),
        access_token: format!("access-{}", portal_id),
        refresh_token: format!("refresh-{}", portal_id),
        expires_at: now + Duration::minutes(expires_in_minutes),
        scopes: vec![
            "crm.objects.contacts.read".to_string(),
            "crm.objects.companies.read".to_string(),
        ],
        created_at: now,
        updated_at: now,
    }
}
