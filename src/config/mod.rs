//! Configuration loading for the Intel Bridge service.
//!
//! Loads layered `.env` files and environment variables prefixed with
//! `BRIDGE_`, producing a typed [`AppConfig`]. Required settings are
//! validated at startup; a missing secret or malformed encryption key
//! aborts the process rather than failing lazily mid-request.

use std::{collections::BTreeMap, env, net::SocketAddr, path::PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

const REDACTED: &str = "[REDACTED]";

/// Application configuration derived from `BRIDGE_*` environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct AppConfig {
    #[serde(default = "default_profile")]
    pub profile: String,
    #[serde(default = "default_api_bind_addr")]
    pub api_bind_addr: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_format")]
    pub log_format: String,
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,
    #[serde(default = "default_db_acquire_timeout_ms")]
    pub db_acquire_timeout_ms: u64,
    /// Base URL for user-facing success/error redirect pages.
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,
    /// Origins allowed to call the API through the host platform's fetch bridge.
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
    #[serde(default)]
    pub hubspot: HubSpotConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub intel: IntelConfig,
}

/// Identity provider (HubSpot) OAuth application settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct HubSpotConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<String>,
    /// OAuth scopes requested during install, in order.
    #[serde(default = "default_hubspot_scopes")]
    pub scopes: Vec<String>,
    #[serde(default = "default_hubspot_authorize_base")]
    pub authorize_base: String,
    #[serde(default = "default_hubspot_api_base")]
    pub api_base: String,
}

/// Secrets for at-rest encryption and report-link signing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct SecurityConfig {
    /// Exactly 32 characters; its UTF-8 bytes key AES-256-GCM.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_signing_secret: Option<String>,
}

/// Upstream report backend client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct IntelConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Hard per-request timeout in seconds (default: 30)
    #[serde(default = "default_intel_timeout_seconds")]
    pub timeout_seconds: u64,
    /// Total attempt budget for retryable failures (default: 3)
    #[serde(default = "default_intel_retry_attempts")]
    pub retry_attempts: u32,
    /// Base delay between retries; attempt N waits `base * N` (default: 1000ms)
    #[serde(default = "default_intel_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
}

impl Default for IntelConfig {
    fn default() -> Self {
        Self {
            api_url: None,
            api_key: None,
            timeout_seconds: default_intel_timeout_seconds(),
            retry_attempts: default_intel_retry_attempts(),
            retry_base_delay_ms: default_intel_retry_base_delay_ms(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            profile: default_profile(),
            api_bind_addr: default_api_bind_addr(),
            log_level: default_log_level(),
            log_format: default_log_format(),
            database_url: default_database_url(),
            db_max_connections: default_db_max_connections(),
            db_acquire_timeout_ms: default_db_acquire_timeout_ms(),
            public_base_url: default_public_base_url(),
            allowed_origins: default_allowed_origins(),
            hubspot: HubSpotConfig::default(),
            security: SecurityConfig::default(),
            intel: IntelConfig::default(),
        }
    }
}

impl AppConfig {
    /// Returns the configured bind address as a socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        self.api_bind_addr.parse()
    }

    /// Returns a redacted JSON representation (secrets are redacted).
    pub fn redacted_json(&self) -> serde_json::Result<String> {
        let mut config = self.clone();
        if config.hubspot.client_secret.is_some() {
            config.hubspot.client_secret = Some(REDACTED.to_string());
        }
        if config.security.encryption_key.is_some() {
            config.security.encryption_key = Some(REDACTED.to_string());
        }
        if config.security.link_signing_secret.is_some() {
            config.security.link_signing_secret = Some(REDACTED.to_string());
        }
        if config.intel.api_key.is_some() {
            config.intel.api_key = Some(REDACTED.to_string());
        }
        serde_json::to_string_pretty(&config)
    }

    /// Validates the configuration, returning an error if required settings are missing.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.hubspot.client_id.is_none() {
            return Err(ConfigError::MissingHubSpotClientId);
        }
        if self.hubspot.client_secret.is_none() {
            return Err(ConfigError::MissingHubSpotClientSecret);
        }
        if self.hubspot.redirect_uri.is_none() {
            return Err(ConfigError::MissingHubSpotRedirectUri);
        }
        if self.hubspot.scopes.is_empty() {
            return Err(ConfigError::EmptyHubSpotScopes);
        }

        match self.security.encryption_key.as_deref() {
            None => return Err(ConfigError::MissingEncryptionKey),
            Some(key) if key.len() != 32 => {
                return Err(ConfigError::InvalidEncryptionKeyLength { length: key.len() });
            }
            Some(_) => {}
        }
        if self.security.link_signing_secret.is_none() {
            return Err(ConfigError::MissingLinkSigningSecret);
        }

        if self.intel.api_url.is_none() {
            return Err(ConfigError::MissingIntelApiUrl);
        }
        if self.intel.api_key.is_none() {
            return Err(ConfigError::MissingIntelApiKey);
        }
        if self.intel.timeout_seconds == 0 {
            return Err(ConfigError::InvalidIntelTimeout {
                value: self.intel.timeout_seconds,
            });
        }
        if self.intel.retry_attempts == 0 {
            return Err(ConfigError::InvalidIntelRetryAttempts {
                value: self.intel.retry_attempts,
            });
        }

        Ok(())
    }
}

fn default_profile() -> String {
    "local".to_string()
}

fn default_api_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_database_url() -> String {
    "sqlite:intel_bridge.db?mode=rwc".to_string()
}

fn default_db_max_connections() -> u32 {
    10
}

fn default_db_acquire_timeout_ms() -> u64 {
    5000
}

fn default_public_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_allowed_origins() -> Vec<String> {
    vec![
        "https://app.hubspot.com".to_string(),
        "https://app-eu1.hubspot.com".to_string(),
    ]
}

fn default_hubspot_scopes() -> Vec<String> {
    vec![
        "crm.objects.contacts.read".to_string(),
        "crm.objects.companies.read".to_string(),
    ]
}

fn default_hubspot_authorize_base() -> String {
    "https://app.hubspot.com".to_string()
}

fn default_hubspot_api_base() -> String {
    "https://api.hubapi.com".to_string()
}

fn default_intel_timeout_seconds() -> u64 {
    30
}

fn default_intel_retry_attempts() -> u32 {
    3
}

fn default_intel_retry_base_delay_ms() -> u64 {
    1000
}

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load environment file {path}: {source}")]
    EnvFile {
        path: PathBuf,
        source: dotenvy::Error,
    },
    #[error("invalid api bind address '{value}': {source}")]
    InvalidBindAddr {
        value: String,
        source: std::net::AddrParseError,
    },
    #[error("HubSpot client ID is missing; set BRIDGE_HUBSPOT_CLIENT_ID environment variable")]
    MissingHubSpotClientId,
    #[error(
        "HubSpot client secret is missing; set BRIDGE_HUBSPOT_CLIENT_SECRET environment variable"
    )]
    MissingHubSpotClientSecret,
    #[error(
        "HubSpot redirect URI is missing; set BRIDGE_HUBSPOT_REDIRECT_URI environment variable"
    )]
    MissingHubSpotRedirectUri,
    #[error("HubSpot scope list is empty; set BRIDGE_HUBSPOT_SCOPES environment variable")]
    EmptyHubSpotScopes,
    #[error("encryption key is missing; set BRIDGE_ENCRYPTION_KEY environment variable")]
    MissingEncryptionKey,
    #[error("encryption key must be exactly 32 characters, got {length}")]
    InvalidEncryptionKeyLength { length: usize },
    #[error("link signing secret is missing; set BRIDGE_LINK_SIGNING_SECRET environment variable")]
    MissingLinkSigningSecret,
    #[error("intel API URL is missing; set BRIDGE_INTEL_API_URL environment variable")]
    MissingIntelApiUrl,
    #[error("intel API key is missing; set BRIDGE_INTEL_API_KEY environment variable")]
    MissingIntelApiKey,
    #[error("intel request timeout must be positive, got {value}")]
    InvalidIntelTimeout { value: u64 },
    #[error("intel retry attempts must be at least 1, got {value}")]
    InvalidIntelRetryAttempts { value: u32 },
}

/// Loads configuration using layered `.env` files and `BRIDGE_*` env vars.
pub struct ConfigLoader {
    base_dir: PathBuf,
}

impl ConfigLoader {
    /// Creates a new loader rooted at the current working directory.
    pub fn new() -> Self {
        Self {
            base_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    /// Creates a loader rooted at the provided directory (useful for tests).
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Loads, layers, and validates the configuration.
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let (mut layered, profile_hint) = self.collect_layered_env()?;

        // Overlay process environment last so it wins.
        for (key, value) in env::vars() {
            if let Some(stripped) = key.strip_prefix("BRIDGE_") {
                layered.insert(stripped.to_string(), value);
            }
        }

        let profile = layered
            .remove("PROFILE")
            .filter(|v| !v.is_empty())
            .unwrap_or(profile_hint);
        let api_bind_addr = layered
            .remove("API_BIND_ADDR")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(default_api_bind_addr);
        let log_level = layered
            .remove("LOG_LEVEL")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(default_log_level);
        let log_format = layered
            .remove("LOG_FORMAT")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(default_log_format);
        let database_url = layered
            .remove("DATABASE_URL")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(default_database_url);
        let db_max_connections = layered
            .remove("DB_MAX_CONNECTIONS")
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(default_db_max_connections);
        let db_acquire_timeout_ms = layered
            .remove("DB_ACQUIRE_TIMEOUT_MS")
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(default_db_acquire_timeout_ms);
        let public_base_url = layered
            .remove("PUBLIC_BASE_URL")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(default_public_base_url);
        let allowed_origins = layered
            .remove("ALLOWED_ORIGINS")
            .map(|origins| parse_comma_list(&origins))
            .filter(|list: &Vec<String>| !list.is_empty())
            .unwrap_or_else(default_allowed_origins);

        let hubspot = HubSpotConfig {
            client_id: layered.remove("HUBSPOT_CLIENT_ID").and_then(non_empty),
            client_secret: layered.remove("HUBSPOT_CLIENT_SECRET").and_then(non_empty),
            redirect_uri: layered.remove("HUBSPOT_REDIRECT_URI").and_then(non_empty),
            scopes: layered
                .remove("HUBSPOT_SCOPES")
                .map(|scopes| parse_comma_list(&scopes))
                .filter(|list: &Vec<String>| !list.is_empty())
                .unwrap_or_else(default_hubspot_scopes),
            authorize_base: layered
                .remove("HUBSPOT_AUTHORIZE_BASE")
                .filter(|v| !v.is_empty())
                .unwrap_or_else(default_hubspot_authorize_base),
            api_base: layered
                .remove("HUBSPOT_API_BASE")
                .filter(|v| !v.is_empty())
                .unwrap_or_else(default_hubspot_api_base),
        };

        let security = SecurityConfig {
            encryption_key: layered.remove("ENCRYPTION_KEY").and_then(non_empty),
            link_signing_secret: layered.remove("LINK_SIGNING_SECRET").and_then(non_empty),
        };

        let intel = IntelConfig {
            api_url: layered.remove("INTEL_API_URL").and_then(non_empty),
            api_key: layered.remove("INTEL_API_KEY").and_then(non_empty),
            timeout_seconds: layered
                .remove("INTEL_TIMEOUT_SECONDS")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_intel_timeout_seconds),
            retry_attempts: layered
                .remove("INTEL_RETRY_ATTEMPTS")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_intel_retry_attempts),
            retry_base_delay_ms: layered
                .remove("INTEL_RETRY_BASE_DELAY_MS")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(default_intel_retry_base_delay_ms),
        };

        let config = AppConfig {
            profile,
            api_bind_addr,
            log_level,
            log_format,
            database_url,
            db_max_connections,
            db_acquire_timeout_ms,
            public_base_url,
            allowed_origins,
            hubspot,
            security,
            intel,
        };

        config.validate()?;

        match config.bind_addr() {
            Ok(_) => Ok(config),
            Err(source) => Err(ConfigError::InvalidBindAddr {
                value: config.api_bind_addr.clone(),
                source,
            }),
        }
    }

    fn collect_layered_env(&self) -> Result<(BTreeMap<String, String>, String), ConfigError> {
        let mut values = BTreeMap::new();

        self.merge_dotenv(self.base_dir.join(".env"), &mut values)?;
        self.merge_dotenv(self.base_dir.join(".env.local"), &mut values)?;

        let profile = env::var("BRIDGE_PROFILE")
            .ok()
            .or_else(|| values.get("PROFILE").cloned())
            .unwrap_or_else(default_profile);

        self.merge_dotenv(
            self.base_dir.join(format!(".env.{}", &profile)),
            &mut values,
        )?;
        self.merge_dotenv(
            self.base_dir.join(format!(".env.{}.local", &profile)),
            &mut values,
        )?;

        Ok((values, profile))
    }

    fn merge_dotenv(
        &self,
        path: PathBuf,
        values: &mut BTreeMap<String, String>,
    ) -> Result<(), ConfigError> {
        match dotenvy::from_path_iter(&path) {
            Ok(iter) => {
                for item in iter {
                    let (key, value) = item.map_err(|source| ConfigError::EnvFile {
                        path: path.clone(),
                        source,
                    })?;
                    if let Some(stripped) = key.strip_prefix("BRIDGE_") {
                        values.insert(stripped.to_string(), value);
                    }
                }
                Ok(())
            }
            Err(dotenvy::Error::Io(ref io_err))
                if io_err.kind() == std::io::ErrorKind::NotFound =>
            {
                Ok(())
            }
            Err(err) => Err(ConfigError::EnvFile { path, source: err }),
        }
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn parse_comma_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
