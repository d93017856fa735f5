//! # OAuth Token Domain Model
//!
//! The decrypted credential set for one portal, matching the JSON shape
//! stored inside the encrypted blob. Exactly one live token exists per
//! portal at any time; the last write wins.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// One portal's OAuth credential set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuthToken {
    /// Portal (tenant) identifier, numeric-looking, unique per portal
    pub portal_id: String,
    /// Opaque access token; never persisted or logged in plaintext
    pub access_token: String,
    /// Opaque refresh token; never persisted or logged in plaintext
    pub refresh_token: String,
    /// Instant after which the access token is no longer valid
    pub expires_at: DateTime<Utc>,
    /// Granted scopes, in the order they were requested
    pub scopes: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OAuthToken {
    /// Whether the access token has expired as of `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Whether the access token expires within `threshold_minutes` of `now`.
    pub fn expires_within(&self, now: DateTime<Utc>, threshold_minutes: i64) -> bool {
        self.expires_at <= now + Duration::minutes(threshold_minutes)
    }
}

/// Partial field set merged over an existing token by the store's update
/// operation. `None` fields keep their current value.
#[derive(Debug, Clone, Default)]
pub struct TokenUpdate {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub scopes: Option<Vec<String>>,
}

impl TokenUpdate {
    /// Apply this update over `current`, stamping `updated_at` with `now`.
    pub fn apply(self, current: OAuthToken, now: DateTime<Utc>) -> OAuthToken {
        OAuthToken {
            access_token: self.access_token.unwrap_or(current.access_token),
            refresh_token: self.refresh_token.unwrap_or(current.refresh_token),
            expires_at: self.expires_at.unwrap_or(current.expires_at),
            scopes: self.scopes.unwrap_or(current.scopes),
            updated_at: now,
            ..current
        }
    }
}
