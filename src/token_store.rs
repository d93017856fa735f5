//! # Token Store
//!
//! Encrypted persistence of per-portal OAuth credential sets. Values are
//! stored as AES-256-GCM blobs of the serialized token; the row's expiry
//! column mirrors the token's own expiry and is only an optimization —
//! the decrypted expiry is re-checked on every read (lazy expiry).
//!
//! There is no compare-and-swap: each portal has one OAuth session at a
//! time, and the last writer wins.

use chrono::Utc;
use metrics::counter;
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::crypto::{CryptoError, EncryptionService};
use crate::models::oauth_token::{OAuthToken, TokenUpdate};
use crate::repositories::TokenRecordRepository;

/// Default lead time used by [`TokenStore::is_expiring_soon`].
pub const DEFAULT_EXPIRY_THRESHOLD_MINUTES: i64 = 5;

/// Token store error types
#[derive(Debug, Error)]
pub enum TokenStoreError {
    #[error("database operation failed: {0}")]
    Database(#[from] sea_orm::DbErr),
    #[error("crypto operation failed: {0}")]
    Crypto(#[from] CryptoError),
}

/// Encrypted, portal-keyed store for OAuth credential sets.
pub struct TokenStore {
    repo: TokenRecordRepository,
    crypto: EncryptionService,
}

impl TokenStore {
    pub fn new(db: Arc<DatabaseConnection>, crypto: EncryptionService) -> Self {
        Self {
            repo: TokenRecordRepository::new(db),
            crypto,
        }
    }

    /// Persist a token under its portal id, replacing any previous value.
    ///
    /// A token whose expiry is already in the past is stored as-is and will
    /// simply be absent on the next read; that is not an error.
    pub async fn store(&self, token: &OAuthToken) -> Result<(), TokenStoreError> {
        let ciphertext = self.crypto.encrypt_object(token)?;

        self.repo
            .upsert(
                &token.portal_id,
                ciphertext.into_bytes(),
                token.expires_at,
                token.created_at,
                token.updated_at,
            )
            .await?;

        counter!("token_store_writes_total").increment(1);
        debug!(portal_id = %token.portal_id, expires_at = %token.expires_at, "Token stored");

        Ok(())
    }

    /// Fetch and decrypt the token for a portal.
    ///
    /// Returns `None` when no row exists or the token has expired; an
    /// expired row is deleted on the way out. A blob that can no longer be
    /// decrypted is also deleted and treated as absent — the portal has to
    /// reconnect either way, and keeping the row would wedge every
    /// subsequent read.
    pub async fn get(&self, portal_id: &str) -> Result<Option<OAuthToken>, TokenStoreError> {
        let Some(row) = self.repo.find(portal_id).await? else {
            debug!(portal_id = %portal_id, "Token not found");
            return Ok(None);
        };

        let ciphertext =
            std::str::from_utf8(&row.ciphertext).map_err(|_| CryptoError::InvalidFormat);
        let token = ciphertext.and_then(|ct| self.crypto.decrypt_object::<OAuthToken>(ct));

        let token = match token {
            Ok(token) => token,
            Err(err) => {
                warn!(portal_id = %portal_id, error = %err, "Stored token is undecryptable, removing");
                self.repo.delete(portal_id).await?;
                counter!("token_store_corrupt_rows_total").increment(1);
                return Ok(None);
            }
        };

        if token.is_expired_at(Utc::now()) {
            warn!(portal_id = %portal_id, expires_at = %token.expires_at, "Token expired, removing");
            self.repo.delete(portal_id).await?;
            counter!("token_store_expired_reads_total").increment(1);
            return Ok(None);
        }

        Ok(Some(token))
    }

    /// Merge partial fields over the stored token and re-persist it.
    ///
    /// Returns `None` without creating anything when no live token exists.
    pub async fn update(
        &self,
        portal_id: &str,
        update: TokenUpdate,
    ) -> Result<Option<OAuthToken>, TokenStoreError> {
        let Some(current) = self.get(portal_id).await? else {
            warn!(portal_id = %portal_id, "Cannot update non-existent token");
            return Ok(None);
        };

        let updated = update.apply(current, Utc::now());
        self.store(&updated).await?;

        debug!(portal_id = %portal_id, expires_at = %updated.expires_at, "Token updated");
        Ok(Some(updated))
    }

    /// Remove the stored token for a portal. Idempotent.
    pub async fn delete(&self, portal_id: &str) -> Result<(), TokenStoreError> {
        let existed = self.repo.delete(portal_id).await?;
        if existed {
            counter!("token_store_deletes_total").increment(1);
        }
        debug!(portal_id = %portal_id, existed = existed, "Token deleted");
        Ok(())
    }

    /// Whether the portal's token is absent or expires within the threshold.
    ///
    /// Any internal failure also reports `true`: triggering a refresh on a
    /// healthy token is recoverable, silently trusting a stale one is not.
    pub async fn is_expiring_soon(&self, portal_id: &str, threshold_minutes: i64) -> bool {
        match self.get(portal_id).await {
            Ok(Some(token)) => token.expires_within(Utc::now(), threshold_minutes),
            Ok(None) => true,
            Err(err) => {
                warn!(portal_id = %portal_id, error = %err, "Expiry check failed, assuming expiring");
                true
            }
        }
    }

    /// Reap rows whose mirrored expiry has passed.
    pub async fn cleanup_expired(&self) -> Result<u64, TokenStoreError> {
        let removed = self.repo.cleanup_expired().await?;
        if removed > 0 {
            debug!(removed = removed, "Reaped expired token rows");
        }
        Ok(removed)
    }
}
