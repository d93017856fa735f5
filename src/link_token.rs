//! Signed report-link tokens
//!
//! Generated access URLs carry a short-lived HS256 token bound to the
//! report slug and the requesting record identifiers, so an issued link
//! cannot be retargeted after the fact. Tokens expire 24 hours after
//! issuance.

use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifetime of an issued report link.
pub const LINK_TOKEN_TTL_SECONDS: i64 = 60 * 60 * 24;

/// Link token error types
#[derive(Debug, Error)]
pub enum LinkTokenError {
    #[error("failed to sign link token: {0}")]
    Signing(jsonwebtoken::errors::Error),
    #[error("link token rejected: {0}")]
    Verification(jsonwebtoken::errors::Error),
}

/// Claims bound into a report link.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkClaims {
    pub slug: String,
    pub report_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub portal_id: Option<String>,
    pub request_id: String,
    pub iat: i64,
    pub exp: i64,
}

/// Issues and verifies signed report-link tokens.
#[derive(Clone)]
pub struct LinkSigner {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl LinkSigner {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    /// Sign a link token issued now, returning the token and its expiry
    /// instant.
    pub fn issue(
        &self,
        slug: &str,
        report_id: &str,
        contact_id: Option<String>,
        company_id: Option<String>,
        portal_id: Option<String>,
        request_id: &str,
    ) -> Result<(String, DateTime<Utc>), LinkTokenError> {
        let iat = Utc::now().timestamp();
        let exp = iat + LINK_TOKEN_TTL_SECONDS;

        let claims = LinkClaims {
            slug: slug.to_string(),
            report_id: report_id.to_string(),
            contact_id,
            company_id,
            portal_id,
            request_id: request_id.to_string(),
            iat,
            exp,
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(LinkTokenError::Signing)?;

        let expires_at = Utc
            .timestamp_opt(exp, 0)
            .single()
            .unwrap_or_else(Utc::now);

        Ok((token, expires_at))
    }

    /// Verify a token's signature and expiry, returning its claims.
    pub fn verify(&self, token: &str) -> Result<LinkClaims, LinkTokenError> {
        let validation = Validation::new(Algorithm::HS256);

        decode::<LinkClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(LinkTokenError::Verification)
    }
}
