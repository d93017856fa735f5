//! # Data Models
//!
//! This module contains the persistence entities and domain types used
//! throughout the Intel Bridge service.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod oauth_token;
pub mod token_record;

pub use token_record::Entity as TokenRecord;

/// Basic service information response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    /// The name of the service
    pub service: String,
    /// The version of the service
    pub version: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            service: "intel-bridge".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
