//! # Token Record Model
//!
//! SeaORM entity for the `oauth_tokens` table. Each row is one portal's
//! encrypted credential blob plus a mirrored expiry column used for
//! reaping; the authoritative expiry lives inside the encrypted payload.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Stored encrypted token row, keyed by portal id
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "oauth_tokens")]
pub struct Model {
    /// Portal (tenant) identifier that owns this credential set
    #[sea_orm(primary_key, auto_increment = false)]
    pub portal_id: String,

    /// Encrypted JSON blob of the full credential set
    pub ciphertext: Vec<u8>,

    /// Mirrored expiry of the inner token, used for reaping
    pub expires_at: chrono::DateTime<chrono::Utc>,

    /// When the row was first written
    pub created_at: chrono::DateTime<chrono::Utc>,

    /// When the row was last rewritten
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
