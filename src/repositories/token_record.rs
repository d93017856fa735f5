//! # Token Record Repository
//!
//! Database operations for the key-value shaped `oauth_tokens` table.
//! One row per portal; writes are upserts (last write wins).

use chrono::{DateTime, Utc};
use sea_orm::sea_query::OnConflict;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use std::sync::Arc;

use crate::models::token_record::{ActiveModel, Column, Entity, Model};

/// Repository for encrypted token rows
pub struct TokenRecordRepository {
    db: Arc<DatabaseConnection>,
}

impl TokenRecordRepository {
    /// Create a new token record repository
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Insert or replace the row for a portal.
    pub async fn upsert(
        &self,
        portal_id: &str,
        ciphertext: Vec<u8>,
        expires_at: DateTime<Utc>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Result<(), sea_orm::DbErr> {
        let row = ActiveModel {
            portal_id: Set(portal_id.to_string()),
            ciphertext: Set(ciphertext),
            expires_at: Set(expires_at),
            created_at: Set(created_at),
            updated_at: Set(updated_at),
        };

        Entity::insert(row)
            .on_conflict(
                OnConflict::column(Column::PortalId)
                    .update_columns([Column::Ciphertext, Column::ExpiresAt, Column::UpdatedAt])
                    .to_owned(),
            )
            .exec(&*self.db)
            .await?;

        Ok(())
    }

    /// Find the row for a portal, if any.
    pub async fn find(&self, portal_id: &str) -> Result<Option<Model>, sea_orm::DbErr> {
        Entity::find_by_id(portal_id.to_string()).one(&*self.db).await
    }

    /// Delete the row for a portal. Idempotent; returns whether a row existed.
    pub async fn delete(&self, portal_id: &str) -> Result<bool, sea_orm::DbErr> {
        let result = Entity::delete_by_id(portal_id.to_string())
            .exec(&*self.db)
            .await?;
        Ok(result.rows_affected > 0)
    }

    /// Remove rows whose mirrored expiry has passed. The inner token expiry
    /// is still re-checked on every read; this only reclaims storage.
    pub async fn cleanup_expired(&self) -> Result<u64, sea_orm::DbErr> {
        let result = Entity::delete_many()
            .filter(Column::ExpiresAt.lt(Utc::now()))
            .exec(&*self.db)
            .await?;

        Ok(result.rows_affected)
    }
}
