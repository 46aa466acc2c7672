//! Repository for the `attribute_histories` event log.

use granta_core::types::DbId;
use sqlx::PgExecutor;

use crate::models::history::{AttributeHistory, CreateAttributeHistory};

const COLUMNS: &str =
    "id, entity_type, entity_id, field, old_value, new_value, change_reason, created_at";

/// Appends history rows and attaches change reasons after the fact.
pub struct HistoryRepo;

impl HistoryRepo {
    /// Append a history row. Called inside the same transaction as the
    /// mutation it records.
    pub async fn append(
        executor: impl PgExecutor<'_>,
        input: &CreateAttributeHistory,
    ) -> Result<AttributeHistory, sqlx::Error> {
        let query = format!(
            "INSERT INTO attribute_histories (entity_type, entity_id, field, old_value, new_value)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, AttributeHistory>(&query)
            .bind(input.entity_type)
            .bind(input.entity_id)
            .bind(input.field)
            .bind(&input.old_value)
            .bind(&input.new_value)
            .fetch_one(executor)
            .await
    }

    /// Attach a change reason to the newest history row for an entity.
    ///
    /// Returns the updated row, or `None` if the entity has no history yet.
    pub async fn set_latest_change_reason(
        executor: impl PgExecutor<'_>,
        entity_type: &str,
        entity_id: DbId,
        change_reason: &str,
    ) -> Result<Option<AttributeHistory>, sqlx::Error> {
        let query = format!(
            "UPDATE attribute_histories SET change_reason = $3
             WHERE id = (
                 SELECT id FROM attribute_histories
                 WHERE entity_type = $1 AND entity_id = $2
                 ORDER BY id DESC
                 LIMIT 1
             )
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, AttributeHistory>(&query)
            .bind(entity_type)
            .bind(entity_id)
            .bind(change_reason)
            .fetch_optional(executor)
            .await
    }

    /// Fetch the newest history row for an entity.
    pub async fn latest_for_entity(
        executor: impl PgExecutor<'_>,
        entity_type: &str,
        entity_id: DbId,
    ) -> Result<Option<AttributeHistory>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM attribute_histories
             WHERE entity_type = $1 AND entity_id = $2
             ORDER BY id DESC
             LIMIT 1"
        );
        sqlx::query_as::<_, AttributeHistory>(&query)
            .bind(entity_type)
            .bind(entity_id)
            .fetch_optional(executor)
            .await
    }

    /// List an entity's history rows, oldest first.
    pub async fn list_for_entity(
        executor: impl PgExecutor<'_>,
        entity_type: &str,
        entity_id: DbId,
    ) -> Result<Vec<AttributeHistory>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM attribute_histories
             WHERE entity_type = $1 AND entity_id = $2
             ORDER BY id"
        );
        sqlx::query_as::<_, AttributeHistory>(&query)
            .bind(entity_type)
            .bind(entity_id)
            .fetch_all(executor)
            .await
    }
}
