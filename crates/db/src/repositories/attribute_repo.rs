//! Repository for the typed attribute system: allocation attributes, user
//! attributes, and their 1:1 usage companions.
//!
//! The `lock_*` methods re-read a row under `FOR UPDATE` and exist for the
//! accounting engine, which must serialize concurrent allowance writes.

use granta_core::types::DbId;
use rust_decimal::Decimal;
use sqlx::PgExecutor;

use crate::models::allocation::{
    AllocationAttribute, AllocationAttributeType, AllocationAttributeUsage,
    AllocationUserAttribute, AllocationUserAttributeUsage,
};

// ---------------------------------------------------------------------------
// Column lists
// ---------------------------------------------------------------------------

const ATTR_COLUMNS: &str =
    "id, allocation_id, allocation_attribute_type_id, value, created_at, updated_at";

const USAGE_COLUMNS: &str = "id, allocation_attribute_id, value, created_at, updated_at";

const USER_ATTR_COLUMNS: &str =
    "id, allocation_user_id, allocation_id, allocation_attribute_type_id, value, created_at, updated_at";

const USER_USAGE_COLUMNS: &str = "id, allocation_user_attribute_id, value, created_at, updated_at";

/// Provides attribute and usage operations for the accounting engine.
pub struct AttributeRepo;

impl AttributeRepo {
    // -----------------------------------------------------------------------
    // Attribute types
    // -----------------------------------------------------------------------

    /// Find an attribute type by name.
    pub async fn find_type(
        executor: impl PgExecutor<'_>,
        name: &str,
    ) -> Result<Option<AllocationAttributeType>, sqlx::Error> {
        sqlx::query_as::<_, AllocationAttributeType>(
            "SELECT id, name, has_usage, is_unique
             FROM allocation_attribute_types WHERE name = $1",
        )
        .bind(name)
        .fetch_optional(executor)
        .await
    }

    // -----------------------------------------------------------------------
    // Allocation attributes
    // -----------------------------------------------------------------------

    /// Find the attribute of the named type on an allocation.
    pub async fn find_attribute(
        executor: impl PgExecutor<'_>,
        allocation_id: DbId,
        type_name: &str,
    ) -> Result<Option<AllocationAttribute>, sqlx::Error> {
        let query = format!(
            "SELECT {ATTR_COLUMNS} FROM allocation_attributes
             WHERE allocation_id = $1
               AND allocation_attribute_type_id =
                   (SELECT id FROM allocation_attribute_types WHERE name = $2)"
        );
        sqlx::query_as::<_, AllocationAttribute>(&query)
            .bind(allocation_id)
            .bind(type_name)
            .fetch_optional(executor)
            .await
    }

    /// Insert an attribute of the named type, or update the value of an
    /// existing one.
    pub async fn upsert_attribute(
        executor: impl PgExecutor<'_>,
        allocation_id: DbId,
        type_name: &str,
        value: &str,
    ) -> Result<AllocationAttribute, sqlx::Error> {
        let query = format!(
            "INSERT INTO allocation_attributes (allocation_id, allocation_attribute_type_id, value)
             VALUES (
                $1,
                (SELECT id FROM allocation_attribute_types WHERE name = $2),
                $3
             )
             ON CONFLICT (allocation_id, allocation_attribute_type_id)
             DO UPDATE SET value = $3, updated_at = NOW()
             RETURNING {ATTR_COLUMNS}"
        );
        sqlx::query_as::<_, AllocationAttribute>(&query)
            .bind(allocation_id)
            .bind(type_name)
            .bind(value)
            .fetch_one(executor)
            .await
    }

    /// Re-read an attribute under a row lock.
    pub async fn lock_attribute(
        executor: impl PgExecutor<'_>,
        id: DbId,
    ) -> Result<Option<AllocationAttribute>, sqlx::Error> {
        let query = format!("SELECT {ATTR_COLUMNS} FROM allocation_attributes WHERE id = $1 FOR UPDATE");
        sqlx::query_as::<_, AllocationAttribute>(&query)
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    /// Overwrite an attribute's string value.
    pub async fn update_attribute_value(
        executor: impl PgExecutor<'_>,
        id: DbId,
        value: &str,
    ) -> Result<Option<AllocationAttribute>, sqlx::Error> {
        let query = format!(
            "UPDATE allocation_attributes SET value = $2, updated_at = NOW()
             WHERE id = $1
             RETURNING {ATTR_COLUMNS}"
        );
        sqlx::query_as::<_, AllocationAttribute>(&query)
            .bind(id)
            .bind(value)
            .fetch_optional(executor)
            .await
    }

    /// Resolve an attribute's type name.
    pub async fn attribute_type_name(
        executor: impl PgExecutor<'_>,
        attribute_id: DbId,
    ) -> Result<Option<String>, sqlx::Error> {
        sqlx::query_scalar::<_, String>(
            "SELECT t.name FROM allocation_attributes a
             JOIN allocation_attribute_types t ON t.id = a.allocation_attribute_type_id
             WHERE a.id = $1",
        )
        .bind(attribute_id)
        .fetch_optional(executor)
        .await
    }

    // -----------------------------------------------------------------------
    // Allocation attribute usages
    // -----------------------------------------------------------------------

    /// Find the usage companion of an attribute.
    pub async fn find_usage(
        executor: impl PgExecutor<'_>,
        attribute_id: DbId,
    ) -> Result<Option<AllocationAttributeUsage>, sqlx::Error> {
        let query = format!(
            "SELECT {USAGE_COLUMNS} FROM allocation_attribute_usages
             WHERE allocation_attribute_id = $1"
        );
        sqlx::query_as::<_, AllocationAttributeUsage>(&query)
            .bind(attribute_id)
            .fetch_optional(executor)
            .await
    }

    /// Ensure a usage companion exists, leaving an existing value untouched.
    pub async fn get_or_create_usage(
        executor: impl PgExecutor<'_>,
        attribute_id: DbId,
    ) -> Result<AllocationAttributeUsage, sqlx::Error> {
        let query = format!(
            "INSERT INTO allocation_attribute_usages (allocation_attribute_id)
             VALUES ($1)
             ON CONFLICT (allocation_attribute_id) DO UPDATE SET updated_at = NOW()
             RETURNING {USAGE_COLUMNS}"
        );
        sqlx::query_as::<_, AllocationAttributeUsage>(&query)
            .bind(attribute_id)
            .fetch_one(executor)
            .await
    }

    /// Re-read a usage row under a row lock.
    pub async fn lock_usage(
        executor: impl PgExecutor<'_>,
        id: DbId,
    ) -> Result<Option<AllocationAttributeUsage>, sqlx::Error> {
        let query =
            format!("SELECT {USAGE_COLUMNS} FROM allocation_attribute_usages WHERE id = $1 FOR UPDATE");
        sqlx::query_as::<_, AllocationAttributeUsage>(&query)
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    /// Overwrite a usage value.
    pub async fn update_usage_value(
        executor: impl PgExecutor<'_>,
        id: DbId,
        value: Decimal,
    ) -> Result<Option<AllocationAttributeUsage>, sqlx::Error> {
        let query = format!(
            "UPDATE allocation_attribute_usages SET value = $2, updated_at = NOW()
             WHERE id = $1
             RETURNING {USAGE_COLUMNS}"
        );
        sqlx::query_as::<_, AllocationAttributeUsage>(&query)
            .bind(id)
            .bind(value)
            .fetch_optional(executor)
            .await
    }

    // -----------------------------------------------------------------------
    // Allocation user attributes
    // -----------------------------------------------------------------------

    /// Find the per-user attribute of the named type on a membership.
    pub async fn find_user_attribute(
        executor: impl PgExecutor<'_>,
        allocation_user_id: DbId,
        type_name: &str,
    ) -> Result<Option<AllocationUserAttribute>, sqlx::Error> {
        let query = format!(
            "SELECT {USER_ATTR_COLUMNS} FROM allocation_user_attributes
             WHERE allocation_user_id = $1
               AND allocation_attribute_type_id =
                   (SELECT id FROM allocation_attribute_types WHERE name = $2)"
        );
        sqlx::query_as::<_, AllocationUserAttribute>(&query)
            .bind(allocation_user_id)
            .bind(type_name)
            .fetch_optional(executor)
            .await
    }

    /// Insert a per-user attribute of the named type, or update the value of
    /// an existing one.
    pub async fn upsert_user_attribute(
        executor: impl PgExecutor<'_>,
        allocation_user_id: DbId,
        allocation_id: DbId,
        type_name: &str,
        value: &str,
    ) -> Result<AllocationUserAttribute, sqlx::Error> {
        let query = format!(
            "INSERT INTO allocation_user_attributes
                (allocation_user_id, allocation_id, allocation_attribute_type_id, value)
             VALUES (
                $1, $2,
                (SELECT id FROM allocation_attribute_types WHERE name = $3),
                $4
             )
             ON CONFLICT (allocation_user_id, allocation_attribute_type_id)
             DO UPDATE SET value = $4, updated_at = NOW()
             RETURNING {USER_ATTR_COLUMNS}"
        );
        sqlx::query_as::<_, AllocationUserAttribute>(&query)
            .bind(allocation_user_id)
            .bind(allocation_id)
            .bind(type_name)
            .bind(value)
            .fetch_one(executor)
            .await
    }

    /// List every per-user attribute of the named type under an allocation,
    /// regardless of membership status, in ID order.
    pub async fn list_user_attributes_for_allocation(
        executor: impl PgExecutor<'_>,
        allocation_id: DbId,
        type_name: &str,
    ) -> Result<Vec<AllocationUserAttribute>, sqlx::Error> {
        let query = format!(
            "SELECT {USER_ATTR_COLUMNS} FROM allocation_user_attributes
             WHERE allocation_id = $1
               AND allocation_attribute_type_id =
                   (SELECT id FROM allocation_attribute_types WHERE name = $2)
             ORDER BY id"
        );
        sqlx::query_as::<_, AllocationUserAttribute>(&query)
            .bind(allocation_id)
            .bind(type_name)
            .fetch_all(executor)
            .await
    }

    /// Re-read a per-user attribute under a row lock.
    pub async fn lock_user_attribute(
        executor: impl PgExecutor<'_>,
        id: DbId,
    ) -> Result<Option<AllocationUserAttribute>, sqlx::Error> {
        let query = format!(
            "SELECT {USER_ATTR_COLUMNS} FROM allocation_user_attributes WHERE id = $1 FOR UPDATE"
        );
        sqlx::query_as::<_, AllocationUserAttribute>(&query)
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    /// Overwrite a per-user attribute's string value.
    pub async fn update_user_attribute_value(
        executor: impl PgExecutor<'_>,
        id: DbId,
        value: &str,
    ) -> Result<Option<AllocationUserAttribute>, sqlx::Error> {
        let query = format!(
            "UPDATE allocation_user_attributes SET value = $2, updated_at = NOW()
             WHERE id = $1
             RETURNING {USER_ATTR_COLUMNS}"
        );
        sqlx::query_as::<_, AllocationUserAttribute>(&query)
            .bind(id)
            .bind(value)
            .fetch_optional(executor)
            .await
    }

    /// Resolve a per-user attribute's type name.
    pub async fn user_attribute_type_name(
        executor: impl PgExecutor<'_>,
        user_attribute_id: DbId,
    ) -> Result<Option<String>, sqlx::Error> {
        sqlx::query_scalar::<_, String>(
            "SELECT t.name FROM allocation_user_attributes a
             JOIN allocation_attribute_types t ON t.id = a.allocation_attribute_type_id
             WHERE a.id = $1",
        )
        .bind(user_attribute_id)
        .fetch_optional(executor)
        .await
    }

    // -----------------------------------------------------------------------
    // Allocation user attribute usages
    // -----------------------------------------------------------------------

    /// Find the usage companion of a per-user attribute.
    pub async fn find_user_usage(
        executor: impl PgExecutor<'_>,
        user_attribute_id: DbId,
    ) -> Result<Option<AllocationUserAttributeUsage>, sqlx::Error> {
        let query = format!(
            "SELECT {USER_USAGE_COLUMNS} FROM allocation_user_attribute_usages
             WHERE allocation_user_attribute_id = $1"
        );
        sqlx::query_as::<_, AllocationUserAttributeUsage>(&query)
            .bind(user_attribute_id)
            .fetch_optional(executor)
            .await
    }

    /// Ensure a usage companion exists for a per-user attribute.
    pub async fn get_or_create_user_usage(
        executor: impl PgExecutor<'_>,
        user_attribute_id: DbId,
    ) -> Result<AllocationUserAttributeUsage, sqlx::Error> {
        let query = format!(
            "INSERT INTO allocation_user_attribute_usages (allocation_user_attribute_id)
             VALUES ($1)
             ON CONFLICT (allocation_user_attribute_id) DO UPDATE SET updated_at = NOW()
             RETURNING {USER_USAGE_COLUMNS}"
        );
        sqlx::query_as::<_, AllocationUserAttributeUsage>(&query)
            .bind(user_attribute_id)
            .fetch_one(executor)
            .await
    }

    /// Re-read a per-user usage row under a row lock.
    pub async fn lock_user_usage(
        executor: impl PgExecutor<'_>,
        id: DbId,
    ) -> Result<Option<AllocationUserAttributeUsage>, sqlx::Error> {
        let query = format!(
            "SELECT {USER_USAGE_COLUMNS} FROM allocation_user_attribute_usages WHERE id = $1 FOR UPDATE"
        );
        sqlx::query_as::<_, AllocationUserAttributeUsage>(&query)
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    /// Overwrite a per-user usage value.
    pub async fn update_user_usage_value(
        executor: impl PgExecutor<'_>,
        id: DbId,
        value: Decimal,
    ) -> Result<Option<AllocationUserAttributeUsage>, sqlx::Error> {
        let query = format!(
            "UPDATE allocation_user_attribute_usages SET value = $2, updated_at = NOW()
             WHERE id = $1
             RETURNING {USER_USAGE_COLUMNS}"
        );
        sqlx::query_as::<_, AllocationUserAttributeUsage>(&query)
            .bind(id)
            .bind(value)
            .fetch_optional(executor)
            .await
    }
}
