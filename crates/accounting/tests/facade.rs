//! Integration tests for the composite service-unit facade.

mod common;

use common::{add_member, config, create_user, dec, fund_project};
use sqlx::PgPool;

use granta_accounting::facade::{self, SetServiceUnits};
use granta_accounting::objects::AccountingObjects;
use granta_core::su::SERVICE_UNITS_ATTRIBUTE;
use granta_db::repositories::{AllocationUserRepo, AttributeRepo};

async fn load_objects(pool: &PgPool, project: &granta_db::models::project::Project) -> AccountingObjects {
    let mut conn = pool.acquire().await.unwrap();
    AccountingObjects::load(&mut conn, project, None)
        .await
        .unwrap()
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_changes_apply_to_project_and_every_member(pool: PgPool) {
    let funded = fund_project(&pool, "fc_facade", "1000.00", "100.00").await;
    let alice = add_member(&pool, &funded, "alice", "1000.00", "40.00").await;
    let bob = add_member(&pool, &funded, "bob", "1000.00", "60.00").await;

    let objects = load_objects(&pool, &funded.project).await;
    let changes = SetServiceUnits {
        allocation_allowance: Some(dec("2000.00")),
        allocation_usage: Some(dec("0.00")),
        user_allowance: Some(dec("2000.00")),
        user_usage: Some(dec("0.00")),
        ..Default::default()
    };
    facade::set_service_units(&pool, &objects, &config(), &changes)
        .await
        .unwrap();

    let attribute =
        AttributeRepo::find_attribute(&pool, funded.allocation_id, SERVICE_UNITS_ATTRIBUTE)
            .await
            .unwrap()
            .unwrap();
    assert_eq!(attribute.value, "2000.00");
    let usage = AttributeRepo::find_usage(&pool, funded.attribute_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(usage.value, dec("0.00"));

    for member in [&alice, &bob] {
        let user_attribute = AttributeRepo::find_user_attribute(
            &pool,
            member.allocation_user_id,
            SERVICE_UNITS_ATTRIBUTE,
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(user_attribute.value, "2000.00");
        let user_usage = AttributeRepo::find_user_usage(&pool, member.user_attribute_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(user_usage.value, dec("0.00"));
    }
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_mid_iteration_failure_rolls_back_everything(pool: PgPool) {
    let funded = fund_project(&pool, "fc_rollback", "1000.00", "100.00").await;
    let alice = add_member(&pool, &funded, "alice", "1000.00", "40.00").await;
    let bob = add_member(&pool, &funded, "bob", "1000.00", "60.00").await;

    // Deleting bob's usage row makes the second iteration step fail after
    // alice's rows were already written inside the transaction.
    sqlx::query("DELETE FROM allocation_user_attribute_usages WHERE id = $1")
        .bind(bob.user_usage_id)
        .execute(&pool)
        .await
        .unwrap();

    let objects = load_objects(&pool, &funded.project).await;
    let changes = SetServiceUnits {
        allocation_usage: Some(dec("0.00")),
        user_usage: Some(dec("0.00")),
        ..Default::default()
    };
    let error = facade::set_service_units(&pool, &objects, &config(), &changes)
        .await
        .unwrap_err();
    assert!(error.is_invariant(), "got: {error}");

    // Nothing committed, alice included.
    let usage = AttributeRepo::find_usage(&pool, funded.attribute_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(usage.value, dec("100.00"));
    let alice_usage = AttributeRepo::find_user_usage(&pool, alice.user_attribute_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(alice_usage.value, dec("40.00"));
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_out_of_bounds_value_rejected_before_any_write(pool: PgPool) {
    let funded = fund_project(&pool, "fc_bounds", "1000.00", "100.00").await;

    let objects = load_objects(&pool, &funded.project).await;
    let changes = SetServiceUnits {
        allocation_allowance: Some(dec("-1.00")),
        allocation_usage: Some(dec("0.00")),
        ..Default::default()
    };
    let result = facade::set_service_units(&pool, &objects, &config(), &changes).await;
    assert!(result.is_err());

    let attribute =
        AttributeRepo::find_attribute(&pool, funded.allocation_id, SERVICE_UNITS_ATTRIBUTE)
            .await
            .unwrap()
            .unwrap();
    assert_eq!(attribute.value, "1000.00");
    let usage = AttributeRepo::find_usage(&pool, funded.attribute_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(usage.value, dec("100.00"));
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_members_without_service_units_attribute_are_skipped(pool: PgPool) {
    let funded = fund_project(&pool, "fc_partial", "1000.00", "0.00").await;
    let alice = add_member(&pool, &funded, "alice", "1000.00", "0.00").await;

    // A bare allocation membership with no Service Units rows at all.
    let ghost = create_user(&pool, "ghost").await;
    AllocationUserRepo::get_or_create_active(&pool, funded.allocation_id, ghost.id)
        .await
        .unwrap();

    let objects = load_objects(&pool, &funded.project).await;
    let changes = SetServiceUnits {
        user_allowance: Some(dec("500.00")),
        ..Default::default()
    };
    facade::set_service_units(&pool, &objects, &config(), &changes)
        .await
        .unwrap();

    let user_attribute = AttributeRepo::find_user_attribute(
        &pool,
        alice.allocation_user_id,
        SERVICE_UNITS_ATTRIBUTE,
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(user_attribute.value, "500.00");
}
