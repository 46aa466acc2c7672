//! End-to-end tests for the allocation-period start procedure.

mod common;

use chrono::{Duration, Utc};
use common::{add_member, config, create_project, create_user, dec, fund_project_with_dates};
use sqlx::PgPool;

use granta_accounting::StartPeriodRunner;
use granta_core::config::AllowanceAmounts;
use granta_core::su::SERVICE_UNITS_ATTRIBUTE;
use granta_db::models::period::AllocationPeriod;
use granta_db::models::request::CreateNewProjectRequest;
use granta_db::repositories::{
    AllocationRepo, AttributeRepo, NewProjectRequestRepo, PeriodRepo, ProjectRepo,
};
use granta_notify::DropEmailStrategy;

async fn period_starting_today(pool: &PgPool) -> AllocationPeriod {
    let today = Utc::now().date_naive();
    PeriodRepo::create(
        pool,
        "Allowance Year 2026 - 2027",
        today,
        today + Duration::days(364),
    )
    .await
    .unwrap()
}

/// An fc_ project whose allocation lapsed before the new period.
async fn lapsed_project(pool: &PgPool, name: &str) -> common::FundedProject {
    let today = Utc::now().date_naive();
    fund_project_with_dates(
        pool,
        name,
        "100.00",
        "40.00",
        Some(today - Duration::days(395)),
        Some(today - Duration::days(30)),
    )
    .await
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_period_start_deactivates_and_processes(pool: PgPool) {
    let period = period_starting_today(&pool).await;

    let stale = lapsed_project(&pool, "fc_existing").await;
    let member = add_member(&pool, &stale, "alice", "100.00", "40.00").await;

    let fresh = create_project(&pool, "fc_new", "New").await;
    let pi = create_user(&pool, "pi").await;
    let request = NewProjectRequestRepo::create(
        &pool,
        &CreateNewProjectRequest {
            requester_id: pi.id,
            pi_id: pi.id,
            project_id: fresh.id,
            allocation_period_id: period.id,
            status: "Approved - Scheduled".to_string(),
        },
    )
    .await
    .unwrap();

    let email = DropEmailStrategy::new();
    let runner = StartPeriodRunner::new(period.clone(), false, false, &email, vec![]);
    let report = runner
        .run(&pool, &config(), &AllowanceAmounts::default())
        .await
        .unwrap();

    assert!(report.errors.is_empty(), "errors: {:?}", report.errors);
    assert!(report.lines.contains(&format!(
        "Deactivated Project {} (fc_existing) and reset Service Units.",
        stale.project.id
    )));
    assert!(report.lines.contains(&format!(
        "Processed SavioProjectAllocationRequest {} with 300000.00 service units.",
        request.id
    )));
    assert!(report.lines.contains(
        &"Processed 1 SavioProjectAllocationRequests, with 1 successes and 0 failures."
            .to_string()
    ));
    assert!(report.lines.contains(
        &"Processed 0 AllocationRenewalRequests, with 0 successes and 0 failures.".to_string()
    ));

    // The stale project is shut down with usages reset, allowance kept.
    let status = ProjectRepo::status_name(&pool, stale.project.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(status, "Inactive");
    let allocation = AllocationRepo::find_by_id(&pool, stale.allocation_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(allocation.end_date, None);
    let allocation_status = AllocationRepo::status_name(&pool, stale.allocation_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(allocation_status, "Expired");
    let usage = AttributeRepo::find_usage(&pool, stale.attribute_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(usage.value, dec("0.00"));
    let member_usage = AttributeRepo::find_user_usage(&pool, member.user_attribute_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(member_usage.value, dec("0.00"));
    let attribute =
        AttributeRepo::find_attribute(&pool, stale.allocation_id, SERVICE_UNITS_ATTRIBUTE)
            .await
            .unwrap()
            .unwrap();
    assert_eq!(attribute.value, "100.00");

    // The new project is live and funded in full.
    let fresh_status = ProjectRepo::status_name(&pool, fresh.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(fresh_status, "Active");
    let fresh_allocations = AllocationRepo::find_for_project(&pool, fresh.id, "Savio Compute")
        .await
        .unwrap();
    assert_eq!(fresh_allocations.len(), 1);
    let fresh_attribute = AttributeRepo::find_attribute(
        &pool,
        fresh_allocations[0].id,
        SERVICE_UNITS_ATTRIBUTE,
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(fresh_attribute.value, "300000.00");
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_second_run_selects_nothing(pool: PgPool) {
    let period = period_starting_today(&pool).await;
    let stale = lapsed_project(&pool, "fc_existing").await;

    let email = DropEmailStrategy::new();
    let runner = StartPeriodRunner::new(period.clone(), false, false, &email, vec![]);
    runner
        .run(&pool, &config(), &AllowanceAmounts::default())
        .await
        .unwrap();

    let report = runner
        .run(&pool, &config(), &AllowanceAmounts::default())
        .await
        .unwrap();
    assert!(report.errors.is_empty());
    assert_eq!(
        report.lines,
        vec![
            "Processed 0 SavioProjectAllocationRequests, with 0 successes and 0 failures."
                .to_string(),
            "Processed 0 AllocationRenewalRequests, with 0 successes and 0 failures."
                .to_string(),
        ]
    );

    // Still deactivated, not double-processed.
    let status = ProjectRepo::status_name(&pool, stale.project.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(status, "Inactive");
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_deactivation_failure_gates_request_processing(pool: PgPool) {
    let period = period_starting_today(&pool).await;

    let broken = lapsed_project(&pool, "fc_broken").await;
    // Removing the Service Units attribute makes the accounting objects
    // unresolvable, so the deactivation fails.
    sqlx::query("DELETE FROM allocation_attribute_usages WHERE allocation_attribute_id = $1")
        .bind(broken.attribute_id)
        .execute(&pool)
        .await
        .unwrap();
    sqlx::query("DELETE FROM allocation_attributes WHERE id = $1")
        .bind(broken.attribute_id)
        .execute(&pool)
        .await
        .unwrap();

    let fresh = create_project(&pool, "fc_waiting", "New").await;
    let pi = create_user(&pool, "pi").await;
    let request = NewProjectRequestRepo::create(
        &pool,
        &CreateNewProjectRequest {
            requester_id: pi.id,
            pi_id: pi.id,
            project_id: fresh.id,
            allocation_period_id: period.id,
            status: "Approved - Scheduled".to_string(),
        },
    )
    .await
    .unwrap();

    let email = DropEmailStrategy::new();
    let runner = StartPeriodRunner::new(period, false, false, &email, vec![]);
    let error = runner
        .run(&pool, &config(), &AllowanceAmounts::default())
        .await
        .unwrap_err();
    assert!(
        error.to_string().contains(
            "Failed to deactivate 1/1 \"Faculty Computing Allowance\" Projects."
        ),
        "got: {error}"
    );

    // The scheduled request was never touched.
    let status = NewProjectRequestRepo::status_name(&pool, request.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(status, "Approved - Scheduled");
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_dry_run_reports_without_writing(pool: PgPool) {
    let period = period_starting_today(&pool).await;
    let stale = lapsed_project(&pool, "fc_existing").await;

    let fresh = create_project(&pool, "fc_new", "New").await;
    let pi = create_user(&pool, "pi").await;
    let request = NewProjectRequestRepo::create(
        &pool,
        &CreateNewProjectRequest {
            requester_id: pi.id,
            pi_id: pi.id,
            project_id: fresh.id,
            allocation_period_id: period.id,
            status: "Approved - Scheduled".to_string(),
        },
    )
    .await
    .unwrap();

    let email = DropEmailStrategy::new();
    let runner = StartPeriodRunner::new(period, false, true, &email, vec![]);
    let report = runner
        .run(&pool, &config(), &AllowanceAmounts::default())
        .await
        .unwrap();

    assert_eq!(
        report.lines,
        vec![
            format!(
                "Would deactivate Project {} (fc_existing) and reset Service Units.",
                stale.project.id
            ),
            format!(
                "Would process SavioProjectAllocationRequest {} with 300000.00 service units.",
                request.id
            ),
        ]
    );

    // Nothing changed.
    let status = ProjectRepo::status_name(&pool, stale.project.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(status, "Active");
    let usage = AttributeRepo::find_usage(&pool, stale.attribute_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(usage.value, dec("40.00"));
    let request_status = NewProjectRequestRepo::status_name(&pool, request.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(request_status, "Approved - Scheduled");
    assert!(email.dropped().is_empty());
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_skip_deactivations_leaves_projects_alone(pool: PgPool) {
    let period = period_starting_today(&pool).await;
    let stale = lapsed_project(&pool, "fc_existing").await;

    let email = DropEmailStrategy::new();
    let runner = StartPeriodRunner::new(period, true, false, &email, vec![]);
    let report = runner
        .run(&pool, &config(), &AllowanceAmounts::default())
        .await
        .unwrap();
    assert!(report.errors.is_empty());

    let status = ProjectRepo::status_name(&pool, stale.project.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(status, "Active");
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_non_current_period_is_fatal(pool: PgPool) {
    let today = Utc::now().date_naive();
    let period = PeriodRepo::create(
        &pool,
        "Allowance Year 2020 - 2021",
        today - Duration::days(730),
        today - Duration::days(365),
    )
    .await
    .unwrap();

    let email = DropEmailStrategy::new();
    let runner = StartPeriodRunner::new(period.clone(), false, false, &email, vec![]);
    let error = runner
        .run(&pool, &config(), &AllowanceAmounts::default())
        .await
        .unwrap_err();
    assert_eq!(
        error.to_string(),
        format!(
            "AllocationPeriod {}'s time range ({}, {}) is not current.",
            period.id, period.start_date, period.end_date
        )
    );
}
