//! Integration tests for the renewal request runners.

mod common;

use chrono::{Duration, Utc};
use common::{add_member, config, create_user, dec, fund_project};
use sqlx::PgPool;

use granta_accounting::runners::{
    RenewalApprovalRunner, RenewalDenialRunner, RenewalProcessingRunner,
};
use granta_core::su::{CLUSTER_ACCOUNT_STATUS_ATTRIBUTE, SERVICE_UNITS_ATTRIBUTE};
use granta_core::types::DbId;
use granta_db::models::request::{CreateNewProjectRequest, CreateRenewalRequest, RenewalRequest};
use granta_db::repositories::{
    AllocationRepo, AllocationUserRepo, AttributeRepo, NewProjectRequestRepo, PeriodRepo,
    ProjectRepo, ProjectUserRepo, RenewalRequestRepo, UserRepo,
};
use granta_notify::EnqueueEmailStrategy;

const ADMIN_CC: &str = "admin@example.edu";

async fn create_request(
    pool: &PgPool,
    requester_id: DbId,
    pi_id: DbId,
    pre_project_id: DbId,
    post_project_id: DbId,
    period_id: DbId,
    status: &str,
) -> RenewalRequest {
    RenewalRequestRepo::create(
        pool,
        &CreateRenewalRequest {
            requester_id,
            pi_id,
            pre_project_id,
            post_project_id,
            allocation_period_id: period_id,
            status: status.to_string(),
            new_project_request_id: None,
        },
    )
    .await
    .unwrap()
}

async fn create_period_starting_today(pool: &PgPool, name: &str) -> granta_db::models::period::AllocationPeriod {
    let today = Utc::now().date_naive();
    PeriodRepo::create(pool, name, today, today + Duration::days(364))
        .await
        .unwrap()
}

// ---------------------------------------------------------------------------
// Approval
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn test_approval_stores_grant_and_notifies(pool: PgPool) {
    let funded = fund_project(&pool, "fc_approve", "100.00", "0.00").await;
    let pi = create_user(&pool, "pi").await;
    let period = create_period_starting_today(&pool, "Allowance Year 2026 - 2027").await;
    let request = create_request(
        &pool,
        pi.id,
        pi.id,
        funded.project.id,
        funded.project.id,
        period.id,
        "Under Review",
    )
    .await;

    let outbox = EnqueueEmailStrategy::new();
    let runner = RenewalApprovalRunner::new(
        request.clone(),
        dec("300000.00"),
        &outbox,
        vec![ADMIN_CC.to_string()],
    );
    let updated = runner.run(&pool, &config()).await.unwrap();

    assert_eq!(updated.num_service_units, Some(dec("300000.00")));
    assert!(updated.approval_time.is_some());
    let status = RenewalRequestRepo::status_name(&pool, request.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(status, "Approved");

    let sent = outbox.get_queue();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].subject, "Allowance renewal approved for fc_approve");
    assert_eq!(sent[0].cc, vec![ADMIN_CC.to_string()]);
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_approval_requires_under_review(pool: PgPool) {
    let funded = fund_project(&pool, "fc_twice", "100.00", "0.00").await;
    let pi = create_user(&pool, "pi").await;
    let period = create_period_starting_today(&pool, "Allowance Year 2026 - 2027").await;
    let request = create_request(
        &pool,
        pi.id,
        pi.id,
        funded.project.id,
        funded.project.id,
        period.id,
        "Approved",
    )
    .await;

    let outbox = EnqueueEmailStrategy::new();
    let runner = RenewalApprovalRunner::new(request, dec("100.00"), &outbox, vec![]);
    let error = runner.run(&pool, &config()).await.unwrap_err();
    assert!(error.is_invariant(), "got: {error}");
    assert!(outbox.get_queue().is_empty());
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_approval_rejected_after_period_end(pool: PgPool) {
    let funded = fund_project(&pool, "fc_late", "100.00", "0.00").await;
    let pi = create_user(&pool, "pi").await;
    let today = Utc::now().date_naive();
    let period = PeriodRepo::create(
        &pool,
        "Allowance Year 2020 - 2021",
        today - Duration::days(730),
        today - Duration::days(365),
    )
    .await
    .unwrap();
    let request = create_request(
        &pool,
        pi.id,
        pi.id,
        funded.project.id,
        funded.project.id,
        period.id,
        "Under Review",
    )
    .await;

    let outbox = EnqueueEmailStrategy::new();
    let runner = RenewalApprovalRunner::new(request, dec("100.00"), &outbox, vec![]);
    let error = runner.run(&pool, &config()).await.unwrap_err();
    assert_eq!(
        error.to_string(),
        format!("AllocationPeriod {} has already ended.", period.id)
    );
}

// ---------------------------------------------------------------------------
// Processing
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn test_unpooled_processing_activates_and_grants(pool: PgPool) {
    let funded = fund_project(&pool, "fc_proc", "100.00", "50.00").await;
    ProjectRepo::set_status(&pool, funded.project.id, "Inactive")
        .await
        .unwrap();
    AllocationRepo::set_status(&pool, funded.allocation_id, "Expired")
        .await
        .unwrap();
    let pi = create_user(&pool, "pi").await;
    let period = create_period_starting_today(&pool, "Allowance Year 2026 - 2027").await;
    let request = create_request(
        &pool,
        pi.id,
        pi.id,
        funded.project.id,
        funded.project.id,
        period.id,
        "Approved",
    )
    .await;

    let outbox = EnqueueEmailStrategy::new();
    let runner = RenewalProcessingRunner::new(
        request.clone(),
        dec("300000.00"),
        &outbox,
        vec![ADMIN_CC.to_string()],
    );
    runner.run(&pool, &config()).await.unwrap();

    let project = ProjectRepo::find_by_id(&pool, funded.project.id)
        .await
        .unwrap()
        .unwrap();
    let project_status = ProjectRepo::status_name(&pool, project.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(project_status, "Active");

    let allocation = AllocationRepo::find_by_id(&pool, funded.allocation_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(allocation.start_date, Some(period.start_date));
    assert_eq!(allocation.end_date, Some(period.end_date));
    let allocation_status = AllocationRepo::status_name(&pool, allocation.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(allocation_status, "Active");

    let attribute =
        AttributeRepo::find_attribute(&pool, funded.allocation_id, SERVICE_UNITS_ATTRIBUTE)
            .await
            .unwrap()
            .unwrap();
    assert_eq!(attribute.value, "300000.00");

    // The PI holds the role, is flagged, and has pending cluster access.
    let membership = ProjectUserRepo::find_detail(&pool, funded.project.id, pi.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(membership.role, "Principal Investigator");
    assert_eq!(membership.status, "Active");
    let pi = UserRepo::find_by_id(&pool, pi.id).await.unwrap().unwrap();
    assert!(pi.is_pi);
    let allocation_user = AllocationUserRepo::find(&pool, funded.allocation_id, pi.id)
        .await
        .unwrap()
        .unwrap();
    let access = AttributeRepo::find_user_attribute(
        &pool,
        allocation_user.id,
        CLUSTER_ACCOUNT_STATUS_ATTRIBUTE,
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(access.value, "Pending - Add");

    let status = RenewalRequestRepo::status_name(&pool, request.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(status, "Complete");

    let sent = outbox.get_queue();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].subject, "Allowance renewal processed for fc_proc");
    assert!(sent[0].body.contains("granted 300000.00 service units"));
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_pooled_processing_adds_allowance_and_updates_members(pool: PgPool) {
    // fc_post already belongs to another PI; renewing into it pools.
    let post = fund_project(&pool, "fc_post", "100.00", "0.00").await;
    let resident = add_member(&pool, &post, "resident", "100.00", "10.00").await;
    ProjectUserRepo::upsert(
        &pool,
        post.project.id,
        resident.user.id,
        "Principal Investigator",
        "Active",
    )
    .await
    .unwrap();

    // fc_pre keeps a second PI behind, so the leaver is demoted, not the
    // project deactivated.
    let pre = fund_project(&pool, "fc_pre", "100.00", "0.00").await;
    let leaver = create_user(&pool, "leaver").await;
    let stayer = create_user(&pool, "stayer").await;
    ProjectUserRepo::upsert(&pool, pre.project.id, leaver.id, "Principal Investigator", "Active")
        .await
        .unwrap();
    ProjectUserRepo::upsert(&pool, pre.project.id, stayer.id, "Principal Investigator", "Active")
        .await
        .unwrap();

    let period = create_period_starting_today(&pool, "Allowance Year 2026 - 2027").await;
    let request = create_request(
        &pool,
        leaver.id,
        leaver.id,
        pre.project.id,
        post.project.id,
        period.id,
        "Approved",
    )
    .await;

    let outbox = EnqueueEmailStrategy::new();
    let runner = RenewalProcessingRunner::new(request, dec("200.00"), &outbox, vec![]);
    runner.run(&pool, &config()).await.unwrap();

    // 100 existing + 200 granted.
    let attribute =
        AttributeRepo::find_attribute(&pool, post.allocation_id, SERVICE_UNITS_ATTRIBUTE)
            .await
            .unwrap()
            .unwrap();
    assert_eq!(attribute.value, "300.00");

    // Existing members' allowances follow; usages are untouched.
    let resident_attribute = AttributeRepo::find_user_attribute(
        &pool,
        resident.allocation_user_id,
        SERVICE_UNITS_ATTRIBUTE,
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(resident_attribute.value, "300.00");
    let resident_usage = AttributeRepo::find_user_usage(&pool, resident.user_attribute_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(resident_usage.value, dec("10.00"));

    // Pooled grants extend the end date but keep the start date.
    let allocation = AllocationRepo::find_by_id(&pool, post.allocation_id)
        .await
        .unwrap()
        .unwrap();
    assert_ne!(allocation.start_date, Some(period.start_date));
    assert_eq!(allocation.end_date, Some(period.end_date));

    // The leaver is demoted on the pre-project, which stays active.
    let demoted = ProjectUserRepo::find_detail(&pool, pre.project.id, leaver.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(demoted.role, "User");
    let pre_status = ProjectRepo::status_name(&pool, pre.project.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(pre_status, "Active");
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_unclaimed_pre_project_is_deactivated(pool: PgPool) {
    let pre = fund_project(&pool, "fc_solo", "100.00", "0.00").await;
    let post = fund_project(&pool, "fc_fresh", "0.00", "0.00").await;
    let pi = create_user(&pool, "pi").await;
    ProjectUserRepo::upsert(&pool, pre.project.id, pi.id, "Principal Investigator", "Active")
        .await
        .unwrap();

    let period = create_period_starting_today(&pool, "Allowance Year 2026 - 2027").await;
    let request = create_request(
        &pool,
        pi.id,
        pi.id,
        pre.project.id,
        post.project.id,
        period.id,
        "Approved",
    )
    .await;

    let outbox = EnqueueEmailStrategy::new();
    let runner = RenewalProcessingRunner::new(request, dec("300000.00"), &outbox, vec![]);
    runner.run(&pool, &config()).await.unwrap();

    let pre_status = ProjectRepo::status_name(&pool, pre.project.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(pre_status, "Inactive");
    let pre_allocation = AllocationRepo::find_by_id(&pool, pre.allocation_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(pre_allocation.end_date, None);
    let pre_allocation_status = AllocationRepo::status_name(&pool, pre.allocation_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(pre_allocation_status, "Expired");
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_failed_processing_sends_nothing(pool: PgPool) {
    let funded = fund_project(&pool, "fc_noproc", "100.00", "0.00").await;
    let pi = create_user(&pool, "pi").await;
    let period = create_period_starting_today(&pool, "Allowance Year 2026 - 2027").await;
    // Wrong status: the precondition fails inside the transaction.
    let request = create_request(
        &pool,
        pi.id,
        pi.id,
        funded.project.id,
        funded.project.id,
        period.id,
        "Under Review",
    )
    .await;

    let outbox = EnqueueEmailStrategy::new();
    let runner = RenewalProcessingRunner::new(request.clone(), dec("100.00"), &outbox, vec![]);
    let error = runner.run(&pool, &config()).await.unwrap_err();
    assert!(error.is_invariant(), "got: {error}");

    assert!(outbox.get_queue().is_empty());
    let attribute =
        AttributeRepo::find_attribute(&pool, funded.allocation_id, SERVICE_UNITS_ATTRIBUTE)
            .await
            .unwrap()
            .unwrap();
    assert_eq!(attribute.value, "100.00");
}

// ---------------------------------------------------------------------------
// Denial
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../migrations")]
async fn test_denial_records_justification(pool: PgPool) {
    let funded = fund_project(&pool, "fc_denied", "100.00", "0.00").await;
    let pi = create_user(&pool, "pi").await;
    let period = create_period_starting_today(&pool, "Allowance Year 2026 - 2027").await;
    let request = create_request(
        &pool,
        pi.id,
        pi.id,
        funded.project.id,
        funded.project.id,
        period.id,
        "Under Review",
    )
    .await;

    let outbox = EnqueueEmailStrategy::new();
    let runner = RenewalDenialRunner::new(
        request.clone(),
        "Insufficient justification provided.",
        &outbox,
        vec![],
    );
    let updated = runner.run(&pool).await.unwrap();

    let status = RenewalRequestRepo::status_name(&pool, request.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(status, "Denied");
    assert!(updated.completion_time.is_some());
    assert_eq!(updated.state["status"], "Denied");
    assert_eq!(
        updated.state["justification"],
        "Insufficient justification provided."
    );

    // The project was not created for this request, so it is left alone.
    let project_status = ProjectRepo::status_name(&pool, funded.project.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(project_status, "Active");

    let sent = outbox.get_queue();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].subject, "Allowance renewal denied for fc_denied");
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_denial_also_denies_a_request_created_project(pool: PgPool) {
    let post = fund_project(&pool, "fc_made", "0.00", "0.00").await;
    let pi = create_user(&pool, "pi").await;
    let period = create_period_starting_today(&pool, "Allowance Year 2026 - 2027").await;
    let new_project_request = NewProjectRequestRepo::create(
        &pool,
        &CreateNewProjectRequest {
            requester_id: pi.id,
            pi_id: pi.id,
            project_id: post.project.id,
            allocation_period_id: period.id,
            status: "Under Review".to_string(),
        },
    )
    .await
    .unwrap();
    let request = RenewalRequestRepo::create(
        &pool,
        &CreateRenewalRequest {
            requester_id: pi.id,
            pi_id: pi.id,
            pre_project_id: post.project.id,
            post_project_id: post.project.id,
            allocation_period_id: period.id,
            status: "Under Review".to_string(),
            new_project_request_id: Some(new_project_request.id),
        },
    )
    .await
    .unwrap();

    let outbox = EnqueueEmailStrategy::new();
    let runner = RenewalDenialRunner::new(request, "Duplicate request.", &outbox, vec![]);
    runner.run(&pool).await.unwrap();

    let project_status = ProjectRepo::status_name(&pool, post.project.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(project_status, "Denied");
}

#[sqlx::test(migrations = "../../migrations")]
async fn test_completed_request_cannot_be_denied(pool: PgPool) {
    let funded = fund_project(&pool, "fc_done", "100.00", "0.00").await;
    let pi = create_user(&pool, "pi").await;
    let period = create_period_starting_today(&pool, "Allowance Year 2026 - 2027").await;
    let request = create_request(
        &pool,
        pi.id,
        pi.id,
        funded.project.id,
        funded.project.id,
        period.id,
        "Complete",
    )
    .await;

    let outbox = EnqueueEmailStrategy::new();
    let runner = RenewalDenialRunner::new(request, "Too late.", &outbox, vec![]);
    let error = runner.run(&pool).await.unwrap_err();
    assert!(error.is_invariant(), "got: {error}");
    assert!(outbox.get_queue().is_empty());
}
