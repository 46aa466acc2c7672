//! Shared fixtures for the accounting integration tests.

use std::str::FromStr;

use chrono::{Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;

use granta_core::config::LedgerConfig;
use granta_core::su::SERVICE_UNITS_ATTRIBUTE;
use granta_core::types::DbId;
use granta_db::models::period::AllocationPeriod;
use granta_db::models::project::{CreateProject, Project};
use granta_db::models::user::{CreateUser, User};
use granta_db::repositories::{
    AllocationRepo, AllocationUserRepo, AttributeRepo, PeriodRepo, ProjectRepo, ProjectUserRepo,
    UserRepo,
};

pub fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

pub fn config() -> LedgerConfig {
    LedgerConfig::default()
}

pub async fn create_user(pool: &PgPool, username: &str) -> User {
    UserRepo::create(
        pool,
        &CreateUser {
            username: username.to_string(),
            email: format!("{username}@example.edu"),
            cluster_uid: Some(format!("uid_{username}")),
            is_pi: false,
        },
    )
    .await
    .unwrap()
}

pub async fn create_project(pool: &PgPool, name: &str, status: &str) -> Project {
    ProjectRepo::create(
        pool,
        &CreateProject {
            name: name.to_string(),
            title: format!("Title for {name}"),
            status: status.to_string(),
        },
    )
    .await
    .unwrap()
}

/// A project with an active compute allocation carrying a Service Units
/// attribute and usage row.
pub struct FundedProject {
    pub project: Project,
    pub allocation_id: DbId,
    pub attribute_id: DbId,
    pub usage_id: DbId,
}

pub async fn fund_project(
    pool: &PgPool,
    name: &str,
    allowance: &str,
    usage: &str,
) -> FundedProject {
    let today = Utc::now().date_naive();
    fund_project_with_dates(
        pool,
        name,
        allowance,
        usage,
        Some(today - Duration::days(30)),
        Some(today + Duration::days(335)),
    )
    .await
}

pub async fn fund_project_with_dates(
    pool: &PgPool,
    name: &str,
    allowance: &str,
    usage: &str,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
) -> FundedProject {
    let project = create_project(pool, name, "Active").await;
    let allocation = AllocationRepo::create(
        pool,
        project.id,
        "Savio Compute",
        "Active",
        start_date,
        end_date,
    )
    .await
    .unwrap();
    let attribute =
        AttributeRepo::upsert_attribute(pool, allocation.id, SERVICE_UNITS_ATTRIBUTE, allowance)
            .await
            .unwrap();
    let usage_row = AttributeRepo::get_or_create_usage(pool, attribute.id)
        .await
        .unwrap();
    AttributeRepo::update_usage_value(pool, usage_row.id, dec(usage))
        .await
        .unwrap();
    FundedProject {
        project,
        allocation_id: allocation.id,
        attribute_id: attribute.id,
        usage_id: usage_row.id,
    }
}

/// An active project and allocation member with per-user Service Units rows.
pub struct Member {
    pub user: User,
    pub project_user_id: DbId,
    pub allocation_user_id: DbId,
    pub user_attribute_id: DbId,
    pub user_usage_id: DbId,
}

pub async fn add_member(
    pool: &PgPool,
    funded: &FundedProject,
    username: &str,
    allowance: &str,
    usage: &str,
) -> Member {
    let user = create_user(pool, username).await;
    let project_user =
        ProjectUserRepo::upsert(pool, funded.project.id, user.id, "User", "Active")
            .await
            .unwrap();
    let allocation_user = AllocationUserRepo::get_or_create_active(
        pool,
        funded.allocation_id,
        user.id,
    )
    .await
    .unwrap();
    let user_attribute = AttributeRepo::upsert_user_attribute(
        pool,
        allocation_user.id,
        funded.allocation_id,
        SERVICE_UNITS_ATTRIBUTE,
        allowance,
    )
    .await
    .unwrap();
    let user_usage = AttributeRepo::get_or_create_user_usage(pool, user_attribute.id)
        .await
        .unwrap();
    AttributeRepo::update_user_usage_value(pool, user_usage.id, dec(usage))
        .await
        .unwrap();
    Member {
        user,
        project_user_id: project_user.id,
        allocation_user_id: allocation_user.id,
        user_attribute_id: user_attribute.id,
        user_usage_id: user_usage.id,
    }
}

/// A period that contains today, so lifecycle currency checks pass.
pub async fn create_current_period(pool: &PgPool, name: &str) -> AllocationPeriod {
    let today = Utc::now().date_naive();
    PeriodRepo::create(
        pool,
        name,
        today - Duration::days(1),
        today + Duration::days(364),
    )
    .await
    .unwrap()
}
