//! The job admission decision: may a job of a given cost run against a
//! given user and account?
//!
//! Read-only: no locks, no writes. The decision may race a concurrent
//! balance correction; the worst case is one job admitted against a stale
//! balance, tolerated as a business risk.

use granta_core::admission::{decide_job_submission, BudgetSnapshot};
use granta_core::allowance::AccountClass;
use granta_core::config::LedgerConfig;
use granta_core::su::{parse_job_cost, parse_stored_allowance};
use sqlx::PgPool;

use granta_db::repositories::{ProjectRepo, UserRepo};

use crate::objects::{AccountingObjects, LoadError};

/// HTTP-status class of an admission outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    /// A decision was made, approving or not (200).
    Ok,
    /// The input was malformed or named missing entities (400).
    ClientError,
    /// An internal inconsistency was detected (500).
    ServerError,
}

/// The admission decision, ready for serialization at the HTTP edge.
#[derive(Debug, Clone)]
pub struct JobSubmissionOutcome {
    pub success: bool,
    pub message: String,
    pub status: StatusClass,
}

impl JobSubmissionOutcome {
    fn affirmative(job_cost: &str) -> Self {
        Self {
            success: true,
            message: approval_message_raw(job_cost),
            status: StatusClass::Ok,
        }
    }

    fn non_affirmative(message: String) -> Self {
        Self {
            success: false,
            message,
            status: StatusClass::Ok,
        }
    }

    fn client_error(message: String) -> Self {
        Self {
            success: false,
            message,
            status: StatusClass::ClientError,
        }
    }

    fn server_error() -> Self {
        Self {
            success: false,
            message: "Unexpected server error.".to_string(),
            status: StatusClass::ServerError,
        }
    }
}

/// The approval message, built from the raw cost string as submitted.
fn approval_message_raw(job_cost: &str) -> String {
    format!("A job with job_cost {job_cost} can be submitted.")
}

/// Decide whether a job may be submitted. Every failure path produces an
/// outcome rather than an error; database failures map to the server-error
/// outcome after logging.
pub async fn can_submit_job(
    pool: &PgPool,
    config: &LedgerConfig,
    job_cost: &str,
    user_id: &str,
    account_id: &str,
) -> JobSubmissionOutcome {
    tracing::info!(
        job_cost,
        user_id,
        account_id,
        "New can_submit_job request."
    );

    // Bypass all checks when every job is allowed.
    if config.allow_all_jobs {
        return JobSubmissionOutcome::affirmative(job_cost);
    }

    let job_cost = job_cost.trim();
    let user_id = user_id.trim();
    let account_id = account_id.trim();
    if job_cost.is_empty() {
        return JobSubmissionOutcome::client_error(format!(
            "job_cost {job_cost} is not a nonempty string."
        ));
    }
    if user_id.is_empty() {
        return JobSubmissionOutcome::client_error(format!(
            "user_id {user_id} is not a nonempty string."
        ));
    }
    if account_id.is_empty() {
        return JobSubmissionOutcome::client_error(format!(
            "account_id {account_id} is not a nonempty string."
        ));
    }

    let cost = match parse_job_cost(job_cost, config) {
        Ok(cost) => cost,
        Err(err) => return JobSubmissionOutcome::client_error(err.to_string()),
    };

    let user = match UserRepo::find_by_cluster_uid(pool, user_id).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            return JobSubmissionOutcome::client_error(format!(
                "No user exists with user_id {user_id}."
            ))
        }
        Err(error) => {
            tracing::error!(%error, "Failed to resolve user.");
            return JobSubmissionOutcome::server_error();
        }
    };

    let project = match ProjectRepo::find_by_name(pool, account_id).await {
        Ok(Some(project)) => project,
        Ok(None) => {
            return JobSubmissionOutcome::client_error(format!(
                "No account exists with account_id {account_id}."
            ))
        }
        Err(error) => {
            tracing::error!(%error, "Failed to resolve account.");
            return JobSubmissionOutcome::server_error();
        }
    };

    let mut conn = match pool.acquire().await {
        Ok(conn) => conn,
        Err(error) => {
            tracing::error!(%error, "Failed to acquire a connection.");
            return JobSubmissionOutcome::server_error();
        }
    };
    let objects = match AccountingObjects::load(&mut conn, &project, Some(&user)).await {
        Ok(objects) => objects,
        Err(
            err @ (LoadError::NotProjectMember { .. }
            | LoadError::NoActiveComputeAllocation { .. }
            | LoadError::NotAllocationMember { .. }),
        ) => {
            let message = err.to_string();
            tracing::error!(message);
            return JobSubmissionOutcome::client_error(message);
        }
        Err(error) => {
            tracing::error!(%error, "Failed to retrieve a required database object.");
            return JobSubmissionOutcome::server_error();
        }
    };

    // Condo accounts have no metered allowance; approve regardless of cost.
    let class = AccountClass::from_project_name(&project.name);
    if class.is_some_and(|c| c.has_unlimited_service_units()) {
        return JobSubmissionOutcome::affirmative(job_cost);
    }

    let user_objects = match &objects.user {
        Some(user_objects) => user_objects,
        None => return JobSubmissionOutcome::server_error(),
    };
    let account_allowance = match parse_stored_allowance(&objects.attribute.value) {
        Ok(value) => value,
        Err(error) => {
            tracing::error!(error, "Malformed stored account allowance.");
            return JobSubmissionOutcome::server_error();
        }
    };
    let user_allowance = match parse_stored_allowance(&user_objects.user_attribute.value) {
        Ok(value) => value,
        Err(error) => {
            tracing::error!(error, "Malformed stored user allowance.");
            return JobSubmissionOutcome::server_error();
        }
    };

    let snapshot = BudgetSnapshot {
        account_allowance,
        account_usage: objects.usage.value,
        user_allowance,
        user_usage: user_objects.user_usage.value,
    };
    let decision = decide_job_submission(cost, class, &snapshot);
    if decision.approved {
        JobSubmissionOutcome::affirmative(job_cost)
    } else {
        JobSubmissionOutcome::non_affirmative(decision.message)
    }
}
