//! The pure part of the job admission decision.
//!
//! Given the already-loaded SU balances for an account and a member, decide
//! whether a job of a given cost may run. Resolution of the balances (and
//! the surrounding not-found / invariant handling) lives in
//! `granta-accounting`.

use rust_decimal::Decimal;

use crate::allowance::AccountClass;

/// The four balances consulted by the budget check.
#[derive(Debug, Clone, Copy)]
pub struct BudgetSnapshot {
    pub account_allowance: Decimal,
    pub account_usage: Decimal,
    pub user_allowance: Decimal,
    pub user_usage: Decimal,
}

/// Outcome of the budget check: a legitimate business decision, not an
/// error, in both directions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobDecision {
    pub approved: bool,
    pub message: String,
}

/// The approval message for a given job cost.
pub fn approval_message(job_cost: Decimal) -> String {
    format!("A job with job_cost {job_cost} can be submitted.")
}

/// Decide whether a job may run without breaching the account's or the
/// user's SU budget. Unmetered (Condo) accounts are exempt from both checks.
pub fn decide_job_submission(
    job_cost: Decimal,
    class: Option<AccountClass>,
    snapshot: &BudgetSnapshot,
) -> JobDecision {
    if class.is_some_and(|c| c.has_unlimited_service_units()) {
        return JobDecision {
            approved: true,
            message: approval_message(job_cost),
        };
    }

    if job_cost + snapshot.account_usage > snapshot.account_allowance {
        return JobDecision {
            approved: false,
            message: format!(
                "Adding job_cost {job_cost} to account balance {} would exceed \
                 account allocation {}.",
                snapshot.account_usage, snapshot.account_allowance
            ),
        };
    }

    if job_cost + snapshot.user_usage > snapshot.user_allowance {
        return JobDecision {
            approved: false,
            message: format!(
                "Adding job_cost {job_cost} to user balance {} would exceed \
                 user allocation {}.",
                snapshot.user_usage, snapshot.user_allowance
            ),
        };
    }

    JobDecision {
        approved: true,
        message: approval_message(job_cost),
    }
}
