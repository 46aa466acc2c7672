//! The allocation-period start procedure.
//!
//! Deactivates projects left over from the previous period, then processes
//! the scheduled new-project and approved renewal requests for the new one.
//! Each project and each request is handled in its own transaction so one
//! failure never poisons the rest, and the whole procedure is idempotent: a
//! re-run selects nothing.

use chrono::Utc;
use granta_core::allowance::{AccountClass, PeriodCategory, COMPUTE_RESOURCE};
use granta_core::config::{AllowanceAmounts, LedgerConfig};
use granta_core::proration::prorated_allocation_amount;
use granta_core::types::Timestamp;
use granta_notify::EmailStrategy;
use rust_decimal::Decimal;
use sqlx::PgPool;

use granta_db::models::period::AllocationPeriod;
use granta_db::models::project::Project;
use granta_db::repositories::{
    AllocationRepo, NewProjectRequestRepo, ProjectRepo, RenewalRequestRepo,
};

use crate::error::EngineError;
use crate::facade::{self, SetServiceUnits};
use crate::objects::AccountingObjects;
use crate::runners::{NewProjectProcessingRunner, RenewalProcessingRunner};

const NEW_PROJECT_REQUEST_TYPE: &str = "SavioProjectAllocationRequest";
const RENEWAL_REQUEST_TYPE: &str = "AllocationRenewalRequest";

/// What the run did (or would do), one line per action, in order.
#[derive(Debug, Default)]
pub struct PeriodStartReport {
    pub lines: Vec<String>,
    pub errors: Vec<String>,
}

/// Drives the start-of-period procedure for one allocation period.
pub struct StartPeriodRunner<'a> {
    period: AllocationPeriod,
    skip_deactivations: bool,
    dry_run: bool,
    email: &'a dyn EmailStrategy,
    admin_cc: Vec<String>,
}

impl<'a> StartPeriodRunner<'a> {
    pub fn new(
        period: AllocationPeriod,
        skip_deactivations: bool,
        dry_run: bool,
        email: &'a dyn EmailStrategy,
        admin_cc: Vec<String>,
    ) -> Self {
        Self {
            period,
            skip_deactivations,
            dry_run,
            email,
            admin_cc,
        }
    }

    pub async fn run(
        &self,
        pool: &PgPool,
        config: &LedgerConfig,
        amounts: &AllowanceAmounts,
    ) -> Result<PeriodStartReport, EngineError> {
        let period = &self.period;

        // The period must actually be underway, except in a dry run, which
        // may be rehearsed ahead of the start date.
        if !self.dry_run {
            let today = Utc::now().date_naive();
            if today < period.start_date || today > period.end_date {
                return Err(EngineError::validation(format!(
                    "AllocationPeriod {}'s time range ({}, {}) is not current.",
                    period.id, period.start_date, period.end_date
                )));
            }
        }

        let mut report = PeriodStartReport::default();

        if !self.skip_deactivations {
            self.deactivate_projects(pool, config, &mut report).await?;
        }
        self.process_new_project_requests(pool, config, amounts, &mut report)
            .await?;
        self.process_renewal_requests(pool, config, amounts, &mut report)
            .await?;
        Ok(report)
    }

    // -----------------------------------------------------------------------
    // Phase A: deactivations
    // -----------------------------------------------------------------------

    /// Deactivate projects of the period's account classes that were not
    /// renewed into it. Any failure aborts the run before request
    /// processing, since granting on top of stale balances would corrupt
    /// them.
    async fn deactivate_projects(
        &self,
        pool: &PgPool,
        config: &LedgerConfig,
        report: &mut PeriodStartReport,
    ) -> Result<(), EngineError> {
        let category = PeriodCategory::from_period_name(&self.period.name);
        let mut gate_failures = Vec::new();

        for class in category.account_classes() {
            let projects = ProjectRepo::find_deactivation_eligible(
                pool,
                class.prefix(),
                COMPUTE_RESOURCE,
                self.period.start_date,
            )
            .await?;
            let total = projects.len();
            let mut failures = 0usize;

            for project in &projects {
                if self.dry_run {
                    match self.check_accounting_objects(pool, project).await {
                        Ok(()) => report.lines.push(format!(
                            "Would deactivate Project {} ({}) and reset Service Units.",
                            project.id, project.name
                        )),
                        Err(error) => {
                            tracing::error!(%error, project_id = project.id, "Dry-run check failed.");
                            report.errors.push(format!(
                                "Failed to retrieve expected accounting objects for Project {} ({}).",
                                project.id, project.name
                            ));
                            failures += 1;
                        }
                    }
                    continue;
                }
                match deactivate_project(pool, config, project).await {
                    Ok(()) => report.lines.push(format!(
                        "Deactivated Project {} ({}) and reset Service Units.",
                        project.id, project.name
                    )),
                    Err(error) => {
                        tracing::error!(%error, project_id = project.id, "Deactivation failed.");
                        report.errors.push(format!(
                            "Failed to deactivate Project {} ({}).",
                            project.id, project.name
                        ));
                        failures += 1;
                    }
                }
            }

            if failures > 0 {
                gate_failures.push(format!(
                    "Failed to deactivate {failures}/{total} \"{}\" Projects.",
                    class.display_name()
                ));
            }
        }

        if gate_failures.is_empty() {
            Ok(())
        } else {
            Err(EngineError::invariant(gate_failures.join(" ")))
        }
    }

    async fn check_accounting_objects(
        &self,
        pool: &PgPool,
        project: &Project,
    ) -> Result<(), EngineError> {
        let mut conn = pool.acquire().await?;
        AccountingObjects::load(&mut conn, project, None).await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Phases B and C: request processing
    // -----------------------------------------------------------------------

    async fn process_new_project_requests(
        &self,
        pool: &PgPool,
        config: &LedgerConfig,
        amounts: &AllowanceAmounts,
        report: &mut PeriodStartReport,
    ) -> Result<(), EngineError> {
        let requests = NewProjectRequestRepo::list_by_period_and_status(
            pool,
            self.period.id,
            "Approved - Scheduled",
        )
        .await?;
        let total = requests.len();
        let mut successes = 0usize;
        let mut failures = 0usize;

        for request in requests {
            let num = match self
                .grant_amount(pool, request.project_id, request.request_time, amounts)
                .await
            {
                Ok(num) => num,
                Err(error) => {
                    report.errors.push(format!(
                        "Failed to compute service units to grant to {NEW_PROJECT_REQUEST_TYPE} {}: {error}",
                        request.id
                    ));
                    failures += 1;
                    continue;
                }
            };
            if self.dry_run {
                report.lines.push(format!(
                    "Would process {NEW_PROJECT_REQUEST_TYPE} {} with {num} service units.",
                    request.id
                ));
                continue;
            }
            let request_id = request.id;
            let runner =
                NewProjectProcessingRunner::new(request, num, self.email, self.admin_cc.clone());
            match runner.run(pool, config).await {
                Ok(_) => {
                    report.lines.push(format!(
                        "Processed {NEW_PROJECT_REQUEST_TYPE} {request_id} with {num} service units."
                    ));
                    successes += 1;
                }
                Err(error) => {
                    tracing::error!(%error, request_id, "Request processing failed.");
                    report.errors.push(format!(
                        "Failed to process {NEW_PROJECT_REQUEST_TYPE} {request_id}: {error}"
                    ));
                    failures += 1;
                }
            }
        }

        if !self.dry_run {
            report.lines.push(format!(
                "Processed {total} {NEW_PROJECT_REQUEST_TYPE}s, with {successes} successes and {failures} failures."
            ));
        }
        Ok(())
    }

    async fn process_renewal_requests(
        &self,
        pool: &PgPool,
        config: &LedgerConfig,
        amounts: &AllowanceAmounts,
        report: &mut PeriodStartReport,
    ) -> Result<(), EngineError> {
        let requests =
            RenewalRequestRepo::list_by_period_and_status(pool, self.period.id, "Approved").await?;
        let total = requests.len();
        let mut successes = 0usize;
        let mut failures = 0usize;

        for request in requests {
            let num = match self
                .grant_amount(pool, request.post_project_id, request.request_time, amounts)
                .await
            {
                Ok(num) => num,
                Err(error) => {
                    report.errors.push(format!(
                        "Failed to compute service units to grant to {RENEWAL_REQUEST_TYPE} {}: {error}",
                        request.id
                    ));
                    failures += 1;
                    continue;
                }
            };
            if self.dry_run {
                report.lines.push(format!(
                    "Would process {RENEWAL_REQUEST_TYPE} {} with {num} service units.",
                    request.id
                ));
                continue;
            }
            let request_id = request.id;
            let runner =
                RenewalProcessingRunner::new(request, num, self.email, self.admin_cc.clone());
            match runner.run(pool, config).await {
                Ok(_) => {
                    report.lines.push(format!(
                        "Processed {RENEWAL_REQUEST_TYPE} {request_id} with {num} service units."
                    ));
                    successes += 1;
                }
                Err(error) => {
                    tracing::error!(%error, request_id, "Request processing failed.");
                    report.errors.push(format!(
                        "Failed to process {RENEWAL_REQUEST_TYPE} {request_id}: {error}"
                    ));
                    failures += 1;
                }
            }
        }

        if !self.dry_run {
            report.lines.push(format!(
                "Processed {total} {RENEWAL_REQUEST_TYPE}s, with {successes} successes and {failures} failures."
            ));
        }
        Ok(())
    }

    /// The number of service units a request's project is entitled to,
    /// prorated from the request time for the classes granted by the year.
    async fn grant_amount(
        &self,
        pool: &PgPool,
        project_id: granta_core::types::DbId,
        request_time: Timestamp,
        amounts: &AllowanceAmounts,
    ) -> Result<Decimal, EngineError> {
        let project = ProjectRepo::find_by_id(pool, project_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Project", project_id))?;
        let no_allowance = || {
            EngineError::validation(format!(
                "Project {} has no computing allowance.",
                project.name
            ))
        };
        let class = AccountClass::from_project_name(&project.name).ok_or_else(no_allowance)?;
        let base = amounts.for_class(class).ok_or_else(no_allowance)?;
        let amount = if class.is_prorated() {
            prorated_allocation_amount(
                base,
                request_time.date_naive(),
                self.period.start_date,
                self.period.end_date,
            )
        } else {
            base
        };
        Ok(amount)
    }
}

/// Deactivate one project and expire its compute allocation, zeroing the
/// project and member usages. Allowances are left as-is; the processing
/// runners overwrite them when the project is renewed.
async fn deactivate_project(
    pool: &PgPool,
    config: &LedgerConfig,
    project: &Project,
) -> Result<(), EngineError> {
    let zero = Decimal::new(0, 2);
    let mut tx = pool.begin().await?;

    let objects = AccountingObjects::load(&mut tx, project, None).await?;
    ProjectRepo::set_status(&mut *tx, project.id, "Inactive")
        .await?
        .ok_or_else(|| EngineError::not_found("Project", project.id))?;
    AllocationRepo::set_status(&mut *tx, objects.allocation.id, "Expired").await?;
    AllocationRepo::set_dates(&mut *tx, objects.allocation.id, objects.allocation.start_date, None)
        .await?;

    let changes = SetServiceUnits {
        allocation_usage: Some(zero),
        user_usage: Some(zero),
        ..Default::default()
    };
    facade::apply_service_units(&mut tx, &objects, config, &changes).await?;

    tx.commit().await?;
    Ok(())
}
