//! Runner that activates an approved new-project request at period start.

use granta_core::allowance::COMPUTE_RESOURCE;
use granta_core::config::LedgerConfig;
use granta_core::su::{validate_su_quantity, SERVICE_UNITS_ATTRIBUTE};
use granta_notify::messages::{new_project_processing_notice, NoticeRecipients};
use granta_notify::{EmailStrategy, EnqueueEmailStrategy};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};

use granta_db::models::request::NewProjectRequest;
use granta_db::repositories::{
    AllocationRepo, AttributeRepo, NewProjectRequestRepo, PeriodRepo, ProjectRepo, UserRepo,
};

use crate::error::EngineError;
use crate::ledger::{self, WriteOptions};
use crate::runners::cluster_access::ensure_pending_cluster_access;
use crate::runners::renewal::{create_allocation_users, create_project_users};

/// Processes an "Approved - Scheduled" request: activates the project and
/// its compute allocation, grants the allowance, and sets up memberships
/// and cluster access for the requester and the PI.
pub struct NewProjectProcessingRunner<'a> {
    request: NewProjectRequest,
    num_service_units: Decimal,
    email: &'a dyn EmailStrategy,
    admin_cc: Vec<String>,
}

impl<'a> NewProjectProcessingRunner<'a> {
    pub fn new(
        request: NewProjectRequest,
        num_service_units: Decimal,
        email: &'a dyn EmailStrategy,
        admin_cc: Vec<String>,
    ) -> Self {
        Self {
            request,
            num_service_units,
            email,
            admin_cc,
        }
    }

    pub async fn run(
        &self,
        pool: &PgPool,
        config: &LedgerConfig,
    ) -> Result<NewProjectRequest, EngineError> {
        validate_su_quantity(self.num_service_units, config)?;

        let request = &self.request;
        let project = ProjectRepo::find_by_id(pool, request.project_id)
            .await?
            .ok_or_else(|| EngineError::not_found("Project", request.project_id))?;
        let period = PeriodRepo::find_by_id(pool, request.allocation_period_id)
            .await?
            .ok_or_else(|| {
                EngineError::not_found("AllocationPeriod", request.allocation_period_id)
            })?;
        let recipients = self.recipients(pool).await?;

        let queue = EnqueueEmailStrategy::new();
        let mut tx = pool.begin().await?;

        let status = NewProjectRequestRepo::status_name(&mut *tx, request.id)
            .await?
            .ok_or_else(|| EngineError::not_found("NewProjectRequest", request.id))?;
        if status != "Approved - Scheduled" {
            return Err(EngineError::invariant(format!(
                "NewProjectRequest {} has status {status} where Approved - Scheduled is expected.",
                request.id
            )));
        }

        UserRepo::set_is_pi(&mut *tx, request.pi_id, true).await?;
        ProjectRepo::set_status(&mut *tx, project.id, "Active")
            .await?
            .ok_or_else(|| EngineError::not_found("Project", project.id))?;

        let allocation = self.activate_allocation(&mut tx, &period, &project.name).await?;

        let attribute = match AttributeRepo::find_attribute(
            &mut *tx,
            allocation.id,
            SERVICE_UNITS_ATTRIBUTE,
        )
        .await?
        {
            Some(attribute) => attribute,
            None => {
                AttributeRepo::upsert_attribute(
                    &mut *tx,
                    allocation.id,
                    SERVICE_UNITS_ATTRIBUTE,
                    "0.00",
                )
                .await?
            }
        };
        AttributeRepo::get_or_create_usage(&mut *tx, attribute.id).await?;
        ledger::set_allocation_allowance(
            &mut tx,
            attribute.id,
            self.num_service_units,
            &WriteOptions::default(),
        )
        .await?;

        create_project_users(&mut tx, project.id, request.requester_id, request.pi_id).await?;
        let (requester_member, pi_member) =
            create_allocation_users(&mut tx, allocation.id, request.requester_id, request.pi_id)
                .await?;
        let cluster_access_member = requester_member.as_ref().unwrap_or(&pi_member);
        ensure_pending_cluster_access(&mut tx, cluster_access_member).await?;

        let updated = NewProjectRequestRepo::set_status(&mut *tx, request.id, "Approved - Complete")
            .await?
            .ok_or_else(|| EngineError::not_found("NewProjectRequest", request.id))?;

        let notice = new_project_processing_notice(
            &recipients,
            &project.name,
            &period.name,
            &self.num_service_units.to_string(),
        );
        let _ = queue.send(&notice).await;

        tx.commit().await?;
        queue.send_queued_emails(self.email).await;
        Ok(updated)
    }

    /// Find or create the project's compute allocation and activate it for
    /// the period.
    async fn activate_allocation(
        &self,
        conn: &mut PgConnection,
        period: &granta_db::models::period::AllocationPeriod,
        project_name: &str,
    ) -> Result<granta_db::models::allocation::Allocation, EngineError> {
        let request = &self.request;
        let mut allocations =
            AllocationRepo::find_for_project(&mut *conn, request.project_id, COMPUTE_RESOURCE)
                .await?;
        if allocations.len() > 1 {
            return Err(EngineError::invariant(format!(
                "Project {project_name} has {} compute allocations where at most one is expected.",
                allocations.len()
            )));
        }
        let allocation = match allocations.pop() {
            Some(allocation) => allocation,
            None => {
                AllocationRepo::create(
                    &mut *conn,
                    request.project_id,
                    COMPUTE_RESOURCE,
                    "New",
                    None,
                    None,
                )
                .await?
            }
        };
        AllocationRepo::set_status(&mut *conn, allocation.id, "Active").await?;
        let allocation = AllocationRepo::set_dates(
            &mut *conn,
            allocation.id,
            Some(period.start_date),
            Some(period.end_date),
        )
        .await?
        .ok_or_else(|| EngineError::not_found("Allocation", allocation.id))?;
        Ok(allocation)
    }

    async fn recipients(&self, pool: &PgPool) -> Result<NoticeRecipients, EngineError> {
        let requester = UserRepo::find_by_id(pool, self.request.requester_id)
            .await?
            .ok_or_else(|| EngineError::not_found("User", self.request.requester_id))?;
        let pi = UserRepo::find_by_id(pool, self.request.pi_id)
            .await?
            .ok_or_else(|| EngineError::not_found("User", self.request.pi_id))?;
        Ok(NoticeRecipients {
            requester_email: requester.email,
            pi_email: pi.email,
            admin_cc: self.admin_cc.clone(),
        })
    }
}
