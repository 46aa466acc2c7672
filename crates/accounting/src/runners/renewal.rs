//! Runners for the allocation-renewal request state machine.

use chrono::Utc;
use granta_core::allowance::COMPUTE_RESOURCE;
use granta_core::config::LedgerConfig;
use granta_core::su::{parse_stored_allowance, validate_su_quantity, SERVICE_UNITS_ATTRIBUTE};
use granta_core::types::DbId;
use granta_notify::messages::{
    renewal_approval_notice, renewal_denial_notice, renewal_processing_notice, NoticeRecipients,
};
use granta_notify::{EmailStrategy, EnqueueEmailStrategy};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};

use granta_db::models::allocation::AllocationUser;
use granta_db::models::period::AllocationPeriod;
use granta_db::models::request::RenewalRequest;
use granta_db::repositories::{
    AllocationRepo, AllocationUserRepo, AttributeRepo, PeriodRepo, ProjectRepo, ProjectUserRepo,
    RenewalRequestRepo, UserRepo,
};

use crate::error::EngineError;
use crate::ledger::{self, WriteOptions};
use crate::runners::cluster_access::ensure_pending_cluster_access;

const PI_ROLE: &str = "Principal Investigator";
const MANAGER_ROLE: &str = "Manager";
const USER_ROLE: &str = "User";

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Assert that the request currently has the expected status.
async fn assert_request_status(
    conn: &mut PgConnection,
    request: &RenewalRequest,
    expected: &str,
) -> Result<(), EngineError> {
    let actual = RenewalRequestRepo::status_name(&mut *conn, request.id)
        .await?
        .ok_or_else(|| EngineError::not_found("RenewalRequest", request.id))?;
    if actual != expected {
        return Err(EngineError::invariant(format!(
            "RenewalRequest {} has status {actual} where {expected} is expected.",
            request.id
        )));
    }
    Ok(())
}

/// Create or reactivate active project memberships for the requester and
/// the PI. A requester who already holds the PI role keeps it; otherwise
/// they become a Manager.
pub(crate) async fn create_project_users(
    conn: &mut PgConnection,
    project_id: DbId,
    requester_id: DbId,
    pi_id: DbId,
) -> Result<(), EngineError> {
    if requester_id != pi_id {
        let existing = ProjectUserRepo::find_detail(&mut *conn, project_id, requester_id).await?;
        let role = match existing {
            Some(detail) if detail.role == PI_ROLE => PI_ROLE,
            _ => MANAGER_ROLE,
        };
        ProjectUserRepo::upsert(&mut *conn, project_id, requester_id, role, "Active").await?;
    }
    ProjectUserRepo::upsert(&mut *conn, project_id, pi_id, PI_ROLE, "Active").await?;
    Ok(())
}

/// Create or reactivate active allocation memberships for the requester and
/// the PI, returning the requester's membership (when distinct) and the
/// PI's.
pub(crate) async fn create_allocation_users(
    conn: &mut PgConnection,
    allocation_id: DbId,
    requester_id: DbId,
    pi_id: DbId,
) -> Result<(Option<AllocationUser>, AllocationUser), EngineError> {
    let requester_member = if requester_id != pi_id {
        Some(AllocationUserRepo::get_or_create_active(&mut *conn, allocation_id, requester_id).await?)
    } else {
        None
    };
    let pi_member =
        AllocationUserRepo::get_or_create_active(&mut *conn, allocation_id, pi_id).await?;
    Ok((requester_member, pi_member))
}

/// Look up the single compute allocation of a project, in any status.
pub(crate) async fn compute_allocation(
    conn: &mut PgConnection,
    project_id: DbId,
    project_name: &str,
) -> Result<granta_db::models::allocation::Allocation, EngineError> {
    let allocations =
        AllocationRepo::find_for_project(&mut *conn, project_id, COMPUTE_RESOURCE).await?;
    match allocations.len() {
        0 => Err(EngineError::invariant(format!(
            "Project {project_name} has no compute allocation."
        ))),
        1 => allocations.into_iter().next().ok_or_else(|| {
            EngineError::invariant("Allocation vanished during resolution.".to_string())
        }),
        n => Err(EngineError::invariant(format!(
            "Project {project_name} has {n} compute allocations where exactly one is expected."
        ))),
    }
}

/// Resolve the recipients for a request's notices.
async fn notice_recipients(
    pool: &PgPool,
    request: &RenewalRequest,
    admin_cc: &[String],
) -> Result<NoticeRecipients, EngineError> {
    let requester = UserRepo::find_by_id(pool, request.requester_id)
        .await?
        .ok_or_else(|| EngineError::not_found("User", request.requester_id))?;
    let pi = UserRepo::find_by_id(pool, request.pi_id)
        .await?
        .ok_or_else(|| EngineError::not_found("User", request.pi_id))?;
    Ok(NoticeRecipients {
        requester_email: requester.email,
        pi_email: pi.email,
        admin_cc: admin_cc.to_vec(),
    })
}

async fn request_context(
    pool: &PgPool,
    request: &RenewalRequest,
) -> Result<(String, AllocationPeriod), EngineError> {
    let project = ProjectRepo::find_by_id(pool, request.post_project_id)
        .await?
        .ok_or_else(|| EngineError::not_found("Project", request.post_project_id))?;
    let period = PeriodRepo::find_by_id(pool, request.allocation_period_id)
        .await?
        .ok_or_else(|| EngineError::not_found("AllocationPeriod", request.allocation_period_id))?;
    Ok((project.name, period))
}

// ---------------------------------------------------------------------------
// RenewalApprovalRunner
// ---------------------------------------------------------------------------

/// Moves an Under Review request to Approved and records the number of
/// service units to grant at the period start.
pub struct RenewalApprovalRunner<'a> {
    request: RenewalRequest,
    num_service_units: Decimal,
    email: &'a dyn EmailStrategy,
    admin_cc: Vec<String>,
}

impl<'a> RenewalApprovalRunner<'a> {
    pub fn new(
        request: RenewalRequest,
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

    pub async fn run(&self, pool: &PgPool, config: &LedgerConfig) -> Result<RenewalRequest, EngineError> {
        validate_su_quantity(self.num_service_units, config)?;

        let mut conn = pool.acquire().await?;
        assert_request_status(&mut conn, &self.request, "Under Review").await?;
        drop(conn);

        let (project_name, period) = request_context(pool, &self.request).await?;
        let today = Utc::now().date_naive();
        if today > period.end_date {
            return Err(EngineError::validation(format!(
                "AllocationPeriod {} has already ended.",
                period.id
            )));
        }

        let updated = RenewalRequestRepo::approve(pool, self.request.id, self.num_service_units)
            .await?
            .ok_or_else(|| EngineError::not_found("RenewalRequest", self.request.id))?;

        let recipients = notice_recipients(pool, &self.request, &self.admin_cc).await?;
        let notice = renewal_approval_notice(&recipients, &project_name, &period.name);
        if let Err(error) = self.email.send(&notice).await {
            tracing::error!(%error, "Failed to send notification email.");
        }
        Ok(updated)
    }
}

// ---------------------------------------------------------------------------
// RenewalProcessingRunner
// ---------------------------------------------------------------------------

/// Processes an Approved request at the period start: activates the
/// post-project and its allocation, grants the allowance, rebuilds
/// memberships, and applies the pooling transitions.
pub struct RenewalProcessingRunner<'a> {
    request: RenewalRequest,
    num_service_units: Decimal,
    email: &'a dyn EmailStrategy,
    admin_cc: Vec<String>,
}

impl<'a> RenewalProcessingRunner<'a> {
    pub fn new(
        request: RenewalRequest,
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

    pub async fn run(&self, pool: &PgPool, config: &LedgerConfig) -> Result<RenewalRequest, EngineError> {
        validate_su_quantity(self.num_service_units, config)?;

        let request = &self.request;
        let (project_name, period) = request_context(pool, request).await?;
        let recipients = notice_recipients(pool, request, &self.admin_cc).await?;

        // Notices are buffered until the transaction commits; a rollback
        // must leave nothing sent or enqueued.
        let queue = EnqueueEmailStrategy::new();

        let mut tx = pool.begin().await?;
        assert_request_status(&mut tx, request, "Approved").await?;

        UserRepo::set_is_pi(&mut *tx, request.pi_id, true).await?;
        ProjectRepo::set_status(&mut *tx, request.post_project_id, "Active")
            .await?
            .ok_or_else(|| EngineError::not_found("Project", request.post_project_id))?;

        // The post-project is pooled if it has a PI other than this one.
        let pis = ProjectUserRepo::pis(&mut *tx, request.post_project_id).await?;
        let pooled = pis.iter().any(|pi| pi.user_id != request.pi_id);

        let allocation =
            compute_allocation(&mut tx, request.post_project_id, &project_name).await?;
        AllocationRepo::set_status(&mut *tx, allocation.id, "Active").await?;
        if pooled {
            AllocationRepo::set_dates(
                &mut *tx,
                allocation.id,
                allocation.start_date,
                Some(period.end_date),
            )
            .await?;
        } else {
            AllocationRepo::set_dates(
                &mut *tx,
                allocation.id,
                Some(period.start_date),
                Some(period.end_date),
            )
            .await?;
        }

        // Set or, when pooling, add to the allocation's service units.
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
        let new_value = if pooled {
            let existing = parse_stored_allowance(&attribute.value)
                .map_err(EngineError::invariant)?;
            let combined = existing + self.num_service_units;
            validate_su_quantity(combined, config)?;
            combined
        } else {
            self.num_service_units
        };
        ledger::set_allocation_allowance(&mut tx, attribute.id, new_value, &WriteOptions::default())
            .await?;

        // In the pooling case, bring the existing members' allowances up to
        // the combined value. Usages are left untouched.
        if pooled {
            let user_attributes = AttributeRepo::list_user_attributes_for_allocation(
                &mut *tx,
                allocation.id,
                SERVICE_UNITS_ATTRIBUTE,
            )
            .await?;
            for user_attribute in &user_attributes {
                ledger::set_allocation_user_allowance(
                    &mut tx,
                    user_attribute.id,
                    new_value,
                    &WriteOptions::default(),
                )
                .await?;
            }
        }

        create_project_users(&mut tx, request.post_project_id, request.requester_id, request.pi_id)
            .await?;
        let (requester_member, pi_member) = create_allocation_users(
            &mut tx,
            allocation.id,
            request.requester_id,
            request.pi_id,
        )
        .await?;
        let cluster_access_member = requester_member.as_ref().unwrap_or(&pi_member);
        ensure_pending_cluster_access(&mut tx, cluster_access_member).await?;

        self.apply_pooling_transitions(&mut tx).await?;

        let updated = RenewalRequestRepo::complete(&mut *tx, request.id)
            .await?
            .ok_or_else(|| EngineError::not_found("RenewalRequest", request.id))?;

        let notice = renewal_processing_notice(
            &recipients,
            &project_name,
            &period.name,
            &new_value.to_string(),
        );
        // Queueing never fails; the real send happens after commit.
        let _ = queue.send(&notice).await;

        tx.commit().await?;
        queue.send_queued_emails(self.email).await;
        Ok(updated)
    }

    /// When the renewal moves the PI out of a pooled pre-project, demote
    /// them there; when nothing else claims the pre-project for this period,
    /// deactivate it.
    async fn apply_pooling_transitions(&self, conn: &mut PgConnection) -> Result<(), EngineError> {
        let request = &self.request;
        if request.pre_project_id == request.post_project_id {
            return Ok(());
        }

        let pre_pis = ProjectUserRepo::pis(&mut *conn, request.pre_project_id).await?;
        if pre_pis.len() > 1 {
            match ProjectUserRepo::find_detail(&mut *conn, request.pre_project_id, request.pi_id)
                .await?
            {
                Some(membership) => {
                    ProjectUserRepo::set_role(&mut *conn, membership.id, USER_ROLE).await?;
                }
                None => {
                    tracing::error!(
                        request_id = request.id,
                        pre_project_id = request.pre_project_id,
                        "No membership exists for the PI on the pre-project being left."
                    );
                }
            }
            return Ok(());
        }

        let claimed = RenewalRequestRepo::exists_non_denied_claim(
            &mut *conn,
            request.allocation_period_id,
            request.pre_project_id,
            request.id,
        )
        .await?;
        if !claimed {
            let project = ProjectRepo::find_by_id(&mut *conn, request.pre_project_id)
                .await?
                .ok_or_else(|| EngineError::not_found("Project", request.pre_project_id))?;
            ProjectRepo::set_status(&mut *conn, project.id, "Inactive").await?;
            let allocation = compute_allocation(&mut *conn, project.id, &project.name).await?;
            AllocationRepo::set_status(&mut *conn, allocation.id, "Expired").await?;
            AllocationRepo::set_dates(&mut *conn, allocation.id, allocation.start_date, None)
                .await?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// RenewalDenialRunner
// ---------------------------------------------------------------------------

/// Denies a request that has not yet completed, recording the justification
/// in the request's state blob.
pub struct RenewalDenialRunner<'a> {
    request: RenewalRequest,
    justification: String,
    email: &'a dyn EmailStrategy,
    admin_cc: Vec<String>,
}

impl<'a> RenewalDenialRunner<'a> {
    pub fn new(
        request: RenewalRequest,
        justification: impl Into<String>,
        email: &'a dyn EmailStrategy,
        admin_cc: Vec<String>,
    ) -> Self {
        Self {
            request,
            justification: justification.into(),
            email,
            admin_cc,
        }
    }

    pub async fn run(&self, pool: &PgPool) -> Result<RenewalRequest, EngineError> {
        let request = &self.request;
        let (project_name, period) = request_context(pool, request).await?;
        let recipients = notice_recipients(pool, request, &self.admin_cc).await?;

        let queue = EnqueueEmailStrategy::new();
        let mut tx = pool.begin().await?;

        let status = RenewalRequestRepo::status_name(&mut *tx, request.id)
            .await?
            .ok_or_else(|| EngineError::not_found("RenewalRequest", request.id))?;
        if status == "Complete" {
            return Err(EngineError::invariant(format!(
                "RenewalRequest {} is already Complete and cannot be denied.",
                request.id
            )));
        }

        // A post-project spun up solely for this request is denied with it.
        if request.new_project_request_id.is_some() {
            ProjectRepo::set_status(&mut *tx, request.post_project_id, "Denied").await?;
        }

        let state = serde_json::json!({
            "status": "Denied",
            "justification": self.justification,
            "timestamp": Utc::now().to_rfc3339(),
        });
        let updated = RenewalRequestRepo::deny(&mut *tx, request.id, &state)
            .await?
            .ok_or_else(|| EngineError::not_found("RenewalRequest", request.id))?;

        let notice = renewal_denial_notice(
            &recipients,
            &project_name,
            &period.name,
            &self.justification,
        );
        let _ = queue.send(&notice).await;

        tx.commit().await?;
        queue.send_queued_emails(self.email).await;
        Ok(updated)
    }
}
