//! Builders for the lifecycle notice emails.
//!
//! Each notice goes to the requester and the PI, with the administrator CC
//! list from [`EmailConfig`](crate::email::EmailConfig) attached.

use crate::email::EmailMessage;

/// Recipients shared by every lifecycle notice.
#[derive(Debug, Clone)]
pub struct NoticeRecipients {
    pub requester_email: String,
    pub pi_email: String,
    pub admin_cc: Vec<String>,
}

impl NoticeRecipients {
    fn to_list(&self) -> Vec<String> {
        let mut to = vec![self.requester_email.clone()];
        if self.pi_email != self.requester_email {
            to.push(self.pi_email.clone());
        }
        to
    }
}

/// Notice that a renewal request was approved and scheduled for processing
/// at the period start.
pub fn renewal_approval_notice(
    recipients: &NoticeRecipients,
    project_name: &str,
    period_name: &str,
) -> EmailMessage {
    EmailMessage {
        to: recipients.to_list(),
        cc: recipients.admin_cc.clone(),
        subject: format!("Allowance renewal approved for {project_name}"),
        body: format!(
            "Your request to renew the allowance of project {project_name} for \
             {period_name} has been approved.\n\n\
             The renewal will be processed when {period_name} begins.\n"
        ),
    }
}

/// Notice that a renewal request was processed and the allowance granted.
pub fn renewal_processing_notice(
    recipients: &NoticeRecipients,
    project_name: &str,
    period_name: &str,
    num_service_units: &str,
) -> EmailMessage {
    EmailMessage {
        to: recipients.to_list(),
        cc: recipients.admin_cc.clone(),
        subject: format!("Allowance renewal processed for {project_name}"),
        body: format!(
            "Your request to renew the allowance of project {project_name} for \
             {period_name} has been processed.\n\n\
             The project has been granted {num_service_units} service units.\n"
        ),
    }
}

/// Notice that a renewal request was denied, with the recorded
/// justification.
pub fn renewal_denial_notice(
    recipients: &NoticeRecipients,
    project_name: &str,
    period_name: &str,
    justification: &str,
) -> EmailMessage {
    EmailMessage {
        to: recipients.to_list(),
        cc: recipients.admin_cc.clone(),
        subject: format!("Allowance renewal denied for {project_name}"),
        body: format!(
            "Your request to renew the allowance of project {project_name} for \
             {period_name} has been denied.\n\n\
             Reason: {justification}\n"
        ),
    }
}

/// Notice that a new project was set up and funded.
pub fn new_project_processing_notice(
    recipients: &NoticeRecipients,
    project_name: &str,
    period_name: &str,
    num_service_units: &str,
) -> EmailMessage {
    EmailMessage {
        to: recipients.to_list(),
        cc: recipients.admin_cc.clone(),
        subject: format!("New project {project_name} set up"),
        body: format!(
            "Your request for project {project_name} has been processed for \
             {period_name}.\n\n\
             The project has been granted {num_service_units} service units.\n"
        ),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
