//! Single-purpose runners moving one request through its state machine.
//!
//! Each runner is bound to one request and wraps its mutations in one
//! transaction. Notification emails are buffered while the transaction is
//! open and flushed only after commit, so a rolled-back run sends nothing.

mod cluster_access;
mod new_project;
mod renewal;

pub use cluster_access::{assert_no_cluster_access, ensure_pending_cluster_access};
pub use new_project::NewProjectProcessingRunner;
pub use renewal::{RenewalApprovalRunner, RenewalDenialRunner, RenewalProcessingRunner};
