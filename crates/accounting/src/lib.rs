//! The service-unit accounting and allocation-period lifecycle engine.
//!
//! Every allowance or usage write flows through the ledger primitives in
//! [`ledger`], which serialize concurrent writers with row locks and append
//! the audit rows in the same transaction. Higher layers compose them:
//! [`facade`] for multi-entity adjustments, [`admission`] for the read-only
//! job admission decision, [`lifecycle`] for the period-boundary batch run,
//! and [`runners`] for per-request state transitions.

pub mod admission;
pub mod error;
pub mod facade;
pub mod ledger;
pub mod lifecycle;
pub mod objects;
pub mod runners;

pub use admission::{can_submit_job, JobSubmissionOutcome, StatusClass};
pub use error::EngineError;
pub use facade::{set_service_units, SetServiceUnits};
pub use lifecycle::{PeriodStartReport, StartPeriodRunner};
pub use objects::AccountingObjects;
