//! Pure domain logic for the Granta accounting engine.
//!
//! This crate has no I/O: it defines the ledger configuration, service-unit
//! bounds and job-cost validation, computing-allowance classification,
//! allowance proration, and the pure part of the job admission decision.
//! Everything that touches the database lives in `granta-accounting`.

pub mod admission;
pub mod allowance;
pub mod config;
pub mod error;
pub mod proration;
pub mod su;
pub mod types;
