//! Domain model structs and DTOs.
//!
//! Each submodule contains:
//! - A `FromRow` entity struct matching the database row
//! - A create DTO for inserts where callers supply more than a couple of
//!   fields
//!
//! Status and role columns hold foreign keys into seeded lookup tables;
//! repositories resolve the canonical names via subselects.

pub mod allocation;
pub mod history;
pub mod period;
pub mod project;
pub mod request;
pub mod transaction;
pub mod user;
