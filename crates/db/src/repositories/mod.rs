//! Repository layer: one unit struct per entity, holding the SQL for that
//! entity's table(s).
//!
//! Methods take `impl PgExecutor<'_>` so the same query runs against the
//! pool or inside a caller-owned transaction (`&mut *tx`). Status and role
//! names resolve through subselects on the seeded lookup tables.

mod allocation_repo;
mod allocation_user_repo;
mod attribute_repo;
mod history_repo;
mod new_project_request_repo;
mod period_repo;
mod project_repo;
mod project_user_repo;
mod renewal_request_repo;
mod transaction_repo;
mod user_repo;

pub use allocation_repo::AllocationRepo;
pub use allocation_user_repo::AllocationUserRepo;
pub use attribute_repo::AttributeRepo;
pub use history_repo::HistoryRepo;
pub use new_project_request_repo::NewProjectRequestRepo;
pub use period_repo::PeriodRepo;
pub use project_repo::ProjectRepo;
pub use project_user_repo::ProjectUserRepo;
pub use renewal_request_repo::RenewalRequestRepo;
pub use transaction_repo::TransactionRepo;
pub use user_repo::UserRepo;
