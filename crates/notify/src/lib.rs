//! Email notification delivery for accounting lifecycle events.
//!
//! Runners buffer messages with [`strategy::EnqueueEmailStrategy`] while a
//! database transaction is open and flush them to a real transport only
//! after commit, so a rolled-back run sends nothing.

pub mod email;
pub mod messages;
pub mod strategy;

pub use email::{EmailConfig, EmailError, EmailMessage};
pub use strategy::{DropEmailStrategy, EmailStrategy, EnqueueEmailStrategy, SmtpEmailStrategy};
