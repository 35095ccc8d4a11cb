//! Append-only violation audit trail.

mod csv_log;
mod event;

pub use csv_log::{CsvAuditLog, AUDIT_HEADER};
pub use event::ViolationEvent;

use crate::error::LogError;

/// Destination for violation records.
///
/// `append` must have durably handed the record off before returning, and
/// implementations shared across threads serialize appends so records keep
/// their timestamp order.
pub trait AuditSink: Send + Sync {
    fn append(&self, event: &ViolationEvent) -> Result<(), LogError>;
}
