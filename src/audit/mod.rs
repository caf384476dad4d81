//! Audit logging for backup operations
//!
//! Every create, restore, export, delete and purge is recorded in an
//! append-only JSONL audit log alongside the tracing output.
//!
//! - `AuditEntry`: one operation with its timestamp, the record it touched
//!   and a JSON snapshot of that record or report
//! - `AuditLogger`: appends entries to the log file and reads them back

mod entry;
mod logger;

pub use entry::{AuditEntry, EntityType, Operation};
pub use logger::AuditLogger;
