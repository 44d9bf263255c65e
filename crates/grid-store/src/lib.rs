//! Sqlite-backed result store: dedup lookups, additive schema growth and the
//! unconditional job audit trail.

mod store;

pub use store::{ResultStore, AUDIT_PENDING_MARKER, AUDIT_TABLE};
