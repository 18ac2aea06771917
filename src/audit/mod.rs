//! Audit trail recording for source lineage

mod trail;

pub use trail::{AuditConfig, AuditEntry, AuditEntryType, AuditTrail, DataSample, SourceAudit};
