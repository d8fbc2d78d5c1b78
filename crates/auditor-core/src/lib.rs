//! # Auditor Core
//!
//! Core types for auditing a compute fleet against its purchased capacity
//! reservations.
//!
//! ## What an audit reports
//! - Running capacity with no reservation behind it (cost exposure)
//! - Reservations with nothing running against them (wasted spend)
//! - Reservations and exemption tags that expired recently

pub mod config;
pub mod error;
pub mod record;
pub mod report;

pub use config::{AuditConfig, CompiledConfig, IgnorePatterns, MalformedPolicy};
pub use error::{AuditError, Result};
pub use record::{RecordOrigin, RecordState, ResourceKind, ResourceRecord, TagStatus};
pub use report::{
    AuditMode, AuditReport, AuditRunId, Category, ClassifiedRecord, ClockSkewWarning,
    RetiredReservation, RetiredTag, TypeCount, TypeCountMap,
};

/// Current auditor version for compatibility checks
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build information for logs and debugging
pub const BUILD_INFO: &str = concat!(
    "Auditor ",
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("CARGO_PKG_NAME"),
    ")"
);

/// Well-known tag keys read from provider tag sets
pub mod tags {
    pub const NAME: &str = "Name";
    pub const OWNING_STACK: &str = "opsworks:stack";
}
