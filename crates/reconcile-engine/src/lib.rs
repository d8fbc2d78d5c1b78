pub use auditor_core;

mod aggregate;
mod audit;
mod engine;
mod inventory;
mod normalizer;
mod retirement;
mod tags;

pub use aggregate::{aggregate, tally, to_type_counts};
pub use audit::{bucketize, Auditor, UNGROUPED};
pub use engine::reconcile;
pub use inventory::{Inventory, InventorySnapshot, InventorySource, RegionInventory};
pub use normalizer::{
    normalize, RawCacheCluster, RawCacheReservation, RawEc2Instance, RawEc2Reservation,
    RawInstanceState, RawPayload, RawPlacement, RawRdsInstance, RawRdsReservation, RawTag,
};
pub use retirement::{filter_retired, filter_retired_tags, RetirementScan};
pub use tags::{parse_expiration, TagClassification, TagClassifier};

// Re-export core types for convenience
pub use auditor_core::{
    AuditError, AuditMode, AuditReport, Category, ClassifiedRecord, CompiledConfig,
    ResourceKind, ResourceRecord, Result, TypeCountMap,
};
