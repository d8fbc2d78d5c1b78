//! Classified audit output

use crate::record::ResourceKind;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Mapping from type label to aggregate count.
pub type TypeCountMap = BTreeMap<String, u32>;

pub type AuditRunId = Uuid;

/// Classification of a report line.
///
/// Variant order is the presentation priority: tagged lines first, unused
/// reservations last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Tagged,
    Ignored,
    MissingReservation,
    Matched,
    UnusedReservation,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Tagged => "tagged",
            Category::Ignored => "ignored",
            Category::MissingReservation => "missing_reservation",
            Category::Matched => "matched",
            Category::UnusedReservation => "unused_reservation",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedRecord {
    #[serde(rename = "type")]
    pub resource_type: String,
    pub count: u32,
    pub category: Category,
    pub resource_id: Option<String>,
    pub name: Option<String>,
    pub expiration_value: Option<String>,
    pub expiration_reason: Option<String>,
}

impl ClassifiedRecord {
    pub fn counted(resource_type: impl Into<String>, count: u32, category: Category) -> Self {
        Self {
            resource_type: resource_type.into(),
            count,
            category,
            resource_id: None,
            name: None,
            expiration_value: None,
            expiration_reason: None,
        }
    }
}

/// One line of an inventory-only listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeCount {
    #[serde(rename = "type")]
    pub resource_type: String,
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetiredReservation {
    pub id: String,
    #[serde(rename = "type")]
    pub resource_type: String,
    pub platform: String,
    pub count: u32,
    pub placement: Option<String>,
    pub expiration_timestamp: DateTime<Utc>,
}

/// A watched tag whose expiration date passed inside the reporting window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetiredTag {
    pub resource_id: String,
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub resource_type: String,
    pub value: String,
    pub reason: Option<String>,
    pub expired_on: NaiveDate,
}

/// A retired reservation whose retirement timestamp lies in the future.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClockSkewWarning {
    pub reservation_id: String,
    pub retirement_timestamp: DateTime<Utc>,
    pub observed_at: DateTime<Utc>,
}

impl fmt::Display for ClockSkewWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "reservation {} retires at {} which is after {}",
            self.reservation_id, self.retirement_timestamp, self.observed_at
        )
    }
}

/// What a single audit unit collects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditMode {
    /// Running resources only.
    Instances,
    /// Reservations only.
    Reserved,
    /// Full reconciliation.
    #[default]
    All,
}

/// Result of auditing one resource kind in one region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditReport {
    pub run_id: AuditRunId,
    pub region: String,
    pub kind: ResourceKind,
    pub mode: AuditMode,
    pub generated_at: DateTime<Utc>,
    pub classified: Vec<ClassifiedRecord>,
    pub inventory: Vec<TypeCount>,
    pub retired_reservations: Vec<RetiredReservation>,
    pub retired_tags: Vec<RetiredTag>,
    pub clock_skew: Vec<ClockSkewWarning>,
    pub skipped: Vec<String>,
}

impl AuditReport {
    pub fn is_empty(&self) -> bool {
        self.classified.is_empty()
            && self.inventory.is_empty()
            && self.retired_reservations.is_empty()
            && self.retired_tags.is_empty()
    }

    pub fn count_in(&self, category: Category) -> u32 {
        self.classified
            .iter()
            .filter(|record| record.category == category)
            .map(|record| record.count)
            .sum()
    }
}
