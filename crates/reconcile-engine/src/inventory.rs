//! Inventory sources feeding the audit pipeline

use crate::normalizer::RawPayload;
use auditor_core::{AuditError, ResourceKind, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Raw payloads for one resource kind in one region.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Inventory {
    pub running: Vec<RawPayload>,
    pub reservations: Vec<RawPayload>,
}

impl Inventory {
    pub fn is_empty(&self) -> bool {
        self.running.is_empty() && self.reservations.is_empty()
    }
}

/// Supplies inventories; implemented by provider fetchers.
pub trait InventorySource: Send + Sync {
    fn fetch(&self, region: &str, kind: ResourceKind) -> Result<Inventory>;

    /// Regions this source can serve.
    fn regions(&self) -> Vec<String>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegionInventory {
    pub ec2: Inventory,
    pub rds: Inventory,
    pub cache: Inventory,
}

impl RegionInventory {
    pub fn get(&self, kind: ResourceKind) -> &Inventory {
        match kind {
            ResourceKind::Ec2 => &self.ec2,
            ResourceKind::Rds => &self.rds,
            ResourceKind::Cache => &self.cache,
        }
    }
}

/// A previously captured set of inventories, keyed by region.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InventorySnapshot {
    pub regions: BTreeMap<String, RegionInventory>,
}

impl InventorySnapshot {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }
}

impl InventorySource for InventorySnapshot {
    fn fetch(&self, region: &str, kind: ResourceKind) -> Result<Inventory> {
        let inventory = self
            .regions
            .get(region)
            .map(|r| r.get(kind).clone())
            .unwrap_or_default();

        let misplaced = inventory
            .running
            .iter()
            .chain(inventory.reservations.iter())
            .find(|payload| payload.kind() != kind);
        if let Some(payload) = misplaced {
            return Err(AuditError::InventoryError {
                region: region.to_string(),
                kind: kind.to_string(),
                reason: format!("snapshot holds a {} payload", payload.kind()),
            });
        }

        Ok(inventory)
    }

    fn regions(&self) -> Vec<String> {
        self.regions.keys().cloned().collect()
    }
}
