//! Normalized resource records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Family of resources audited together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Ec2,
    Rds,
    Cache,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 3] = [ResourceKind::Ec2, ResourceKind::Rds, ResourceKind::Cache];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Ec2 => "ec2",
            ResourceKind::Rds => "rds",
            ResourceKind::Cache => "cache",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which inventory a record was read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordOrigin {
    Running,
    Reservation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordState {
    Running,
    Stopped,
    Active,
    Retired,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagStatus {
    Untagged,
    Tagged,
    Ignored,
}

/// One running or reserved unit of capacity.
///
/// Built by the normalizer, then stamped once by the tag classifier through
/// [`ResourceRecord::with_tag_status`]. `expiration_value` is set exactly when
/// `tag_status` is [`TagStatus::Tagged`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRecord {
    pub id: String,
    pub kind: ResourceKind,
    pub origin: RecordOrigin,
    #[serde(rename = "type")]
    pub resource_type: String,
    pub platform: String,
    pub placement: String,
    pub state: RecordState,
    pub count: u32,
    pub name: Option<String>,
    pub group_key: Option<String>,
    pub tags: BTreeMap<String, String>,
    pub tag_status: TagStatus,
    pub expiration_value: Option<String>,
    pub expiration_reason: Option<String>,
    pub retirement_timestamp: Option<DateTime<Utc>>,
}

impl ResourceRecord {
    /// Human label, e.g. `Linux VPC us-east-1d t2.large`.
    pub fn label(&self) -> String {
        [
            self.platform.as_str(),
            self.placement.as_str(),
            self.resource_type.as_str(),
        ]
        .iter()
        .filter(|part| !part.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(" ")
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    /// Applies a tag classification. Expiration fields are only kept for
    /// tagged records, and a tagged record must carry an expiration value.
    pub fn with_tag_status(
        mut self,
        status: TagStatus,
        expiration_value: Option<String>,
        expiration_reason: Option<String>,
    ) -> Self {
        debug_assert!(
            status != TagStatus::Tagged || expiration_value.is_some(),
            "tagged record {} has no expiration value",
            self.id
        );
        self.tag_status = status;
        if status == TagStatus::Tagged {
            self.expiration_value = expiration_value;
            self.expiration_reason = expiration_reason;
        } else {
            self.expiration_value = None;
            self.expiration_reason = None;
        }
        self
    }

    pub fn is_tagged(&self) -> bool {
        self.tag_status == TagStatus::Tagged
    }

    pub fn is_ignored(&self) -> bool {
        self.tag_status == TagStatus::Ignored
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(platform: &str, placement: &str) -> ResourceRecord {
        ResourceRecord {
            id: "i-1".to_string(),
            kind: ResourceKind::Ec2,
            origin: RecordOrigin::Running,
            resource_type: "t2.large".to_string(),
            platform: platform.to_string(),
            placement: placement.to_string(),
            state: RecordState::Running,
            count: 1,
            name: None,
            group_key: None,
            tags: BTreeMap::new(),
            tag_status: TagStatus::Untagged,
            expiration_value: None,
            expiration_reason: None,
            retirement_timestamp: None,
        }
    }

    #[test]
    fn label_joins_platform_placement_and_type() {
        assert_eq!(
            record("Linux VPC", "us-east-1d").label(),
            "Linux VPC us-east-1d t2.large"
        );
    }

    #[test]
    fn label_skips_empty_placement() {
        assert_eq!(record("Linux VPC", "").label(), "Linux VPC t2.large");
    }

    #[test]
    fn expiration_is_dropped_unless_tagged() {
        let ignored = record("Linux", "").with_tag_status(
            TagStatus::Ignored,
            Some("2024-01-01".to_string()),
            Some("migration".to_string()),
        );
        assert!(ignored.is_ignored());
        assert_eq!(ignored.expiration_value, None);
        assert_eq!(ignored.expiration_reason, None);

        let tagged = record("Linux", "").with_tag_status(
            TagStatus::Tagged,
            Some("2024-01-01".to_string()),
            None,
        );
        assert!(tagged.is_tagged());
        assert_eq!(tagged.expiration_value.as_deref(), Some("2024-01-01"));
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "has no expiration value")]
    fn tagged_without_expiration_value_is_rejected() {
        let _ = record("Linux", "").with_tag_status(TagStatus::Tagged, None, None);
    }

    #[test]
    fn kind_serializes_lowercase() {
        let json = serde_json::to_string(&ResourceKind::Cache).unwrap();
        assert_eq!(json, "\"cache\"");
    }
}
