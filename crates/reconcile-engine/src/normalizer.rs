//! Raw provider payloads and their normalization into [`ResourceRecord`]s.
//!
//! Field names follow the provider's describe-call responses. Every identity
//! field is optional at the serde level so that a missing one surfaces as a
//! [`AuditError::MalformedPayload`] for that single record instead of failing
//! the whole inventory document.

use auditor_core::{
    tags as tag_keys, AuditError, RecordOrigin, RecordState, ResourceKind, ResourceRecord, Result, TagStatus,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const LINUX: &str = "Linux";
const VPC_SUFFIX: &str = " VPC";
const VPC_MARKER: &str = "Amazon VPC";

/// Platforms reported verbatim instead of collapsing to `Linux`.
const NON_LINUX_MARKERS: &[&str] = &["Windows"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTag {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawInstanceState {
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawPlacement {
    pub availability_zone: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawEc2Instance {
    pub instance_id: Option<String>,
    pub instance_type: Option<String>,
    pub vpc_id: Option<String>,
    pub platform: Option<String>,
    pub state: Option<RawInstanceState>,
    pub placement: Option<RawPlacement>,
    pub key_name: Option<String>,
    pub tags: Vec<RawTag>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawEc2Reservation {
    pub reserved_instances_id: Option<String>,
    pub instance_type: Option<String>,
    pub product_description: Option<String>,
    pub state: Option<String>,
    pub availability_zone: Option<String>,
    pub instance_count: Option<u32>,
    pub end: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawRdsInstance {
    pub db_instance_identifier: Option<String>,
    pub db_instance_class: Option<String>,
    pub engine: Option<String>,
    pub db_instance_status: Option<String>,
    pub availability_zone: Option<String>,
    pub vpc_id: Option<String>,
    pub tags: Vec<RawTag>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawRdsReservation {
    pub reserved_db_instance_id: Option<String>,
    pub db_instance_class: Option<String>,
    pub product_description: Option<String>,
    pub state: Option<String>,
    pub db_instance_count: Option<u32>,
    pub start_time: Option<DateTime<Utc>>,
    /// Term length in seconds.
    pub duration: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawCacheCluster {
    pub cache_cluster_id: Option<String>,
    pub cache_node_type: Option<String>,
    pub engine: Option<String>,
    pub cache_cluster_status: Option<String>,
    pub num_cache_nodes: Option<u32>,
    pub preferred_availability_zone: Option<String>,
    pub cache_subnet_group_name: Option<String>,
    pub tags: Vec<RawTag>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawCacheReservation {
    pub reserved_cache_node_id: Option<String>,
    pub cache_node_type: Option<String>,
    pub product_description: Option<String>,
    pub state: Option<String>,
    pub cache_node_count: Option<u32>,
    pub start_time: Option<DateTime<Utc>>,
    /// Term length in seconds.
    pub duration: Option<i64>,
}

/// A provider record as fetched, tagged with the describe call it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "payload", rename_all = "snake_case")]
pub enum RawPayload {
    Ec2Instance(RawEc2Instance),
    Ec2Reservation(RawEc2Reservation),
    RdsInstance(RawRdsInstance),
    RdsReservation(RawRdsReservation),
    CacheCluster(RawCacheCluster),
    CacheReservation(RawCacheReservation),
}

impl RawPayload {
    pub fn kind(&self) -> ResourceKind {
        match self {
            RawPayload::Ec2Instance(_) | RawPayload::Ec2Reservation(_) => ResourceKind::Ec2,
            RawPayload::RdsInstance(_) | RawPayload::RdsReservation(_) => ResourceKind::Rds,
            RawPayload::CacheCluster(_) | RawPayload::CacheReservation(_) => ResourceKind::Cache,
        }
    }

    pub fn origin(&self) -> RecordOrigin {
        match self {
            RawPayload::Ec2Instance(_) | RawPayload::RdsInstance(_) | RawPayload::CacheCluster(_) => {
                RecordOrigin::Running
            }
            _ => RecordOrigin::Reservation,
        }
    }
}

/// Convert one raw payload into a canonical record. Pure.
pub fn normalize(payload: &RawPayload) -> Result<ResourceRecord> {
    let kind = payload.kind();
    match payload {
        RawPayload::Ec2Instance(raw) => {
            let tags = tag_map(&raw.tags);
            let mut record = base_record(
                kind,
                RecordOrigin::Running,
                required(&raw.instance_id, kind, "instance_id")?,
                required(&raw.instance_type, kind, "instance_type")?,
            );
            record.platform = with_vpc(running_platform(raw.platform.as_deref()), raw.vpc_id.is_some());
            record.placement = placement(
                raw.placement
                    .as_ref()
                    .and_then(|p| p.availability_zone.as_deref()),
            );
            record.state = parse_state(raw.state.as_ref().and_then(|s| s.name.as_deref()));
            record.name = tags.get(tag_keys::NAME).cloned().or_else(|| raw.key_name.clone());
            record.group_key = tags.get(tag_keys::OWNING_STACK).cloned();
            record.tags = tags;
            Ok(record)
        }
        RawPayload::Ec2Reservation(raw) => {
            let mut record = base_record(
                kind,
                RecordOrigin::Reservation,
                required(&raw.reserved_instances_id, kind, "reserved_instances_id")?,
                required(&raw.instance_type, kind, "instance_type")?,
            );
            let description = raw.product_description.as_deref().unwrap_or(LINUX);
            record.platform = with_vpc(
                description_platform(description),
                description.contains(VPC_MARKER),
            );
            record.placement = placement(raw.availability_zone.as_deref());
            record.state = parse_state(raw.state.as_deref());
            record.count = reservation_count(raw.instance_count, kind)?;
            record.retirement_timestamp = raw.end;
            Ok(record)
        }
        RawPayload::RdsInstance(raw) => {
            let tags = tag_map(&raw.tags);
            let mut record = base_record(
                kind,
                RecordOrigin::Running,
                required(&raw.db_instance_identifier, kind, "db_instance_identifier")?,
                required(&raw.db_instance_class, kind, "db_instance_class")?,
            );
            record.platform = with_vpc(engine_platform(raw.engine.as_deref()), raw.vpc_id.is_some());
            record.placement = placement(raw.availability_zone.as_deref());
            record.state = parse_state(raw.db_instance_status.as_deref());
            record.name = tags.get(tag_keys::NAME).cloned();
            record.group_key = tags.get(tag_keys::OWNING_STACK).cloned();
            record.tags = tags;
            Ok(record)
        }
        RawPayload::RdsReservation(raw) => {
            let mut record = base_record(
                kind,
                RecordOrigin::Reservation,
                required(&raw.reserved_db_instance_id, kind, "reserved_db_instance_id")?,
                required(&raw.db_instance_class, kind, "db_instance_class")?,
            );
            record.platform = engine_platform(raw.product_description.as_deref());
            record.state = parse_state(raw.state.as_deref());
            record.count = reservation_count(raw.db_instance_count, kind)?;
            record.retirement_timestamp = term_end(raw.start_time, raw.duration);
            Ok(record)
        }
        RawPayload::CacheCluster(raw) => {
            let tags = tag_map(&raw.tags);
            let mut record = base_record(
                kind,
                RecordOrigin::Running,
                required(&raw.cache_cluster_id, kind, "cache_cluster_id")?,
                required(&raw.cache_node_type, kind, "cache_node_type")?,
            );
            record.platform = with_vpc(
                engine_platform(raw.engine.as_deref()),
                raw.cache_subnet_group_name.is_some(),
            );
            record.placement = placement(raw.preferred_availability_zone.as_deref());
            record.state = parse_state(raw.cache_cluster_status.as_deref());
            record.count = raw.num_cache_nodes.unwrap_or(1).max(1);
            record.name = tags.get(tag_keys::NAME).cloned();
            record.group_key = tags.get(tag_keys::OWNING_STACK).cloned();
            record.tags = tags;
            Ok(record)
        }
        RawPayload::CacheReservation(raw) => {
            let mut record = base_record(
                kind,
                RecordOrigin::Reservation,
                required(&raw.reserved_cache_node_id, kind, "reserved_cache_node_id")?,
                required(&raw.cache_node_type, kind, "cache_node_type")?,
            );
            record.platform = engine_platform(raw.product_description.as_deref());
            record.state = parse_state(raw.state.as_deref());
            record.count = reservation_count(raw.cache_node_count, kind)?;
            record.retirement_timestamp = term_end(raw.start_time, raw.duration);
            Ok(record)
        }
    }
}

fn base_record(
    kind: ResourceKind,
    origin: RecordOrigin,
    id: String,
    resource_type: String,
) -> ResourceRecord {
    ResourceRecord {
        id,
        kind,
        origin,
        resource_type,
        platform: LINUX.to_string(),
        placement: String::new(),
        state: RecordState::Other,
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

fn required(value: &Option<String>, kind: ResourceKind, field: &'static str) -> Result<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| AuditError::malformed(kind.as_str(), field))
}

fn reservation_count(count: Option<u32>, kind: ResourceKind) -> Result<u32> {
    match count {
        None => Ok(1),
        Some(0) => Err(AuditError::malformed(kind.as_str(), "a positive count")),
        Some(n) => Ok(n),
    }
}

fn tag_map(tags: &[RawTag]) -> BTreeMap<String, String> {
    tags.iter()
        .map(|tag| (tag.key.clone(), tag.value.clone()))
        .collect()
}

/// Platform of a running instance: absent means Linux.
fn running_platform(raw: Option<&str>) -> String {
    match raw.map(str::trim).filter(|p| !p.is_empty()) {
        None => LINUX.to_string(),
        Some(platform) => NON_LINUX_MARKERS
            .iter()
            .find(|marker| marker.eq_ignore_ascii_case(platform))
            .map(|marker| marker.to_string())
            .unwrap_or_else(|| platform.to_string()),
    }
}

/// Platform of a reservation from its product description,
/// e.g. `Windows (Amazon VPC)` or `Linux/UNIX`.
fn description_platform(description: &str) -> String {
    let base = description
        .split(" (")
        .next()
        .unwrap_or(description)
        .trim();
    if base.is_empty() || base.starts_with("Linux/UNIX") {
        LINUX.to_string()
    } else {
        base.to_string()
    }
}

fn engine_platform(engine: Option<&str>) -> String {
    engine
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .map(str::to_string)
        .unwrap_or_default()
}

fn with_vpc(platform: String, in_vpc: bool) -> String {
    if in_vpc {
        format!("{platform}{VPC_SUFFIX}")
    } else {
        platform
    }
}

/// Availability zones arrive with stray trailing whitespace; it is trimmed.
fn placement(zone: Option<&str>) -> String {
    zone.map(str::trim).unwrap_or_default().to_string()
}

fn parse_state(raw: Option<&str>) -> RecordState {
    match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
        Some("running") | Some("available") => RecordState::Running,
        Some("stopped") => RecordState::Stopped,
        Some("active") => RecordState::Active,
        Some("retired") => RecordState::Retired,
        _ => RecordState::Other,
    }
}

fn term_end(start: Option<DateTime<Utc>>, duration_secs: Option<i64>) -> Option<DateTime<Utc>> {
    let start = start?;
    let duration = Duration::try_seconds(duration_secs?)?;
    start.checked_add_signed(duration)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ec2_instance(platform: Option<&str>) -> RawEc2Instance {
        RawEc2Instance {
            instance_id: Some("i-thisisfake".to_string()),
            instance_type: Some("t2.large".to_string()),
            vpc_id: Some("vpc-alsofake".to_string()),
            platform: platform.map(str::to_string),
            state: Some(RawInstanceState {
                name: Some("running".to_string()),
            }),
            placement: Some(RawPlacement {
                availability_zone: Some("us-east-1d  ".to_string()),
            }),
            key_name: Some("Example-instance-01".to_string()),
            tags: vec![
                RawTag {
                    key: "Name".to_string(),
                    value: "our-app-instance-100".to_string(),
                },
                RawTag {
                    key: "opsworks:stack".to_string(),
                    value: "our_app_service_2".to_string(),
                },
            ],
        }
    }

    fn ec2_reservation(description: &str, count: Option<u32>) -> RawEc2Reservation {
        RawEc2Reservation {
            reserved_instances_id: Some("12345-dfas-1234-asdf-thisisfake!!".to_string()),
            instance_type: Some("t2.medium".to_string()),
            product_description: Some(description.to_string()),
            state: Some("active".to_string()),
            availability_zone: Some("us-east-1b ".to_string()),
            instance_count: count,
            end: None,
        }
    }

    #[test]
    fn running_instance_fields_are_normalized() {
        let record = normalize(&RawPayload::Ec2Instance(ec2_instance(None))).unwrap();
        assert_eq!(record.id, "i-thisisfake");
        assert_eq!(record.resource_type, "t2.large");
        assert_eq!(record.platform, "Linux VPC");
        assert_eq!(record.placement, "us-east-1d");
        assert_eq!(record.state, RecordState::Running);
        assert_eq!(record.count, 1);
        assert_eq!(record.name.as_deref(), Some("our-app-instance-100"));
        assert_eq!(record.group_key.as_deref(), Some("our_app_service_2"));
        assert_eq!(record.origin, RecordOrigin::Running);
        assert_eq!(record.label(), "Linux VPC us-east-1d t2.large");
    }

    #[test]
    fn recognizes_windows_vs_linux() {
        let windows = normalize(&RawPayload::Ec2Instance(ec2_instance(Some("windows")))).unwrap();
        assert_eq!(windows.platform, "Windows VPC");

        let mut classic = ec2_instance(None);
        classic.vpc_id = None;
        let classic = normalize(&RawPayload::Ec2Instance(classic)).unwrap();
        assert_eq!(classic.platform, "Linux");
    }

    #[test]
    fn missing_placement_is_empty() {
        let mut raw = ec2_instance(None);
        raw.placement = None;
        let record = normalize(&RawPayload::Ec2Instance(raw)).unwrap();
        assert_eq!(record.placement, "");
    }

    #[test]
    fn name_falls_back_to_key_name() {
        let mut raw = ec2_instance(None);
        raw.tags.clear();
        let record = normalize(&RawPayload::Ec2Instance(raw)).unwrap();
        assert_eq!(record.name.as_deref(), Some("Example-instance-01"));
        assert_eq!(record.group_key, None);
    }

    #[test]
    fn reservation_platform_comes_from_description() {
        let windows =
            normalize(&RawPayload::Ec2Reservation(ec2_reservation("Windows (Amazon VPC)", Some(4))))
                .unwrap();
        assert_eq!(windows.platform, "Windows VPC");
        assert_eq!(windows.placement, "us-east-1b");
        assert_eq!(windows.count, 4);
        assert_eq!(windows.state, RecordState::Active);

        let linux =
            normalize(&RawPayload::Ec2Reservation(ec2_reservation("Linux/UNIX (Amazon VPC)", Some(2))))
                .unwrap();
        assert_eq!(linux.platform, "Linux VPC");

        let classic =
            normalize(&RawPayload::Ec2Reservation(ec2_reservation("Linux/UNIX", None))).unwrap();
        assert_eq!(classic.platform, "Linux");
        assert_eq!(classic.count, 1);
    }

    #[test]
    fn missing_identity_is_malformed() {
        let mut raw = ec2_instance(None);
        raw.instance_id = None;
        let err = normalize(&RawPayload::Ec2Instance(raw)).unwrap_err();
        assert!(matches!(
            err,
            AuditError::MalformedPayload {
                field: "instance_id",
                ..
            }
        ));

        let mut raw = ec2_reservation("Linux/UNIX", Some(1));
        raw.instance_type = Some("   ".to_string());
        assert!(normalize(&RawPayload::Ec2Reservation(raw)).is_err());
    }

    #[test]
    fn zero_count_reservation_is_malformed() {
        let raw = ec2_reservation("Linux/UNIX", Some(0));
        assert!(normalize(&RawPayload::Ec2Reservation(raw)).is_err());
    }

    #[test]
    fn rds_reservation_term_end_is_start_plus_duration() {
        let start = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        let raw = RawRdsReservation {
            reserved_db_instance_id: Some("ri-db-1".to_string()),
            db_instance_class: Some("db.m4.large".to_string()),
            product_description: Some("mysql".to_string()),
            state: Some("retired".to_string()),
            db_instance_count: Some(2),
            start_time: Some(start),
            duration: Some(31_536_000),
        };
        let record = normalize(&RawPayload::RdsReservation(raw)).unwrap();
        assert_eq!(record.platform, "mysql");
        assert_eq!(record.state, RecordState::Retired);
        assert_eq!(
            record.retirement_timestamp,
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn cache_cluster_counts_nodes() {
        let raw = RawCacheCluster {
            cache_cluster_id: Some("sessions-001".to_string()),
            cache_node_type: Some("cache.m3.medium".to_string()),
            engine: Some("redis".to_string()),
            cache_cluster_status: Some("available".to_string()),
            num_cache_nodes: Some(3),
            preferred_availability_zone: Some("us-east-1a".to_string()),
            cache_subnet_group_name: Some("private".to_string()),
            tags: vec![],
        };
        let record = normalize(&RawPayload::CacheCluster(raw)).unwrap();
        assert_eq!(record.platform, "redis VPC");
        assert_eq!(record.state, RecordState::Running);
        assert_eq!(record.count, 3);
    }

    #[test]
    fn payloads_deserialize_from_tagged_json() {
        let json = r#"{"payload":"ec2_instance","instance_id":"i-1","instance_type":"t2.small","state":{"name":"running"}}"#;
        let payload: RawPayload = serde_json::from_str(json).unwrap();
        assert_eq!(payload.kind(), ResourceKind::Ec2);
        assert_eq!(payload.origin(), RecordOrigin::Running);
        let record = normalize(&payload).unwrap();
        assert_eq!(record.platform, "Linux");
    }
}
