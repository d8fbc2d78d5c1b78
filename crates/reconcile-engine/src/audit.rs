//! Audit pipeline for one (region, kind) unit
//!
//! Normalize, classify, aggregate, reconcile, filter. Each call returns its
//! own [`AuditReport`]; an [`Auditor`] only holds immutable configuration and
//! can be shared across threads to audit regions in parallel.

use crate::aggregate::{aggregate, tally, to_type_counts};
use crate::engine::reconcile;
use crate::inventory::{Inventory, InventorySource};
use crate::normalizer::{normalize, RawPayload};
use crate::retirement::{filter_retired, filter_retired_tags};
use crate::tags::TagClassifier;
use auditor_core::{
    AuditError, AuditMode, AuditReport, CompiledConfig, MalformedPolicy, RecordOrigin,
    RecordState, ResourceKind, ResourceRecord, Result, RetiredTag, TagStatus,
};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Bucket name for records without an owning stack.
pub const UNGROUPED: &str = "(none)";

#[derive(Debug, Clone)]
pub struct Auditor {
    config: Arc<CompiledConfig>,
    classifier: TagClassifier,
}

impl Auditor {
    pub fn new(config: CompiledConfig) -> Self {
        let classifier = TagClassifier::new(
            config.watched_tag.clone(),
            config.reason_tag.clone(),
            config.ignore.clone(),
        );
        info!(
            watched_tag = config.watched_tag.as_deref().unwrap_or("-"),
            ignore_patterns = config.ignore.len(),
            window_days = config.retirement_window_days,
            "Initializing auditor"
        );
        Self {
            config: Arc::new(config),
            classifier,
        }
    }

    pub fn config(&self) -> &CompiledConfig {
        &self.config
    }

    /// Fetch from `source` and audit.
    pub fn audit_source(
        &self,
        source: &dyn InventorySource,
        region: &str,
        kind: ResourceKind,
        now: DateTime<Utc>,
    ) -> Result<AuditReport> {
        let inventory = source.fetch(region, kind)?;
        self.audit(region, kind, &inventory, now)
    }

    #[instrument(skip(self, inventory, now), fields(region = %region, kind = %kind, mode = ?self.config.mode))]
    pub fn audit(
        &self,
        region: &str,
        kind: ResourceKind,
        inventory: &Inventory,
        now: DateTime<Utc>,
    ) -> Result<AuditReport> {
        let mode = self.config.mode;
        let today = now.date_naive();
        let window = self.config.retirement_window_days;
        let mut skipped = Vec::new();

        let mut report = AuditReport {
            run_id: Uuid::new_v4(),
            region: region.to_string(),
            kind,
            mode,
            generated_at: now,
            classified: Vec::new(),
            inventory: Vec::new(),
            retired_reservations: Vec::new(),
            retired_tags: Vec::new(),
            clock_skew: Vec::new(),
            skipped: Vec::new(),
        };

        let (running, lapsed) = if mode == AuditMode::Reserved {
            (Vec::new(), Vec::new())
        } else {
            let records = self.normalize_all(&inventory.running, RecordOrigin::Running, &mut skipped)?;
            self.classify_running(records, now)
        };

        let reservations = if mode == AuditMode::Instances {
            Vec::new()
        } else {
            self.normalize_all(&inventory.reservations, RecordOrigin::Reservation, &mut skipped)?
        };
        let active = reservations
            .iter()
            .filter(|r| r.state == RecordState::Active);

        match mode {
            AuditMode::Instances => {
                report.inventory = to_type_counts(&tally(&running));
                report.retired_tags = filter_retired_tags(lapsed, today, window);
            }
            AuditMode::Reserved => {
                report.inventory = to_type_counts(&aggregate(active));
            }
            AuditMode::All => {
                let (tagged, ignored): (Vec<_>, Vec<_>) = running
                    .iter()
                    .filter(|r| r.tag_status != TagStatus::Untagged)
                    .cloned()
                    .partition(ResourceRecord::is_tagged);

                report.classified = reconcile(&aggregate(&running), &aggregate(active), &tagged, &ignored);

                let scan = filter_retired(&reservations, now, window);
                report.retired_reservations = scan.retired;
                report.clock_skew = scan.clock_skew;
                report.retired_tags = filter_retired_tags(lapsed, today, window);
            }
        }

        report.skipped = skipped;
        info!(
            classified = report.classified.len(),
            listed = report.inventory.len(),
            retired_reservations = report.retired_reservations.len(),
            retired_tags = report.retired_tags.len(),
            skipped = report.skipped.len(),
            "Audit unit complete"
        );
        Ok(report)
    }

    /// Running records grouped by owning stack, plus the messages for any
    /// payloads skipped as malformed.
    pub fn running_by_stack(
        &self,
        inventory: &Inventory,
    ) -> Result<(BTreeMap<String, Vec<ResourceRecord>>, Vec<String>)> {
        let mut skipped = Vec::new();
        let records = self.normalize_all(&inventory.running, RecordOrigin::Running, &mut skipped)?;
        Ok((bucketize(records), skipped))
    }

    fn normalize_all(
        &self,
        payloads: &[RawPayload],
        origin: RecordOrigin,
        skipped: &mut Vec<String>,
    ) -> Result<Vec<ResourceRecord>> {
        let mut records = Vec::with_capacity(payloads.len());
        for payload in payloads {
            let result = if payload.origin() == origin {
                normalize(payload)
            } else {
                Err(AuditError::malformed(payload.kind().as_str(), "a matching origin"))
            };

            match result {
                Ok(record) => records.push(record),
                Err(err) => match self.config.on_malformed {
                    MalformedPolicy::Abort => return Err(err),
                    MalformedPolicy::Skip => {
                        warn!("Skipping payload: {}", err);
                        skipped.push(err.to_string());
                    }
                },
            }
        }
        Ok(records)
    }

    /// Keep running records only and stamp their tag status.
    fn classify_running(
        &self,
        records: Vec<ResourceRecord>,
        now: DateTime<Utc>,
    ) -> (Vec<ResourceRecord>, Vec<RetiredTag>) {
        let today = now.date_naive();
        let mut lapsed = Vec::new();
        let running = records
            .into_iter()
            .filter(|r| r.state == RecordState::Running)
            .map(|r| {
                let (record, expired) = self.classifier.apply(r, today);
                lapsed.extend(expired);
                record
            })
            .collect();
        (running, lapsed)
    }
}

/// Group records by their owning stack.
pub fn bucketize(records: impl IntoIterator<Item = ResourceRecord>) -> BTreeMap<String, Vec<ResourceRecord>> {
    let mut buckets: BTreeMap<String, Vec<ResourceRecord>> = BTreeMap::new();
    for record in records {
        let key = record
            .group_key
            .clone()
            .unwrap_or_else(|| UNGROUPED.to_string());
        buckets.entry(key).or_default().push(record);
    }
    buckets
}
