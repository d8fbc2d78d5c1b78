//! Reconciliation of running counts against reserved counts
//!
//! A pure function over the two count maps and the individually reported
//! records. Output is sorted by category priority, then type, so repeated
//! runs over the same input produce identical reports.

use auditor_core::{Category, ClassifiedRecord, ResourceRecord, TypeCountMap};
use std::collections::BTreeSet;
use tracing::debug;

pub fn reconcile(
    running_counts: &TypeCountMap,
    reserved_counts: &TypeCountMap,
    tagged_records: &[ResourceRecord],
    ignored_records: &[ResourceRecord],
) -> Vec<ClassifiedRecord> {
    let types: BTreeSet<&String> = running_counts.keys().chain(reserved_counts.keys()).collect();

    let mut classified = Vec::with_capacity(types.len() + tagged_records.len() + ignored_records.len());

    for resource_type in types {
        let running = running_counts.get(resource_type).copied().unwrap_or(0);
        let reserved = reserved_counts.get(resource_type).copied().unwrap_or(0);
        classified.extend(split_counts(resource_type, running, reserved));
    }

    classified.extend(tagged_records.iter().map(|record| ClassifiedRecord {
        resource_type: record.resource_type.clone(),
        count: record.count,
        category: Category::Tagged,
        resource_id: Some(record.id.clone()),
        name: record.name.clone(),
        expiration_value: record.expiration_value.clone(),
        expiration_reason: record.expiration_reason.clone(),
    }));

    classified.extend(ignored_records.iter().map(|record| ClassifiedRecord {
        resource_id: Some(record.id.clone()),
        name: record.name.clone(),
        ..ClassifiedRecord::counted(record.resource_type.clone(), 1, Category::Ignored)
    }));

    classified.sort_by(|a, b| {
        (a.category, &a.resource_type, &a.resource_id).cmp(&(
            b.category,
            &b.resource_type,
            &b.resource_id,
        ))
    });

    debug!(
        tagged = tagged_records.len(),
        ignored = ignored_records.len(),
        records = classified.len(),
        "Reconciled counts"
    );
    classified
}

/// Matched / missing / unused split for one type.
fn split_counts(resource_type: &str, running: u32, reserved: u32) -> Vec<ClassifiedRecord> {
    let mut out = Vec::with_capacity(2);
    let matched = running.min(reserved);
    if matched > 0 {
        out.push(ClassifiedRecord::counted(resource_type, matched, Category::Matched));
    }
    if running > reserved {
        out.push(ClassifiedRecord::counted(
            resource_type,
            running - reserved,
            Category::MissingReservation,
        ));
    } else if reserved > running {
        out.push(ClassifiedRecord::counted(
            resource_type,
            reserved - running,
            Category::UnusedReservation,
        ));
    }
    out
}
