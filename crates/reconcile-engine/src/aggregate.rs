//! Reduction of records into per-type counts.

use auditor_core::{RecordOrigin, ResourceRecord, TagStatus, TypeCount, TypeCountMap};

/// Sum `count` per type label.
///
/// Running records that are tagged or ignored are reported individually and
/// left out here. Reservations are never tag-filtered.
pub fn aggregate<'a, I>(records: I) -> TypeCountMap
where
    I: IntoIterator<Item = &'a ResourceRecord>,
{
    tally(records.into_iter().filter(|record| {
        record.origin == RecordOrigin::Reservation || record.tag_status == TagStatus::Untagged
    }))
}

/// Sum `count` per type label with no tag filtering, for inventory listings.
pub fn tally<'a, I>(records: I) -> TypeCountMap
where
    I: IntoIterator<Item = &'a ResourceRecord>,
{
    let mut counts = TypeCountMap::new();
    for record in records {
        let entry = counts.entry(record.resource_type.clone()).or_insert(0);
        *entry = entry.saturating_add(record.count);
    }
    counts
}

pub fn to_type_counts(counts: &TypeCountMap) -> Vec<TypeCount> {
    counts
        .iter()
        .map(|(resource_type, &count)| TypeCount {
            resource_type: resource_type.clone(),
            count,
        })
        .collect()
}
