//! Watched-tag and ignore-pattern classification of running records.

use auditor_core::{IgnorePatterns, ResourceRecord, RetiredTag, TagStatus};
use chrono::NaiveDate;
use tracing::debug;

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y"];

/// Outcome of classifying one record.
#[derive(Debug, Clone, PartialEq)]
pub struct TagClassification {
    pub status: TagStatus,
    pub expiration_value: Option<String>,
    pub expiration_reason: Option<String>,
    /// Set when the watched tag carried a date that has already passed. The
    /// record itself stays tagged.
    pub lapsed: Option<RetiredTag>,
}

impl TagClassification {
    fn untagged() -> Self {
        Self {
            status: TagStatus::Untagged,
            expiration_value: None,
            expiration_reason: None,
            lapsed: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TagClassifier {
    watched_tag: Option<String>,
    reason_tag: String,
    ignore: IgnorePatterns,
}

impl TagClassifier {
    pub fn new(
        watched_tag: Option<String>,
        reason_tag: impl Into<String>,
        ignore: IgnorePatterns,
    ) -> Self {
        Self {
            watched_tag,
            reason_tag: reason_tag.into(),
            ignore,
        }
    }

    /// Classify `record` as of `today`.
    ///
    /// Ignore patterns win over the watched tag. A record carrying the
    /// watched tag is always tagged; a date before `today` is additionally
    /// reported through [`TagClassification::lapsed`].
    pub fn classify(&self, record: &ResourceRecord, today: NaiveDate) -> TagClassification {
        if self.is_ignored(record) {
            return TagClassification {
                status: TagStatus::Ignored,
                ..TagClassification::untagged()
            };
        }

        let Some(watched) = self.watched_tag.as_deref() else {
            return TagClassification::untagged();
        };
        let Some(value) = record.tag(watched) else {
            return TagClassification::untagged();
        };
        let reason = record.tag(&self.reason_tag).map(str::to_string);

        let lapsed = match parse_expiration(value) {
            Some(expired_on) if expired_on < today => Some(RetiredTag {
                resource_id: record.id.clone(),
                name: record.name.clone(),
                resource_type: record.resource_type.clone(),
                value: value.to_string(),
                reason: reason.clone(),
                expired_on,
            }),
            Some(_) => None,
            None => {
                debug!(resource_id = %record.id, value, "Watched tag value is not a date");
                None
            }
        };

        TagClassification {
            status: TagStatus::Tagged,
            expiration_value: Some(value.to_string()),
            expiration_reason: reason,
            lapsed,
        }
    }

    /// Classify and stamp the record, returning any lapsed tag alongside.
    pub fn apply(
        &self,
        record: ResourceRecord,
        today: NaiveDate,
    ) -> (ResourceRecord, Option<RetiredTag>) {
        let classification = self.classify(&record, today);
        let record = record.with_tag_status(
            classification.status,
            classification.expiration_value,
            classification.expiration_reason,
        );
        (record, classification.lapsed)
    }

    fn is_ignored(&self, record: &ResourceRecord) -> bool {
        if self.ignore.is_empty() {
            return false;
        }
        self.ignore.is_match(&record.id)
            || record
                .name
                .as_deref()
                .is_some_and(|name| self.ignore.is_match(name))
    }
}

/// Parse an expiration tag value as a calendar date.
pub fn parse_expiration(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(value, format).ok())
}
