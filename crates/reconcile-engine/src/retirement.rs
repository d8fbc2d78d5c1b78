//! Recently-retired reservations and lapsed exemption tags.

use auditor_core::{ClockSkewWarning, RecordState, ResourceRecord, RetiredReservation, RetiredTag};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use tracing::{debug, warn};

/// Result of scanning reservations for recent retirements.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetirementScan {
    pub retired: Vec<RetiredReservation>,
    pub clock_skew: Vec<ClockSkewWarning>,
}

/// Keep retired reservations whose retirement falls in
/// `[now - window_days, now]`.
///
/// Older retirements were reported by an earlier run and are dropped.
/// Retirements in the future are dropped with a [`ClockSkewWarning`].
pub fn filter_retired<'a, I>(reservations: I, now: DateTime<Utc>, window_days: u32) -> RetirementScan
where
    I: IntoIterator<Item = &'a ResourceRecord>,
{
    let window_start = now
        .checked_sub_signed(Duration::days(i64::from(window_days)))
        .unwrap_or(DateTime::<Utc>::MIN_UTC);
    let mut scan = RetirementScan::default();

    for reservation in reservations {
        if reservation.state != RecordState::Retired {
            continue;
        }
        let Some(retired_at) = reservation.retirement_timestamp else {
            debug!(reservation_id = %reservation.id, "Retired reservation has no end date");
            continue;
        };

        if retired_at > now {
            let warning = ClockSkewWarning {
                reservation_id: reservation.id.clone(),
                retirement_timestamp: retired_at,
                observed_at: now,
            };
            warn!("Clock skew: {}", warning);
            scan.clock_skew.push(warning);
        } else if retired_at >= window_start {
            scan.retired.push(RetiredReservation {
                id: reservation.id.clone(),
                resource_type: reservation.resource_type.clone(),
                platform: reservation.platform.clone(),
                count: reservation.count,
                placement: Some(reservation.placement.clone()).filter(|p| !p.is_empty()),
                expiration_timestamp: retired_at,
            });
        }
    }

    scan.retired.sort_by(|a, b| {
        (a.expiration_timestamp, &a.resource_type, &a.id).cmp(&(
            b.expiration_timestamp,
            &b.resource_type,
            &b.id,
        ))
    });
    scan
}

/// Keep lapsed tags that expired in `[today - window_days, today)`.
pub fn filter_retired_tags(
    lapsed: impl IntoIterator<Item = RetiredTag>,
    today: NaiveDate,
    window_days: u32,
) -> Vec<RetiredTag> {
    let window_start = today
        .checked_sub_signed(Duration::days(i64::from(window_days)))
        .unwrap_or(NaiveDate::MIN);
    let mut retired: Vec<RetiredTag> = lapsed
        .into_iter()
        .filter(|tag| tag.expired_on >= window_start && tag.expired_on < today)
        .collect();
    retired.sort_by(|a, b| (a.expired_on, &a.resource_id).cmp(&(b.expired_on, &b.resource_id)));
    retired
}
