//! Which reports go on the public map.

use carto_inondations_models::{Report, Status};
use chrono::{DateTime, Duration, Utc};
use chrono_tz::Europe::Paris;

/// Resolved closures stay visible this long after their end date.
pub const RESOLVED_GRACE_HOURS: i64 = 72;

/// Publication decision for one report.
///
/// Active reports always publish. Resolved reports publish while their end
/// date is at most [`RESOLVED_GRACE_HOURS`] old, measured on a Paris wall
/// clock; a resolved report without an end date publishes (fail open).
/// Deleted reports never publish.
#[must_use]
pub fn should_publish(report: &Report, now: DateTime<Utc>) -> bool {
    match report.status {
        Status::Active => true,
        Status::Deleted => false,
        Status::Resolved => report.end_date.is_none_or(|end| {
            let end_local = end.with_timezone(&Paris).naive_local();
            let now_local = now.with_timezone(&Paris).naive_local();
            now_local.signed_duration_since(end_local) <= Duration::hours(RESOLVED_GRACE_HOURS)
        }),
    }
}

#[cfg(test)]
mod tests {
    use carto_inondations_models::{ClosureType, Source};
    use chrono::TimeZone as _;

    use super::*;

    fn report(status: Status, end_date: Option<DateTime<Utc>>) -> Report {
        Report {
            id: 1,
            source_id: Some("7".to_string()),
            source: Source::Cd35,
            road: "D163".to_string(),
            municipality: "Vitré".to_string(),
            cause: "Inondation".to_string(),
            status,
            closure_type: ClosureType::Total,
            direction: String::new(),
            comment: String::new(),
            manager: String::new(),
            start_date: Some(Utc.with_ymd_and_hms(2024, 1, 10, 8, 0, 0).unwrap()),
            end_date,
            recorded_date: None,
            deletion_date: None,
            geometry: geojson::Geometry::new(geojson::Value::Point(vec![-1.2, 48.12])),
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 20, 12, 0, 0).unwrap()
    }

    #[test]
    fn active_always_publishes() {
        assert!(should_publish(&report(Status::Active, None), now()));
    }

    #[test]
    fn deleted_never_publishes() {
        let mut deleted = report(Status::Deleted, None);
        deleted.deletion_date = Some(now());
        assert!(!should_publish(&deleted, now()));
    }

    #[test]
    fn resolved_without_end_date_publishes() {
        assert!(should_publish(&report(Status::Resolved, None), now()));
    }

    #[test]
    fn resolved_exactly_72h_old_still_publishes() {
        let end = now() - Duration::hours(RESOLVED_GRACE_HOURS);
        assert!(should_publish(&report(Status::Resolved, Some(end)), now()));
    }

    #[test]
    fn resolved_72h_and_one_minute_old_does_not_publish() {
        let end = now() - Duration::hours(RESOLVED_GRACE_HOURS) - Duration::minutes(1);
        assert!(!should_publish(&report(Status::Resolved, Some(end)), now()));
    }

    #[test]
    fn resolved_recently_publishes() {
        let end = now() - Duration::hours(2);
        assert!(should_publish(&report(Status::Resolved, Some(end)), now()));
    }
}
