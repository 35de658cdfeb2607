//! Shared parsing utilities for provider records.
//!
//! Upstream date fields arrive in three shapes: RFC 3339 with an offset,
//! naive ISO local time (the French portals), or the display form already
//! used in our own documents. Everything funnels through
//! [`parse_any_date`]; unparseable values become `None` (fail open).

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Europe::Paris;

use carto_inondations_models::dates;

/// Parses an ISO 8601 date string into a UTC instant.
///
/// Naive values (no offset) are interpreted as Europe/Paris local time,
/// which is what the departmental portals publish. Bare dates become local
/// midnight.
#[must_use]
pub fn parse_iso_date(s: &str) -> Option<DateTime<Utc>> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f") {
        return from_paris_naive(naive);
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S%.f") {
        return from_paris_naive(naive);
    }
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return from_paris_naive(date.and_hms_opt(0, 0, 0)?);
    }
    None
}

/// Parses either an ISO 8601 value or the French display form.
#[must_use]
pub fn parse_any_date(s: &str) -> Option<DateTime<Utc>> {
    parse_iso_date(s).or_else(|| dates::parse_display(s))
}

/// Parses a Unix timestamp in seconds (Grist date columns).
#[must_use]
pub fn parse_unix_seconds(seconds: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(seconds, 0)
}

/// Parses lat/lng from optional f64 values. Returns `None` if missing or
/// zero (portals use 0/0 for "no position").
#[must_use]
pub fn parse_lat_lng(lat: Option<f64>, lng: Option<f64>) -> Option<(f64, f64)> {
    let latitude = lat?;
    let longitude = lng?;
    if latitude == 0.0 || longitude == 0.0 {
        return None;
    }
    Some((latitude, longitude))
}

fn from_paris_naive(naive: NaiveDateTime) -> Option<DateTime<Utc>> {
    Paris
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}
