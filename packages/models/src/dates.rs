//! Date handling for human-facing French timestamps.
//!
//! All persisted and emitted documents carry dates in the fixed display form
//! `DD/MM/YYYY à HHhMM`, rendered in Europe/Paris local time. Internally
//! dates are UTC instants; this module converts between the two. Parsing is
//! lenient: anything that does not match the display form becomes `None`.

use chrono::{DateTime, Datelike, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Europe::Paris;

/// The display format shown to map users, e.g. `12/01/2024 à 08h30`.
pub const DISPLAY_FORMAT: &str = "%d/%m/%Y à %Hh%M";

/// Formats an instant in the French display form (Europe/Paris).
#[must_use]
pub fn format_display(instant: DateTime<Utc>) -> String {
    instant
        .with_timezone(&Paris)
        .format(DISPLAY_FORMAT)
        .to_string()
}

/// Formats an optional instant; `None` becomes the empty string.
#[must_use]
pub fn format_display_opt(instant: Option<DateTime<Utc>>) -> String {
    instant.map(format_display).unwrap_or_default()
}

/// Parses the French display form back into a UTC instant.
///
/// Returns `None` for the empty string or any malformed value. During the
/// autumn DST fold the earlier of the two candidate instants is taken.
#[must_use]
pub fn parse_display(s: &str) -> Option<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(s.trim(), DISPLAY_FORMAT).ok()?;
    Paris
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Calendar year of an instant as seen on a Paris wall clock.
///
/// Archive partitions are keyed by this year, so an event starting
/// 31/12 at 23h30 local time belongs to the closing year even though
/// its UTC instant is already in January.
#[must_use]
pub fn paris_year(instant: DateTime<Utc>) -> i32 {
    instant.with_timezone(&Paris).year()
}

/// Minute-precision equality on the displayed local form.
///
/// Archived dates round-trip through [`DISPLAY_FORMAT`] and lose their
/// seconds, so cross-run comparisons (same-event detection) must compare
/// the display form rather than the raw instants.
#[must_use]
pub fn same_display(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> bool {
    format_display_opt(a) == format_display_opt(b)
}

/// Serde adapter for `Option<DateTime<Utc>>` fields stored in the French
/// display form. Use with `#[serde(with = "dates::date_fr")]`.
pub mod date_fr {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    /// Serializes as the display string, empty when absent.
    ///
    /// # Errors
    ///
    /// Propagates serializer errors.
    pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&super::format_display_opt(*value))
    }

    /// Deserializes from the display string; malformed or missing values
    /// become `None` rather than an error (fail open).
    ///
    /// # Errors
    ///
    /// Propagates deserializer errors for non-string input.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.as_deref().and_then(super::parse_display))
    }
}
