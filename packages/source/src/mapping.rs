//! Declarative field mapping for JSON providers.
//!
//! Each provider declares an ordered list of candidate source keys per
//! canonical field; [`first_string`] and [`first_date`] walk the list and
//! take the first usable value. This replaces per-record `a || b || c`
//! fallback chains with one table per provider.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::parsing;

/// Ordered candidate source keys for each canonical `Report` field.
///
/// Empty slices mean the provider has no such field and the canonical
/// default (empty string / `None`) applies.
#[derive(Debug, Clone, Copy)]
pub struct FieldMap {
    /// Road name or number.
    pub road: &'static [&'static str],
    /// Municipality.
    pub municipality: &'static [&'static str],
    /// Closure cause.
    pub cause: &'static [&'static str],
    /// Free-text comment.
    pub comment: &'static [&'static str],
    /// Managing authority.
    pub manager: &'static [&'static str],
    /// Traffic direction.
    pub direction: &'static [&'static str],
    /// Closure start.
    pub start_date: &'static [&'static str],
    /// Closure end.
    pub end_date: &'static [&'static str],
    /// Upstream entry date.
    pub recorded_date: &'static [&'static str],
}

/// Returns the first present value among `keys`.
#[must_use]
pub fn first_value<'a>(record: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|key| {
        let value = record.get(*key)?;
        if value.is_null() { None } else { Some(value) }
    })
}

/// Returns the first non-empty string among `keys`, trimmed. Numbers are
/// rendered to their decimal form. Missing everywhere: empty string.
#[must_use]
pub fn first_string(record: &Map<String, Value>, keys: &[&str]) -> String {
    for key in keys {
        match record.get(*key) {
            Some(Value::String(s)) if !s.trim().is_empty() => return s.trim().to_string(),
            Some(Value::Number(n)) => return n.to_string(),
            _ => {}
        }
    }
    String::new()
}

/// Returns the first parseable date among `keys`.
#[must_use]
pub fn first_date(record: &Map<String, Value>, keys: &[&str]) -> Option<DateTime<Utc>> {
    keys.iter().find_map(|key| match record.get(*key) {
        Some(Value::String(s)) => parsing::parse_any_date(s),
        Some(Value::Number(n)) => n.as_i64().and_then(parsing::parse_unix_seconds),
        _ => None,
    })
}

/// Extracts a GeoJSON geometry from an Opendatasoft record.
///
/// Portals expose either a `geo_shape` member (a Feature or a bare
/// geometry) or only a `geo_point_2d` centroid; both are accepted, the
/// shape wins when present.
#[must_use]
pub fn ods_geometry(record: &Map<String, Value>) -> Option<geojson::Geometry> {
    if let Some(shape) = first_value(record, &["geo_shape", "geometrie", "geometry"]) {
        let geom_value = shape.get("geometry").unwrap_or(shape);
        if let Ok(geometry) = serde_json::from_value::<geojson::Geometry>(geom_value.clone()) {
            return Some(geometry);
        }
    }
    let point = first_value(record, &["geo_point_2d"])?;
    let lat = point.get("lat")?.as_f64()?;
    let lon = point.get("lon")?.as_f64()?;
    Some(geojson::Geometry::new(geojson::Value::Point(vec![lon, lat])))
}
