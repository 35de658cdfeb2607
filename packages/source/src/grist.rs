//! Grist collaborative spreadsheet source.
//!
//! Field teams enter closures by hand in a shared Grist document; rows are
//! read through the documented records API with a bearer token. Credentials
//! come from the environment and their absence is not an error — the source
//! simply yields nothing so the rest of the run proceeds.

use async_trait::async_trait;
use carto_inondations_models::{ClosureType, Report, ReportSeq, Source, Status};
use serde_json::{Map, Value};

use crate::retry::{self, RetryPolicy};
use crate::{mapping, FloodSource, RawRecord, SourceError};

/// Base URL of the Grist instance's document API.
const GRIST_BASE_URL: &str = "https://grist.numerique.gouv.fr/api/docs";

/// Table holding the field reports.
const GRIST_TABLE: &str = "Signalements";

/// Environment variable with the document identifier.
pub const DOC_ENV: &str = "GRIST_DOC_ID";

/// Environment variable with the API key.
pub const KEY_ENV: &str = "GRIST_API_KEY";

/// The Grist API is occasionally flaky right after document edits; a few
/// fixed-delay retries smooth that over while keeping total time bounded.
const RETRY: RetryPolicy = RetryPolicy::fixed(3, 2);

/// One Grist table row: numeric row id plus the cell values.
#[derive(Debug, Clone)]
pub struct GristRow {
    /// Row identifier, stable for the life of the row.
    pub id: i64,
    /// Cell values keyed by column name.
    pub fields: Map<String, Value>,
}

/// Adapter for the Grist spreadsheet.
pub struct GristSource;

impl GristSource {
    /// Creates the adapter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Default for GristSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FloodSource for GristSource {
    fn source(&self) -> Source {
        Source::Grist
    }

    async fn fetch(&self) -> Result<Vec<RawRecord>, SourceError> {
        let (Ok(doc_id), Ok(api_key)) = (std::env::var(DOC_ENV), std::env::var(KEY_ENV)) else {
            log::warn!("Grist: {DOC_ENV}/{KEY_ENV} not set, skipping source");
            return Ok(Vec::new());
        };

        let url = format!("{GRIST_BASE_URL}/{doc_id}/tables/{GRIST_TABLE}/records");
        let client = reqwest::Client::new();
        let body = retry::send_json(RETRY, || client.get(&url).bearer_auth(&api_key)).await?;

        let records = body
            .get("records")
            .and_then(Value::as_array)
            .ok_or_else(|| SourceError::provider("Grist response has no records array"))?;

        let mut rows = Vec::with_capacity(records.len());
        for record in records {
            let Some(id) = record.get("id").and_then(Value::as_i64) else {
                continue;
            };
            let fields = record
                .get("fields")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default();
            rows.push(RawRecord::Grist(GristRow { id, fields }));
        }
        Ok(rows)
    }

    fn normalize(&self, raw: &RawRecord, seq: &mut ReportSeq) -> Option<Report> {
        let RawRecord::Grist(row) = raw else {
            return None;
        };

        let lat = number(&row.fields, "latitude");
        let lng = number(&row.fields, "longitude");
        let (lat, lng) = crate::parsing::parse_lat_lng(lat, lng)?;
        let geometry = geojson::Geometry::new(geojson::Value::Point(vec![lng, lat]));

        let resolved = row
            .fields
            .get("resolu")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let total = row
            .fields
            .get("coupure_totale")
            .and_then(Value::as_bool)
            .unwrap_or(true);

        Some(Report {
            id: seq.next_id(),
            source_id: Some(row.id.to_string()),
            source: Source::Grist,
            road: mapping::first_string(&row.fields, &["route", "voie"]),
            municipality: mapping::first_string(&row.fields, &["commune"]),
            cause: mapping::first_string(&row.fields, &["cause"]),
            status: if resolved {
                Status::Resolved
            } else {
                Status::Active
            },
            closure_type: if total {
                ClosureType::Total
            } else {
                ClosureType::Partial
            },
            direction: mapping::first_string(&row.fields, &["sens_circulation", "sens"]),
            comment: mapping::first_string(&row.fields, &["commentaire", "observations"]),
            manager: mapping::first_string(&row.fields, &["gestionnaire"]),
            start_date: mapping::first_date(&row.fields, &["date_debut"]),
            end_date: mapping::first_date(&row.fields, &["date_fin"]),
            recorded_date: mapping::first_date(&row.fields, &["date_saisie"]),
            deletion_date: None,
            geometry,
        })
    }
}

/// Reads a numeric cell that Grist may deliver as a number or a string.
fn number(fields: &Map<String, Value>, key: &str) -> Option<f64> {
    match fields.get(key) {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn row(fields: Value) -> RawRecord {
        RawRecord::Grist(GristRow {
            id: 17,
            fields: fields.as_object().unwrap().clone(),
        })
    }

    #[test]
    fn normalizes_active_row() {
        let raw = row(json!({
            "route": "D177",
            "commune": "Bruz",
            "cause": "Inondation",
            "latitude": 48.025,
            "longitude": -1.745,
            "coupure_totale": true,
            "resolu": false,
            "date_debut": 1_705_305_600,
        }));
        let mut seq = ReportSeq::new();
        let report = GristSource::new().normalize(&raw, &mut seq).unwrap();
        assert_eq!(report.id, 1);
        assert_eq!(report.source_id.as_deref(), Some("17"));
        assert_eq!(report.source, Source::Grist);
        assert_eq!(report.status, Status::Active);
        assert_eq!(report.closure_type, ClosureType::Total);
        assert_eq!(report.road, "D177");
        assert!(report.start_date.is_some());
        assert!(report.end_date.is_none());
    }

    #[test]
    fn resolved_row_carries_end_date() {
        let raw = row(json!({
            "latitude": "48.1",
            "longitude": "-1.6",
            "resolu": true,
            "coupure_totale": false,
            "date_fin": 1_705_392_000,
        }));
        let mut seq = ReportSeq::new();
        let report = GristSource::new().normalize(&raw, &mut seq).unwrap();
        assert_eq!(report.status, Status::Resolved);
        assert_eq!(report.closure_type, ClosureType::Partial);
        assert!(report.end_date.is_some());
    }

    #[test]
    fn row_without_coordinates_is_rejected() {
        let raw = row(json!({"route": "D177", "latitude": 48.0}));
        let mut seq = ReportSeq::new();
        assert!(GristSource::new().normalize(&raw, &mut seq).is_none());
    }

    #[test]
    fn foreign_raw_record_is_rejected() {
        let raw = RawRecord::Cd35(Map::new());
        let mut seq = ReportSeq::new();
        assert!(GristSource::new().normalize(&raw, &mut seq).is_none());
    }
}
