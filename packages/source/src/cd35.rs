//! Ille-et-Vilaine departmental open-data source.
//!
//! Opendatasoft portal listing flooded road sections. Only records whose
//! circulation condition is `COUPEE` or `PARTIELLEMENT_INONDEE` are kept;
//! everything else (monitoring-only entries) is rejected at normalization.
//! The portal exposes no persistent record identifier, so these reports
//! carry no cross-run identity: the archive store skips them and they never
//! participate in deletion detection.

use async_trait::async_trait;
use carto_inondations_models::{ClosureType, Report, ReportSeq, Source, Status};
use serde_json::Value;

use crate::mapping::{self, FieldMap};
use crate::retry::{self, RetryPolicy};
use crate::{FloodSource, RawRecord, SourceError};

/// Records endpoint of the portal dataset.
const CD35_API_URL: &str =
    "https://data.ille-et-vilaine.fr/api/explore/v2.1/catalog/datasets/routes-inondees/records";

/// Page size for the paginated records API.
const PAGE_SIZE: u64 = 100;

/// Circulation conditions that make a record publishable.
const KEPT_CONDITIONS: [&str; 2] = ["COUPEE", "PARTIELLEMENT_INONDEE"];

/// Candidate source keys per canonical field.
const FIELDS: FieldMap = FieldMap {
    road: &["nom_voie", "route", "rd"],
    municipality: &["commune", "nom_commune"],
    cause: &["cause"],
    comment: &["observation", "commentaire"],
    manager: &["gestionnaire"],
    direction: &["sens_circulation", "sens"],
    start_date: &["date_debut", "date_deb"],
    end_date: &["date_fin"],
    recorded_date: &["date_saisie", "date_maj"],
};

/// Adapter for the Ille-et-Vilaine portal.
pub struct Cd35Source;

impl Cd35Source {
    /// Creates the adapter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Default for Cd35Source {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FloodSource for Cd35Source {
    fn source(&self) -> Source {
        Source::Cd35
    }

    async fn fetch(&self) -> Result<Vec<RawRecord>, SourceError> {
        let client = reqwest::Client::new();
        let mut raw = Vec::new();
        let mut offset: u64 = 0;

        loop {
            let url = format!("{CD35_API_URL}?limit={PAGE_SIZE}&offset={offset}");
            let body = retry::send_json(RetryPolicy::NONE, || client.get(&url)).await?;

            let results = body
                .get("results")
                .and_then(Value::as_array)
                .ok_or_else(|| SourceError::provider("CD35 response has no results array"))?;

            let count = u64::try_from(results.len()).unwrap_or(u64::MAX);
            for result in results {
                if let Some(record) = result.as_object() {
                    raw.push(RawRecord::Cd35(record.clone()));
                }
            }

            offset += count;
            if count < PAGE_SIZE {
                break;
            }
        }

        Ok(raw)
    }

    fn normalize(&self, raw: &RawRecord, seq: &mut ReportSeq) -> Option<Report> {
        let RawRecord::Cd35(record) = raw else {
            return None;
        };

        let condition =
            mapping::first_string(record, &["condition_circulation", "etat_circulation"])
                .to_uppercase();
        if !KEPT_CONDITIONS.contains(&condition.as_str()) {
            return None;
        }

        let geometry = mapping::ods_geometry(record)?;

        let cause = {
            let value = mapping::first_string(record, FIELDS.cause);
            if value.is_empty() {
                "Inondation".to_string()
            } else {
                value
            }
        };
        let manager = {
            let value = mapping::first_string(record, FIELDS.manager);
            if value.is_empty() {
                "Département d'Ille-et-Vilaine".to_string()
            } else {
                value
            }
        };

        Some(Report {
            id: seq.next_id(),
            // The portal reuses row order, not identifiers; nothing usable
            // survives across runs.
            source_id: None,
            source: Source::Cd35,
            road: mapping::first_string(record, FIELDS.road),
            municipality: mapping::first_string(record, FIELDS.municipality),
            cause,
            status: Status::Active,
            closure_type: if condition == "COUPEE" {
                ClosureType::Total
            } else {
                ClosureType::Partial
            },
            direction: mapping::first_string(record, FIELDS.direction),
            comment: mapping::first_string(record, FIELDS.comment),
            manager,
            start_date: mapping::first_date(record, FIELDS.start_date),
            end_date: mapping::first_date(record, FIELDS.end_date),
            recorded_date: mapping::first_date(record, FIELDS.recorded_date),
            deletion_date: None,
            geometry,
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn record(value: Value) -> RawRecord {
        RawRecord::Cd35(value.as_object().unwrap().clone())
    }

    #[test]
    fn keeps_cut_roads_as_total_closures() {
        let raw = record(json!({
            "condition_circulation": "COUPEE",
            "nom_voie": "D177",
            "commune": "Bruz",
            "date_debut": "2024-01-15T08:30:00",
            "geo_shape": {
                "type": "Feature",
                "geometry": {"type": "LineString", "coordinates": [[-1.7, 48.0], [-1.69, 48.01]]},
            },
        }));
        let mut seq = ReportSeq::new();
        let report = Cd35Source::new().normalize(&raw, &mut seq).unwrap();
        assert_eq!(report.closure_type, ClosureType::Total);
        assert_eq!(report.status, Status::Active);
        assert!(report.source_id.is_none());
        assert_eq!(report.cause, "Inondation");
        assert_eq!(report.manager, "Département d'Ille-et-Vilaine");
    }

    #[test]
    fn partially_flooded_roads_are_partial_closures() {
        let raw = record(json!({
            "condition_circulation": "partiellement_inondee",
            "geo_point_2d": {"lat": 48.1, "lon": -1.68},
        }));
        let mut seq = ReportSeq::new();
        let report = Cd35Source::new().normalize(&raw, &mut seq).unwrap();
        assert_eq!(report.closure_type, ClosureType::Partial);
    }

    #[test]
    fn rejects_other_circulation_conditions() {
        let raw = record(json!({
            "condition_circulation": "SURVEILLANCE",
            "geo_point_2d": {"lat": 48.1, "lon": -1.68},
        }));
        let mut seq = ReportSeq::new();
        assert!(Cd35Source::new().normalize(&raw, &mut seq).is_none());
    }

    #[test]
    fn rejects_record_without_geometry() {
        let raw = record(json!({"condition_circulation": "COUPEE"}));
        let mut seq = ReportSeq::new();
        assert!(Cd35Source::new().normalize(&raw, &mut seq).is_none());
    }
}
