//! Rennes Métropole OGC API Features source.
//!
//! Modern collections/items hierarchy returning GeoJSON in CRS84, so no
//! reprojection is needed. Pagination follows the `next` links. Feature ids
//! are persistent, so the provider participates in cross-run
//! reconciliation.

use async_trait::async_trait;
use carto_inondations_models::{ClosureType, Report, ReportSeq, Source, Status};
use serde_json::{Map, Value};

use crate::mapping::{self, FieldMap};
use crate::retry::{self, RetryPolicy};
use crate::{FloodSource, RawRecord, SourceError};

/// Items endpoint of the flooded-sections collection.
const RENNES_ITEMS_URL: &str =
    "https://public.sig.rennesmetropole.fr/ogcapi/collections/troncons_inondes/items";

/// Page size for the items request.
const PAGE_SIZE: u64 = 500;

/// Safety cap on `next`-link walking, in case a server loops.
const MAX_PAGES: u32 = 20;

/// Candidate source keys per canonical field.
const FIELDS: FieldMap = FieldMap {
    road: &["nom_voie", "route"],
    municipality: &["commune", "nom_commune"],
    cause: &["cause"],
    comment: &["observation", "commentaire"],
    manager: &["gestionnaire"],
    direction: &["sens_circulation", "sens"],
    start_date: &["date_debut"],
    end_date: &["date_fin"],
    recorded_date: &["date_creation", "date_saisie"],
};

/// Adapter for the Rennes Métropole OGC Features service.
pub struct RennesSource;

impl RennesSource {
    /// Creates the adapter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Default for RennesSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FloodSource for RennesSource {
    fn source(&self) -> Source {
        Source::RennesMetropole
    }

    async fn fetch(&self) -> Result<Vec<RawRecord>, SourceError> {
        let client = reqwest::Client::new();
        let mut raw = Vec::new();
        let mut url = format!("{RENNES_ITEMS_URL}?f=json&limit={PAGE_SIZE}");

        for _ in 0..MAX_PAGES {
            let body = retry::send_json(RetryPolicy::NONE, || client.get(&url)).await?;

            let features = body
                .get("features")
                .and_then(Value::as_array)
                .ok_or_else(|| SourceError::provider("OGC response has no features array"))?;

            for feature in features {
                match serde_json::from_value::<geojson::Feature>(feature.clone()) {
                    Ok(parsed) => raw.push(RawRecord::RennesMetropole(parsed)),
                    Err(e) => log::warn!("Rennes Métropole: unreadable feature skipped: {e}"),
                }
            }

            let Some(next) = next_link(&body) else {
                break;
            };
            url = next;
        }

        Ok(raw)
    }

    fn normalize(&self, raw: &RawRecord, seq: &mut ReportSeq) -> Option<Report> {
        let RawRecord::RennesMetropole(feature) = raw else {
            return None;
        };

        let geometry = feature.geometry.clone()?;
        let empty = Map::new();
        let properties = feature.properties.as_ref().unwrap_or(&empty);

        let etat = mapping::first_string(properties, &["etat", "statut"]).to_uppercase();
        let resolved = etat.starts_with("TERMIN") || etat.starts_with("LEV");

        let source_id = feature_id(feature)
            .or_else(|| {
                let fallback = mapping::first_string(properties, &["id_troncon", "gml_id", "id"]);
                if fallback.is_empty() { None } else { Some(fallback) }
            });

        let cause = {
            let value = mapping::first_string(properties, FIELDS.cause);
            if value.is_empty() {
                "Inondation".to_string()
            } else {
                value
            }
        };
        let manager = {
            let value = mapping::first_string(properties, FIELDS.manager);
            if value.is_empty() {
                "Rennes Métropole".to_string()
            } else {
                value
            }
        };

        Some(Report {
            id: seq.next_id(),
            source_id,
            source: Source::RennesMetropole,
            road: mapping::first_string(properties, FIELDS.road),
            municipality: mapping::first_string(properties, FIELDS.municipality),
            cause,
            status: if resolved {
                Status::Resolved
            } else {
                Status::Active
            },
            closure_type: if mapping::first_string(properties, &["type_coupure"])
                .to_uppercase()
                .contains("PARTIEL")
            {
                ClosureType::Partial
            } else {
                ClosureType::Total
            },
            direction: mapping::first_string(properties, FIELDS.direction),
            comment: mapping::first_string(properties, FIELDS.comment),
            manager,
            start_date: mapping::first_date(properties, FIELDS.start_date),
            end_date: mapping::first_date(properties, FIELDS.end_date),
            recorded_date: mapping::first_date(properties, FIELDS.recorded_date),
            deletion_date: None,
            geometry,
        })
    }
}

/// Extracts the feature-level id assigned by the service.
fn feature_id(feature: &geojson::Feature) -> Option<String> {
    match feature.id.as_ref()? {
        geojson::feature::Id::String(s) => Some(s.clone()),
        geojson::feature::Id::Number(n) => Some(n.to_string()),
    }
}

/// Finds the `next` pagination link in an OGC Features response.
fn next_link(body: &Value) -> Option<String> {
    body.get("links")?
        .as_array()?
        .iter()
        .find(|link| link.get("rel").and_then(Value::as_str) == Some("next"))?
        .get("href")
        .and_then(Value::as_str)
        .map(String::from)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn feature(value: Value) -> RawRecord {
        RawRecord::RennesMetropole(serde_json::from_value(value).unwrap())
    }

    #[test]
    fn normalizes_feature_with_numeric_id() {
        let raw = feature(json!({
            "type": "Feature",
            "id": 42,
            "geometry": {"type": "Point", "coordinates": [-1.68, 48.11]},
            "properties": {
                "nom_voie": "Rue de Nantes",
                "commune": "Rennes",
                "etat": "EN_COURS",
                "date_debut": "2024-01-15T07:00:00",
            },
        }));
        let mut seq = ReportSeq::new();
        let report = RennesSource::new().normalize(&raw, &mut seq).unwrap();
        assert_eq!(report.source_id.as_deref(), Some("42"));
        assert_eq!(report.source, Source::RennesMetropole);
        assert_eq!(report.road, "Rue de Nantes");
        assert_eq!(report.status, Status::Active);
        assert_eq!(report.manager, "Rennes Métropole");
    }

    #[test]
    fn lifted_closure_is_resolved() {
        let raw = feature(json!({
            "type": "Feature",
            "id": "troncon.7",
            "geometry": {"type": "Point", "coordinates": [-1.68, 48.11]},
            "properties": {"etat": "LEVEE", "date_fin": "2024-01-16T09:00:00"},
        }));
        let mut seq = ReportSeq::new();
        let report = RennesSource::new().normalize(&raw, &mut seq).unwrap();
        assert_eq!(report.status, Status::Resolved);
        assert_eq!(report.source_id.as_deref(), Some("troncon.7"));
    }

    #[test]
    fn feature_without_geometry_is_rejected() {
        let raw = feature(json!({
            "type": "Feature",
            "geometry": null,
            "properties": {"etat": "EN_COURS"},
        }));
        let mut seq = ReportSeq::new();
        assert!(RennesSource::new().normalize(&raw, &mut seq).is_none());
    }

    #[test]
    fn finds_next_link() {
        let body = json!({
            "links": [
                {"rel": "self", "href": "https://example.org/items?offset=0"},
                {"rel": "next", "href": "https://example.org/items?offset=500"},
            ],
        });
        assert_eq!(
            next_link(&body).as_deref(),
            Some("https://example.org/items?offset=500")
        );
        assert!(next_link(&json!({"links": []})).is_none());
    }
}
