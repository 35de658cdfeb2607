//! Loire-Atlantique departmental open-data source.
//!
//! The portal publishes every kind of road perturbation (roadworks, events,
//! floods); only flood and obstacle records are relevant here, so the
//! semantic filter drops everything else. Like CD35 the portal exposes no
//! persistent identifier.

use async_trait::async_trait;
use carto_inondations_models::{ClosureType, Report, ReportSeq, Source, Status};
use serde_json::Value;

use crate::mapping::{self, FieldMap};
use crate::retry::{self, RetryPolicy};
use crate::{FloodSource, RawRecord, SourceError};

/// Records endpoint of the portal dataset.
const CD44_API_URL: &str = "https://data.loire-atlantique.fr/api/explore/v2.1/catalog/datasets/224400028_info-route-departementale/records";

/// Page size for the paginated records API.
const PAGE_SIZE: u64 = 100;

/// Perturbation natures that are relevant (lowercase substrings).
const KEPT_NATURES: [&str; 3] = ["inondation", "submersion", "obstacle"];

/// Candidate source keys per canonical field.
const FIELDS: FieldMap = FieldMap {
    road: &["route", "nom_voie", "numero_route"],
    municipality: &["commune", "nom_commune", "localisation"],
    cause: &["nature_perturbation", "type_perturbation"],
    comment: &["commentaire", "description"],
    manager: &["gestionnaire"],
    direction: &["sens_circulation", "sens"],
    start_date: &["date_debut", "date_deb"],
    end_date: &["date_fin"],
    recorded_date: &["date_maj", "date_saisie"],
};

/// Adapter for the Loire-Atlantique portal.
pub struct Cd44Source;

impl Cd44Source {
    /// Creates the adapter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Default for Cd44Source {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FloodSource for Cd44Source {
    fn source(&self) -> Source {
        Source::Cd44
    }

    async fn fetch(&self) -> Result<Vec<RawRecord>, SourceError> {
        let client = reqwest::Client::new();
        let mut raw = Vec::new();
        let mut offset: u64 = 0;

        loop {
            let url = format!("{CD44_API_URL}?limit={PAGE_SIZE}&offset={offset}");
            let body = retry::send_json(RetryPolicy::NONE, || client.get(&url)).await?;

            let results = body
                .get("results")
                .and_then(Value::as_array)
                .ok_or_else(|| SourceError::provider("CD44 response has no results array"))?;

            let count = u64::try_from(results.len()).unwrap_or(u64::MAX);
            for result in results {
                if let Some(record) = result.as_object() {
                    raw.push(RawRecord::Cd44(record.clone()));
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
        let RawRecord::Cd44(record) = raw else {
            return None;
        };

        let nature = mapping::first_string(record, FIELDS.cause).to_lowercase();
        if !KEPT_NATURES.iter().any(|kept| nature.contains(kept)) {
            return None;
        }

        let geometry = mapping::ods_geometry(record)?;

        let closure = mapping::first_string(record, &["type_fermeture", "fermeture"]);
        let manager = {
            let value = mapping::first_string(record, FIELDS.manager);
            if value.is_empty() {
                "Département de Loire-Atlantique".to_string()
            } else {
                value
            }
        };

        Some(Report {
            id: seq.next_id(),
            source_id: None,
            source: Source::Cd44,
            road: mapping::first_string(record, FIELDS.road),
            municipality: mapping::first_string(record, FIELDS.municipality),
            cause: mapping::first_string(record, FIELDS.cause),
            status: Status::Active,
            closure_type: if closure.to_lowercase().contains("partiel") {
                ClosureType::Partial
            } else {
                ClosureType::Total
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
