//! DIR Ouest local-file source.
//!
//! An external DATEX II feed processor periodically writes
//! `datex-diro.geojson` into the data directory, already filtered to active
//! DIR Ouest events and reduced to point features. This adapter only reads
//! that file; its absence means the processor has not run yet and is not an
//! error.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use carto_inondations_models::{ClosureType, Report, ReportSeq, Source, Status};
use serde_json::Map;

use crate::{mapping, parsing, FloodSource, RawRecord, SourceError};

/// File name produced by the DATEX II feed processor.
const DIRO_FILE: &str = "datex-diro.geojson";

/// Adapter for the pre-processed DIR Ouest feed.
pub struct DiroSource {
    path: PathBuf,
}

impl DiroSource {
    /// Creates the adapter reading from `data_dir`.
    #[must_use]
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(DIRO_FILE),
        }
    }
}

#[async_trait]
impl FloodSource for DiroSource {
    fn source(&self) -> Source {
        Source::Diro
    }

    async fn fetch(&self) -> Result<Vec<RawRecord>, SourceError> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!(
                    "DIR Ouest: {} absent, le processeur DATEX n'a pas encore tourné",
                    self.path.display()
                );
                return Ok(Vec::new());
            }
            Err(e) => return Err(SourceError::Io(e)),
        };

        let geojson = text
            .parse::<geojson::GeoJson>()
            .map_err(|e| SourceError::GeoJson(Box::new(e)))?;
        let geojson::GeoJson::FeatureCollection(collection) = geojson else {
            return Err(SourceError::provider(
                "DIRO file is not a FeatureCollection",
            ));
        };

        Ok(collection
            .features
            .into_iter()
            .map(RawRecord::Diro)
            .collect())
    }

    fn normalize(&self, raw: &RawRecord, seq: &mut ReportSeq) -> Option<Report> {
        let RawRecord::Diro(feature) = raw else {
            return None;
        };

        let geometry = feature.geometry.clone()?;
        let empty = Map::new();
        let properties = feature.properties.as_ref().unwrap_or(&empty);

        let source_id = {
            let id = mapping::first_string(properties, &["id"]);
            if id.is_empty() { None } else { Some(id) }
        };
        let problem = mapping::first_string(properties, &["problem"]);

        Some(Report {
            id: seq.next_id(),
            source_id,
            source: Source::Diro,
            road: mapping::first_string(properties, &["road"]),
            municipality: String::new(),
            cause: if problem.is_empty() {
                "Obstruction".to_string()
            } else {
                problem.clone()
            },
            // The processor only exports events that are currently active.
            status: Status::Active,
            closure_type: if problem == "Route fermée" {
                ClosureType::Total
            } else {
                ClosureType::Partial
            },
            direction: String::new(),
            comment: mapping::first_string(properties, &["description"]),
            manager: "DIR Ouest".to_string(),
            start_date: properties
                .get("start_date")
                .and_then(serde_json::Value::as_str)
                .and_then(parsing::parse_iso_date),
            end_date: properties
                .get("end_date")
                .and_then(serde_json::Value::as_str)
                .and_then(parsing::parse_iso_date),
            recorded_date: properties
                .get("updated_at")
                .and_then(serde_json::Value::as_str)
                .and_then(parsing::parse_iso_date),
            deletion_date: None,
            geometry,
        })
    }
}
