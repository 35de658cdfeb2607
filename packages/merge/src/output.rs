//! Map output and run-metadata emission.
//!
//! `routes-inondees.geojson` carries the published reports with the exact
//! property names the map viewer binds to; `meta.json` carries the run
//! accounting and the health summary. Both are written through a temp file
//! and a rename so consumers never see a half-written document.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use carto_inondations_health::HealthSummary;
use carto_inondations_models::{dates, Report};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::MergeError;

/// Published FeatureCollection file name.
pub const GEOJSON_FILE: &str = "routes-inondees.geojson";

/// Run metadata file name.
pub const META_FILE: &str = "meta.json";

/// Received/published counters for one source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceCounts {
    /// Reports normalized from this source this run.
    #[serde(rename = "recus")]
    pub received: u64,
    /// Of those, reports that passed the lifecycle filter.
    #[serde(rename = "publies")]
    pub published: u64,
}

/// The `meta.json` document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMetadata {
    /// Run timestamp, RFC 3339 UTC.
    #[serde(rename = "horodatage_utc")]
    pub timestamp_utc: DateTime<Utc>,
    /// Same instant in the French display form.
    #[serde(rename = "horodatage_local")]
    pub timestamp_local: String,
    /// Reports normalized across all sources.
    #[serde(rename = "total_recus")]
    pub total_received: u64,
    /// Reports published to the map.
    #[serde(rename = "total_publies")]
    pub total_published: u64,
    /// Always `total_received - total_published`.
    #[serde(rename = "total_filtres")]
    pub total_filtered: u64,
    /// Per-source counters, keyed by source tag.
    #[serde(rename = "par_source")]
    pub by_source: BTreeMap<String, SourceCounts>,
    /// Published-report count per GeoJSON geometry type.
    #[serde(rename = "types_geometrie")]
    pub geometry_kinds: BTreeMap<String, u64>,
    /// Published-report count per managing authority.
    #[serde(rename = "par_gestionnaire")]
    pub by_manager: BTreeMap<String, u64>,
    /// One-line archive partition summary.
    #[serde(rename = "archives")]
    pub archive_note: String,
    /// Full per-source health summary.
    #[serde(rename = "sante")]
    pub health: HealthSummary,
}

/// Builds the property object the map viewer binds to.
///
/// Property names are the downstream contract and must not change. Dates
/// are the French display strings (empty when absent); `statut_actif` and
/// `statut_resolu` are convenience booleans derived from `statut`.
#[must_use]
pub fn report_properties(report: &Report) -> geojson::JsonObject {
    let mut props = geojson::JsonObject::new();
    props.insert("id".to_string(), report.id.into());
    props.insert(
        "id_source".to_string(),
        report.source_id.clone().map_or(Value::Null, Value::String),
    );
    props.insert("source".to_string(), report.source.to_string().into());
    props.insert("route".to_string(), report.road.clone().into());
    props.insert("commune".to_string(), report.municipality.clone().into());
    props.insert("cause".to_string(), report.cause.clone().into());
    props.insert("statut".to_string(), report.status.to_string().into());
    props.insert("statut_actif".to_string(), report.status.is_active().into());
    props.insert(
        "statut_resolu".to_string(),
        report.status.is_resolved().into(),
    );
    props.insert(
        "type_coupure".to_string(),
        report.closure_type.to_string().into(),
    );
    props.insert(
        "sens_circulation".to_string(),
        report.direction.clone().into(),
    );
    props.insert("commentaire".to_string(), report.comment.clone().into());
    props.insert(
        "date_debut".to_string(),
        dates::format_display_opt(report.start_date).into(),
    );
    props.insert(
        "date_fin".to_string(),
        dates::format_display_opt(report.end_date).into(),
    );
    props.insert(
        "date_saisie".to_string(),
        dates::format_display_opt(report.recorded_date).into(),
    );
    props.insert(
        "date_suppression".to_string(),
        dates::format_display_opt(report.deletion_date).into(),
    );
    props.insert("gestionnaire".to_string(), report.manager.clone().into());
    props
}

/// Wraps one report as a GeoJSON feature.
#[must_use]
pub fn report_feature(report: &Report) -> geojson::Feature {
    geojson::Feature {
        bbox: None,
        geometry: Some(report.geometry.clone()),
        id: None,
        properties: Some(report_properties(report)),
        foreign_members: None,
    }
}

/// The published FeatureCollection.
#[must_use]
pub fn feature_collection(reports: &[Report]) -> geojson::FeatureCollection {
    geojson::FeatureCollection {
        bbox: None,
        features: reports.iter().map(report_feature).collect(),
        foreign_members: None,
    }
}

/// Writes `routes-inondees.geojson` and `meta.json` under `output_dir`.
///
/// This is the one fatal failure point of a run: a map that cannot be
/// refreshed is a systemic problem, unlike any single source failing.
///
/// # Errors
///
/// Returns [`MergeError`] when either file cannot be encoded or written.
pub fn write_outputs(
    output_dir: &Path,
    published: &[Report],
    metadata: &RunMetadata,
) -> Result<(), MergeError> {
    fs::create_dir_all(output_dir)?;
    write_atomic(
        &output_dir.join(GEOJSON_FILE),
        &serde_json::to_vec(&feature_collection(published))?,
    )?;
    write_atomic(
        &output_dir.join(META_FILE),
        &serde_json::to_vec_pretty(metadata)?,
    )?;
    Ok(())
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), MergeError> {
    let tmp = path.with_file_name(format!(
        "{}.tmp",
        path.file_name().and_then(|n| n.to_str()).unwrap_or("output")
    ));
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Reads the previous run's health summary out of `meta.json`, for
/// `last_success` carry-forward. Anything unreadable is just a first run.
#[must_use]
pub fn load_previous_health(output_dir: &Path) -> Option<HealthSummary> {
    let bytes = fs::read(output_dir.join(META_FILE)).ok()?;
    let value: Value = match serde_json::from_slice(&bytes) {
        Ok(value) => value,
        Err(e) => {
            log::warn!("meta.json précédent illisible ({e}), ignoré");
            return None;
        }
    };
    match serde_json::from_value(value.get("sante")?.clone()) {
        Ok(summary) => Some(summary),
        Err(e) => {
            log::warn!("section santé du meta.json précédent illisible ({e}), ignorée");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use carto_inondations_health::{GlobalStatus, HealthMonitor};
    use carto_inondations_models::{ClosureType, Source, Status};
    use chrono::TimeZone as _;

    use super::*;

    fn sample_report() -> Report {
        Report {
            id: 3,
            source_id: Some("r.15".to_string()),
            source: Source::RennesMetropole,
            road: "Avenue Aristide Briand".to_string(),
            municipality: "Rennes".to_string(),
            cause: "Inondation".to_string(),
            status: Status::Active,
            closure_type: ClosureType::Partial,
            direction: "sens entrant".to_string(),
            comment: String::new(),
            manager: "Rennes Métropole".to_string(),
            start_date: Some(Utc.with_ymd_and_hms(2024, 1, 10, 7, 30, 0).unwrap()),
            end_date: None,
            recorded_date: Some(Utc.with_ymd_and_hms(2024, 1, 10, 8, 0, 0).unwrap()),
            deletion_date: None,
            geometry: geojson::Geometry::new(geojson::Value::LineString(vec![
                vec![-1.67, 48.10],
                vec![-1.66, 48.11],
            ])),
        }
    }

    fn metadata() -> RunMetadata {
        let now = Utc.with_ymd_and_hms(2024, 1, 15, 6, 0, 0).unwrap();
        let mut monitor = HealthMonitor::new(None);
        monitor.record_success("rennes_metropole", 1, 120, now);
        RunMetadata {
            timestamp_utc: now,
            timestamp_local: dates::format_display(now),
            total_received: 1,
            total_published: 1,
            total_filtered: 0,
            by_source: BTreeMap::new(),
            geometry_kinds: BTreeMap::new(),
            by_manager: BTreeMap::new(),
            archive_note: "archives 2024: 1 signalements".to_string(),
            health: monitor.summarize(),
        }
    }

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("carto-out-{}", uuid::Uuid::new_v4()))
    }

    #[test]
    fn properties_carry_the_full_contract() {
        let props = report_properties(&sample_report());
        for key in [
            "id",
            "id_source",
            "source",
            "route",
            "commune",
            "cause",
            "statut",
            "statut_actif",
            "statut_resolu",
            "type_coupure",
            "sens_circulation",
            "commentaire",
            "date_debut",
            "date_fin",
            "date_saisie",
            "date_suppression",
            "gestionnaire",
        ] {
            assert!(props.contains_key(key), "missing property {key}");
        }
        assert_eq!(props["statut"], "Actif");
        assert_eq!(props["statut_actif"], true);
        assert_eq!(props["statut_resolu"], false);
        assert_eq!(props["type_coupure"], "Partielle");
        assert_eq!(props["source"], "rennes_metropole");
        assert_eq!(props["date_debut"], "10/01/2024 à 08h30");
        assert_eq!(props["date_fin"], "");
    }

    #[test]
    fn missing_source_id_serializes_as_null() {
        let mut report = sample_report();
        report.source_id = None;
        assert_eq!(report_properties(&report)["id_source"], Value::Null);
    }

    #[test]
    fn outputs_round_trip_through_the_filesystem() {
        let dir = temp_dir();
        let published = vec![sample_report()];
        write_outputs(&dir, &published, &metadata()).unwrap();

        let geojson_bytes = fs::read(dir.join(GEOJSON_FILE)).unwrap();
        let collection: geojson::FeatureCollection =
            serde_json::from_slice(&geojson_bytes).unwrap();
        assert_eq!(collection.features.len(), 1);

        let health = load_previous_health(&dir).expect("meta.json written");
        assert_eq!(health.global, GlobalStatus::Ok);
        assert!(!dir.join(format!("{GEOJSON_FILE}.tmp")).exists());
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn previous_health_is_none_without_meta_file() {
        assert!(load_previous_health(&temp_dir()).is_none());
    }

    #[test]
    fn corrupt_meta_file_is_ignored() {
        let dir = temp_dir();
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(META_FILE), b"pas du json").unwrap();
        assert!(load_previous_health(&dir).is_none());
        let _ = fs::remove_dir_all(dir);
    }
}
