//! Morbihan WFS/GML source.
//!
//! A classic WFS `GetFeature` service returning GML with Lambert-93
//! coordinates. Geometry is extracted by [`crate::gml`] and reprojected to
//! WGS84 here. The `gml:id` attribute is a persistent section identifier,
//! so this provider participates fully in cross-run reconciliation.

use async_trait::async_trait;
use carto_inondations_models::{ClosureType, Report, ReportSeq, Source, Status};

use crate::gml::{self, GmlGeometry, GmlKind};
use crate::projection::lambert93_to_wgs84;
use crate::retry::{self, RetryPolicy};
use crate::{parsing, FloodSource, RawRecord, SourceError};

/// WFS GetFeature URL, Lambert-93 output.
const CD56_WFS_URL: &str = "https://geo.morbihan.fr/ws/wfs?SERVICE=WFS&VERSION=2.0.0&REQUEST=GetFeature&TYPENAMES=troncon_inonde&SRSNAME=EPSG:2154";

/// Local name of the feature elements in the response.
const FEATURE_TYPE: &str = "troncon_inonde";

/// Adapter for the Morbihan WFS service.
pub struct Cd56Source;

impl Cd56Source {
    /// Creates the adapter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Default for Cd56Source {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FloodSource for Cd56Source {
    fn source(&self) -> Source {
        Source::Cd56
    }

    async fn fetch(&self) -> Result<Vec<RawRecord>, SourceError> {
        let client = reqwest::Client::new();
        let xml = retry::send_text(RetryPolicy::NONE, || client.get(CD56_WFS_URL)).await?;
        let features = gml::parse_wfs(&xml, FEATURE_TYPE)?;
        Ok(features.into_iter().map(RawRecord::Cd56).collect())
    }

    fn normalize(&self, raw: &RawRecord, seq: &mut ReportSeq) -> Option<Report> {
        let RawRecord::Cd56(feature) = raw else {
            return None;
        };

        let geometry = to_wgs84(feature.geometry.as_ref()?)?;

        let etat = feature.field(&["etat", "statut"]).to_uppercase();
        let resolved = etat.starts_with("TERMIN") || etat.starts_with("LEV");

        let cause = {
            let value = feature.field(&["cause"]);
            if value.is_empty() {
                "Inondation".to_string()
            } else {
                value
            }
        };

        Some(Report {
            id: seq.next_id(),
            source_id: feature.id.clone(),
            source: Source::Cd56,
            road: feature.field(&["route", "nom_route", "rd"]),
            municipality: feature.field(&["commune", "nom_commune"]),
            cause,
            status: if resolved {
                Status::Resolved
            } else {
                Status::Active
            },
            closure_type: if feature.field(&["type_coupure"]).to_uppercase().contains("PARTIEL") {
                ClosureType::Partial
            } else {
                ClosureType::Total
            },
            direction: feature.field(&["sens_circulation", "sens"]),
            comment: feature.field(&["observation", "commentaire"]),
            manager: "Département du Morbihan".to_string(),
            start_date: parsing::parse_any_date(&feature.field(&["date_debut"])),
            end_date: parsing::parse_any_date(&feature.field(&["date_fin"])),
            recorded_date: parsing::parse_any_date(&feature.field(&["date_maj", "date_saisie"])),
            deletion_date: None,
            geometry,
        })
    }
}

/// Reprojects a planar GML geometry into a WGS84 GeoJSON geometry.
fn to_wgs84(geometry: &GmlGeometry) -> Option<geojson::Geometry> {
    let parts: Vec<Vec<Vec<f64>>> = geometry
        .parts
        .iter()
        .map(|part| {
            part.iter()
                .map(|&(x, y)| {
                    let (lon, lat) = lambert93_to_wgs84(x, y);
                    vec![lon, lat]
                })
                .collect()
        })
        .collect();

    let value = match geometry.kind {
        GmlKind::Point => geojson::Value::Point(parts.first()?.first()?.clone()),
        GmlKind::LineString => geojson::Value::LineString(parts.into_iter().next()?),
        GmlKind::MultiLineString => geojson::Value::MultiLineString(parts),
        GmlKind::Polygon => geojson::Value::Polygon(parts),
    };
    Some(geojson::Geometry::new(value))
}
