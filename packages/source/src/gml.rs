//! Minimal GML extraction for WFS `GetFeature` responses.
//!
//! The WFS provider returns one member element per road section, with
//! simple properties as direct children and a geometry subtree carrying
//! `gml:pos`/`gml:posList` coordinates in Lambert-93. This walks the
//! document once with `quick-xml`, collecting properties by local name and
//! coordinate runs into [`GmlGeometry`]. Namespace prefixes are ignored on
//! purpose: servers disagree on them, local names are stable.

use std::collections::BTreeMap;

use quick_xml::Reader;
use quick_xml::events::Event;

use crate::SourceError;

/// Geometry kind found in the GML subtree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GmlKind {
    /// Single position.
    Point,
    /// One coordinate run.
    LineString,
    /// Several coordinate runs (`gml:MultiCurve`).
    MultiLineString,
    /// Coordinate runs are rings.
    Polygon,
}

/// Planar geometry extracted from one feature, one `Vec<(x, y)>` per
/// coordinate run, in the source CRS (Lambert-93 metres).
#[derive(Debug, Clone, PartialEq)]
pub struct GmlGeometry {
    /// Geometry kind.
    pub kind: GmlKind,
    /// Coordinate runs.
    pub parts: Vec<Vec<(f64, f64)>>,
}

/// One WFS feature: `gml:id`, simple properties by local name, geometry.
#[derive(Debug, Clone, PartialEq)]
pub struct WfsFeature {
    /// The `gml:id` attribute, the provider's persistent identifier.
    pub id: Option<String>,
    /// Simple property values keyed by element local name.
    pub fields: BTreeMap<String, String>,
    /// Extracted geometry, absent when the member carries none.
    pub geometry: Option<GmlGeometry>,
}

impl WfsFeature {
    /// First non-empty property among `keys`, or the empty string.
    #[must_use]
    pub fn field(&self, keys: &[&str]) -> String {
        keys.iter()
            .find_map(|key| {
                let value = self.fields.get(*key)?;
                if value.is_empty() { None } else { Some(value.clone()) }
            })
            .unwrap_or_default()
    }
}

/// Parses a WFS `GetFeature` response, collecting every element whose local
/// name equals `feature_type`.
///
/// # Errors
///
/// Returns [`SourceError::Xml`] when the document is not well-formed.
pub fn parse_wfs(xml: &str, feature_type: &str) -> Result<Vec<WfsFeature>, SourceError> {
    let mut reader = Reader::from_str(xml);
    let mut features = Vec::new();
    let mut path: Vec<String> = Vec::new();
    let mut current: Option<WfsFeature> = None;
    let mut feature_depth = 0usize;
    let mut kind: Option<GmlKind> = None;
    let mut parts: Vec<Vec<(f64, f64)>> = Vec::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let local = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                if current.is_none() && local == feature_type {
                    feature_depth = path.len();
                    kind = None;
                    parts = Vec::new();
                    let id = e.attributes().flatten().find_map(|attr| {
                        if attr.key.local_name().as_ref() == b"id" {
                            String::from_utf8(attr.value.into_owned()).ok()
                        } else {
                            None
                        }
                    });
                    current = Some(WfsFeature {
                        id,
                        fields: BTreeMap::new(),
                        geometry: None,
                    });
                } else if current.is_some() {
                    match local.as_str() {
                        "Point" => kind = Some(GmlKind::Point),
                        "LineString" | "Curve" | "LineStringSegment" => {
                            if kind != Some(GmlKind::MultiLineString) {
                                kind = Some(GmlKind::LineString);
                            }
                        }
                        "MultiCurve" | "MultiLineString" => kind = Some(GmlKind::MultiLineString),
                        "Polygon" | "Surface" => kind = Some(GmlKind::Polygon),
                        _ => {}
                    }
                }
                path.push(local);
            }
            Event::End(_) => {
                path.pop();
                if path.len() == feature_depth {
                    if let Some(mut feature) = current.take() {
                        if !parts.is_empty() {
                            feature.geometry = Some(GmlGeometry {
                                kind: kind.unwrap_or(GmlKind::Point),
                                parts: std::mem::take(&mut parts),
                            });
                        }
                        features.push(feature);
                    }
                }
            }
            Event::Text(t) => {
                let Some(feature) = current.as_mut() else {
                    continue;
                };
                let text = match t.unescape() {
                    Ok(cow) => cow.trim().to_string(),
                    Err(_) => continue,
                };
                if text.is_empty() {
                    continue;
                }
                let Some(element) = path.last() else {
                    continue;
                };
                match element.as_str() {
                    "pos" | "posList" | "coordinates" => {
                        let coords = parse_coord_text(&text);
                        if !coords.is_empty() {
                            if kind.is_none() && element == "pos" {
                                kind = Some(GmlKind::Point);
                            }
                            parts.push(coords);
                        }
                    }
                    _ => {
                        // Simple properties are direct children of the
                        // feature element.
                        if path.len() == feature_depth + 2 {
                            feature.fields.insert(element.clone(), text);
                        }
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(features)
}

/// Parses a GML coordinate run: whitespace-separated numbers, or the older
/// `x,y x,y` form. Odd trailing numbers are dropped.
fn parse_coord_text(text: &str) -> Vec<(f64, f64)> {
    let mut numbers: Vec<f64> = Vec::new();
    for token in text.split_whitespace() {
        if token.contains(',') {
            numbers.extend(token.split(',').filter_map(|piece| piece.parse::<f64>().ok()));
        } else if let Ok(value) = token.parse::<f64>() {
            numbers.push(value);
        }
    }
    numbers.chunks_exact(2).map(|pair| (pair[0], pair[1])).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<wfs:FeatureCollection xmlns:wfs="http://www.opengis.net/wfs/2.0"
    xmlns:gml="http://www.opengis.net/gml/3.2"
    xmlns:ms="http://mapserver.gis.umn.edu/mapserver">
  <wfs:member>
    <ms:troncon_inonde gml:id="troncon_inonde.184">
      <ms:route>D768</ms:route>
      <ms:commune>Baud</ms:commune>
      <ms:etat>EN_COURS</ms:etat>
      <ms:msGeometry>
        <gml:LineString srsName="urn:ogc:def:crs:EPSG::2154">
          <gml:posList srsDimension="2">260000.0 6750000.0 260100.0 6750050.0</gml:posList>
        </gml:LineString>
      </ms:msGeometry>
    </ms:troncon_inonde>
  </wfs:member>
  <wfs:member>
    <ms:troncon_inonde gml:id="troncon_inonde.185">
      <ms:route>D24</ms:route>
      <ms:etat>TERMINE</ms:etat>
      <ms:msGeometry>
        <gml:Point><gml:pos>261000.0 6751000.0</gml:pos></gml:Point>
      </ms:msGeometry>
    </ms:troncon_inonde>
  </wfs:member>
</wfs:FeatureCollection>"#;

    #[test]
    fn extracts_features_with_ids_and_fields() {
        let features = parse_wfs(SAMPLE, "troncon_inonde").unwrap();
        assert_eq!(features.len(), 2);

        let first = &features[0];
        assert_eq!(first.id.as_deref(), Some("troncon_inonde.184"));
        assert_eq!(first.field(&["route"]), "D768");
        assert_eq!(first.field(&["commune"]), "Baud");
        assert_eq!(first.field(&["etat"]), "EN_COURS");

        let geometry = first.geometry.as_ref().unwrap();
        assert_eq!(geometry.kind, GmlKind::LineString);
        assert_eq!(geometry.parts.len(), 1);
        assert_eq!(geometry.parts[0].len(), 2);
        assert!((geometry.parts[0][0].0 - 260_000.0).abs() < f64::EPSILON);
    }

    #[test]
    fn extracts_point_geometry() {
        let features = parse_wfs(SAMPLE, "troncon_inonde").unwrap();
        let second = &features[1];
        let geometry = second.geometry.as_ref().unwrap();
        assert_eq!(geometry.kind, GmlKind::Point);
        assert_eq!(geometry.parts, vec![vec![(261_000.0, 6_751_000.0)]]);
        // Missing property falls back to empty.
        assert_eq!(second.field(&["commune"]), "");
    }

    #[test]
    fn unknown_feature_type_yields_nothing() {
        let features = parse_wfs(SAMPLE, "autre_type").unwrap();
        assert!(features.is_empty());
    }

    #[test]
    fn parses_comma_separated_coordinates() {
        let coords = parse_coord_text("260000.0,6750000.0 260100.0,6750050.0");
        assert_eq!(coords.len(), 2);
        assert!((coords[1].1 - 6_750_050.0).abs() < f64::EPSILON);
    }

    #[test]
    fn malformed_xml_is_an_error() {
        assert!(parse_wfs("<unclosed", "x").is_err());
    }
}
