#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Canonical flood road-closure report model.
//!
//! Every upstream provider (departmental open-data APIs, the Grist
//! spreadsheet, the WFS and OGC Features services, the local DATEX II feed)
//! normalizes its records into [`Report`]. The French property names on the
//! serde attributes are the downstream map-viewer contract and must stay
//! stable.

pub mod dates;

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

/// Upstream data provider.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Source {
    /// Collaborative Grist spreadsheet (field reports entered by hand).
    Grist,
    /// Ille-et-Vilaine departmental open-data API.
    Cd35,
    /// Loire-Atlantique departmental open-data API.
    Cd44,
    /// Morbihan WFS/GML geographic service.
    Cd56,
    /// Rennes Métropole OGC API Features service.
    RennesMetropole,
    /// DIR Ouest DATEX II feed, pre-processed into a local GeoJSON file.
    Diro,
}

impl Source {
    /// Human-readable provider name for logs and the health summary.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Grist => "Signalements terrain (Grist)",
            Self::Cd35 => "CD35 - Ille-et-Vilaine",
            Self::Cd44 => "CD44 - Loire-Atlantique",
            Self::Cd56 => "CD56 - Morbihan (WFS)",
            Self::RennesMetropole => "Rennes Métropole (OGC Features)",
            Self::Diro => "DIR Ouest (DATEX II)",
        }
    }
}

/// Whether the road is fully or partially closed.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
pub enum ClosureType {
    /// Road fully closed to traffic.
    #[serde(rename = "Totale")]
    #[strum(serialize = "Totale")]
    Total,
    /// One lane or direction still open.
    #[serde(rename = "Partielle")]
    #[strum(serialize = "Partielle")]
    Partial,
}

/// Report lifecycle state.
///
/// Exactly one state holds at any time. `Deleted` is only ever set by the
/// run-delta tracker when a previously active report vanishes from its
/// source; adapters never produce it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
pub enum Status {
    /// The closure is ongoing.
    #[serde(rename = "Actif")]
    #[strum(serialize = "Actif")]
    Active,
    /// The closure has been lifted upstream.
    #[serde(rename = "Résolu")]
    #[strum(serialize = "Résolu")]
    Resolved,
    /// The report disappeared from its source between two runs.
    #[serde(rename = "Supprimé")]
    #[strum(serialize = "Supprimé")]
    Deleted,
}

impl Status {
    /// `true` for [`Status::Active`].
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Active)
    }

    /// `true` for [`Status::Resolved`].
    #[must_use]
    pub const fn is_resolved(self) -> bool {
        matches!(self, Self::Resolved)
    }
}

/// One canonical road-obstruction/flood record after normalization.
///
/// Serde names follow the downstream French property contract; the same
/// shape is used for archive partitions, so archived reports round-trip
/// through the display date format (minute precision).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    /// Per-run sequential identifier; meaningless across runs.
    pub id: u64,
    /// Upstream identifier, absent for providers that expose none.
    #[serde(rename = "id_source", default)]
    pub source_id: Option<String>,
    /// Which provider produced this report.
    pub source: Source,
    /// Road name or number (e.g. `D177`).
    #[serde(rename = "route", default)]
    pub road: String,
    /// Municipality the closure is in.
    #[serde(rename = "commune", default)]
    pub municipality: String,
    /// Cause of the closure (flooding, fallen tree, ...).
    #[serde(default)]
    pub cause: String,
    /// Lifecycle state.
    #[serde(rename = "statut")]
    pub status: Status,
    /// Full or partial closure.
    #[serde(rename = "type_coupure")]
    pub closure_type: ClosureType,
    /// Traffic direction affected, free text.
    #[serde(rename = "sens_circulation", default)]
    pub direction: String,
    /// Free-text comment from the provider.
    #[serde(rename = "commentaire", default)]
    pub comment: String,
    /// Managing authority for the road section.
    #[serde(rename = "gestionnaire", default)]
    pub manager: String,
    /// When the closure started.
    #[serde(rename = "date_debut", with = "dates::date_fr", default)]
    pub start_date: Option<DateTime<Utc>>,
    /// When the closure ended, if resolved.
    #[serde(rename = "date_fin", with = "dates::date_fr", default)]
    pub end_date: Option<DateTime<Utc>>,
    /// When the record was entered upstream.
    #[serde(rename = "date_saisie", with = "dates::date_fr", default)]
    pub recorded_date: Option<DateTime<Utc>>,
    /// Set if and only if `status` is [`Status::Deleted`].
    #[serde(rename = "date_suppression", with = "dates::date_fr", default)]
    pub deletion_date: Option<DateTime<Utc>>,
    /// WGS84 geometry (Point, LineString, MultiLineString or Polygon).
    #[serde(rename = "geometrie")]
    pub geometry: geojson::Geometry,
}

impl Report {
    /// GeoJSON geometry type name, for the run-metadata histogram.
    #[must_use]
    pub fn geometry_kind(&self) -> &'static str {
        match self.geometry.value {
            geojson::Value::Point(_) => "Point",
            geojson::Value::MultiPoint(_) => "MultiPoint",
            geojson::Value::LineString(_) => "LineString",
            geojson::Value::MultiLineString(_) => "MultiLineString",
            geojson::Value::Polygon(_) => "Polygon",
            geojson::Value::MultiPolygon(_) => "MultiPolygon",
            geojson::Value::GeometryCollection(_) => "GeometryCollection",
        }
    }

    /// Transitions to [`Status::Deleted`], stamping the deletion date.
    pub fn mark_deleted(&mut self, now: DateTime<Utc>) {
        self.status = Status::Deleted;
        self.deletion_date = Some(now);
    }

    /// Transitions to [`Status::Resolved`], copying the end date. A
    /// previously deleted entry loses its deletion date: the two states are
    /// mutually exclusive.
    pub fn resolve(&mut self, end_date: DateTime<Utc>) {
        self.status = Status::Resolved;
        self.end_date = Some(end_date);
        self.deletion_date = None;
    }

    /// The cross-run identity key, present only when the provider exposes
    /// a persistent identifier.
    #[must_use]
    pub fn key(&self) -> Option<ActiveKey> {
        self.source_id.as_ref().map(|id| ActiveKey {
            source: self.source,
            source_id: id.clone(),
        })
    }
}

/// Explicit per-run sequence for `Report::id` values.
///
/// Owned by the merge orchestrator and threaded through normalization so
/// that IDs are deterministic in tests and no process-wide state exists.
#[derive(Debug, Default)]
pub struct ReportSeq(u64);

impl ReportSeq {
    /// Creates a sequence starting at 1.
    #[must_use]
    pub const fn new() -> Self {
        Self(0)
    }

    /// Returns the next identifier.
    pub fn next_id(&mut self) -> u64 {
        self.0 += 1;
        self.0
    }
}

/// Identity of an active report: (provider, upstream id).
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct ActiveKey {
    /// Provider tag.
    pub source: Source,
    /// Upstream identifier.
    #[serde(rename = "id_source")]
    pub source_id: String,
}

/// The set of report identities that were active as of the previous
/// completed run. Fully overwritten each run; used only to detect
/// disappearances.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSnapshot {
    /// When the snapshot was taken (RFC 3339). `None` on first run.
    #[serde(rename = "horodatage", default)]
    pub timestamp: Option<DateTime<Utc>>,
    /// Identities active at snapshot time, sorted for stable output.
    #[serde(rename = "actifs", default)]
    pub active: Vec<ActiveKey>,
}

impl RunSnapshot {
    /// Builds a snapshot from the current run's reports, keeping only
    /// active reports that carry an upstream identifier.
    #[must_use]
    pub fn from_reports(reports: &[Report], now: DateTime<Utc>) -> Self {
        let keys: BTreeSet<ActiveKey> = reports
            .iter()
            .filter(|r| r.status.is_active())
            .filter_map(Report::key)
            .collect();
        Self {
            timestamp: Some(now),
            active: keys.into_iter().collect(),
        }
    }

    /// `true` if the given identity was active at snapshot time.
    #[must_use]
    pub fn contains(&self, key: &ActiveKey) -> bool {
        self.active.contains(key)
    }
}
