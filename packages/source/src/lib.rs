#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Flood-closure data source trait and per-provider adapters.
//!
//! Each upstream provider implements [`FloodSource`]: `fetch` pulls raw
//! records over the wire (or from disk for the DIRO feed), `normalize` maps
//! one raw record to the canonical [`Report`] or rejects it. Provider wire
//! shapes never leak past this crate: they are wrapped in the [`RawRecord`]
//! tagged union at the adapter boundary.

pub mod cd35;
pub mod cd44;
pub mod cd56;
pub mod diro;
pub mod gml;
pub mod grist;
pub mod mapping;
pub mod parsing;
pub mod projection;
pub mod registry;
pub mod rennes;
pub mod retry;

use async_trait::async_trait;
use carto_inondations_models::{Report, ReportSeq, Source};

/// Errors that can occur while fetching or decoding provider data.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// XML parsing failed (WFS/GML provider).
    #[error("XML parse error: {0}")]
    Xml(#[from] quick_xml::Error),

    /// GeoJSON decoding failed.
    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] Box<geojson::Error>),

    /// I/O error (local-file provider).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Provider-level failure (unexpected HTTP status, missing payload
    /// section, exhausted retries).
    #[error("provider error: {message}")]
    Provider {
        /// Description of what went wrong.
        message: String,
    },
}

impl SourceError {
    /// Shorthand for a [`SourceError::Provider`] with a formatted message.
    #[must_use]
    pub fn provider(message: impl Into<String>) -> Self {
        Self::Provider {
            message: message.into(),
        }
    }
}

/// One raw record as delivered by a provider, before normalization.
///
/// One variant per provider so that source-specific shapes stay inside
/// their adapter.
#[derive(Debug, Clone)]
pub enum RawRecord {
    /// A Grist table row.
    Grist(grist::GristRow),
    /// An Opendatasoft record from the Ille-et-Vilaine portal.
    Cd35(serde_json::Map<String, serde_json::Value>),
    /// An Opendatasoft record from the Loire-Atlantique portal.
    Cd44(serde_json::Map<String, serde_json::Value>),
    /// A WFS feature with Lambert-93 geometry.
    Cd56(gml::WfsFeature),
    /// An OGC API Features GeoJSON feature.
    RennesMetropole(geojson::Feature),
    /// A feature from the local DATEX II GeoJSON file.
    Diro(geojson::Feature),
}

/// Trait that every upstream provider implements.
///
/// `fetch` may fail; the orchestrator catches the failure and surfaces it
/// through the health monitor without stopping the other providers.
/// `normalize` returns `None` for records that lack usable geometry or do
/// not pass the provider's semantic filter (wrong circulation condition,
/// generic roadworks, ...) — that is rejection, not an error.
#[async_trait]
pub trait FloodSource: Send + Sync {
    /// The provider tag this adapter feeds.
    fn source(&self) -> Source;

    /// Human-readable provider name.
    fn name(&self) -> &'static str {
        self.source().label()
    }

    /// Fetches all current raw records from the provider.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] on network, HTTP status, parse or auth
    /// failure.
    async fn fetch(&self) -> Result<Vec<RawRecord>, SourceError>;

    /// Maps one raw record to the canonical [`Report`], or `None` when the
    /// record is rejected. The sequence is owned by the orchestrator so
    /// report IDs stay deterministic.
    fn normalize(&self, raw: &RawRecord, seq: &mut ReportSeq) -> Option<Report>;
}
