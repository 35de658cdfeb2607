#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Per-source fetch health and the aggregated global status.
//!
//! Every adapter call is wrapped by the orchestrator and its outcome fed to
//! [`HealthMonitor::record_success`] / [`HealthMonitor::record_error`]. The
//! monitor is rebuilt each run; the only state carried across runs is each
//! source's last success timestamp, recovered from the previous run's
//! published summary so a failing source still shows how stale it is.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Outcome of a single source fetch.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceStatus {
    /// Fetch succeeded with at least one record.
    Ok,
    /// Fetch succeeded but returned zero records.
    Empty,
    /// Fetch failed (network, HTTP status, parse, auth, timeout).
    Error,
}

/// Aggregated status over all sources.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum GlobalStatus {
    /// Every source fetched at least one record.
    Ok,
    /// No source failed, but at least one returned zero records.
    Degraded,
    /// At least one source failed.
    Critical,
}

/// Health of one source for the current run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthRecord {
    /// Fetch outcome.
    #[serde(rename = "statut")]
    pub status: SourceStatus,
    /// Number of raw records received.
    #[serde(rename = "nb_enregistrements")]
    pub count: u64,
    /// Fetch latency in milliseconds.
    #[serde(rename = "latence_ms")]
    pub latency_ms: u64,
    /// Error message when `status` is [`SourceStatus::Error`].
    #[serde(rename = "derniere_erreur", default)]
    pub last_error: Option<String>,
    /// Last time this source fetched successfully (RFC 3339). Carried
    /// forward from the previous run when the current run errors.
    #[serde(rename = "dernier_succes", default)]
    pub last_success: Option<DateTime<Utc>>,
}

/// The published health summary: global status plus per-source records,
/// keyed by the source tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthSummary {
    /// Aggregated status.
    #[serde(rename = "statut_global")]
    pub global: GlobalStatus,
    /// Per-source records.
    #[serde(rename = "sources")]
    pub sources: BTreeMap<String, HealthRecord>,
}

/// Collects per-source outcomes during one run.
#[derive(Debug, Default)]
pub struct HealthMonitor {
    previous: Option<HealthSummary>,
    records: BTreeMap<String, HealthRecord>,
}

impl HealthMonitor {
    /// Creates a monitor, optionally seeded with the previous run's summary
    /// for `last_success` recovery.
    #[must_use]
    pub const fn new(previous: Option<HealthSummary>) -> Self {
        Self {
            previous,
            records: BTreeMap::new(),
        }
    }

    /// Records a successful fetch. Zero records is [`SourceStatus::Empty`].
    pub fn record_success(&mut self, source: &str, count: u64, latency_ms: u64, now: DateTime<Utc>) {
        let status = if count == 0 {
            SourceStatus::Empty
        } else {
            SourceStatus::Ok
        };
        self.records.insert(
            source.to_string(),
            HealthRecord {
                status,
                count,
                latency_ms,
                last_error: None,
                last_success: Some(now),
            },
        );
    }

    /// Records a failed fetch, recovering `last_success` from the previous
    /// run's summary when available.
    pub fn record_error(&mut self, source: &str, message: &str, latency_ms: u64) {
        let last_success = self
            .previous
            .as_ref()
            .and_then(|summary| summary.sources.get(source))
            .and_then(|record| record.last_success);
        self.records.insert(
            source.to_string(),
            HealthRecord {
                status: SourceStatus::Error,
                count: 0,
                latency_ms,
                last_error: Some(message.to_string()),
                last_success,
            },
        );
    }

    /// Folds the collected records into the published summary.
    #[must_use]
    pub fn summarize(self) -> HealthSummary {
        let global = aggregate(self.records.values().map(|r| r.status));
        HealthSummary {
            global,
            sources: self.records,
        }
    }
}

/// Pure reduction over per-source statuses: `Critical` if any `Error`,
/// else `Degraded` if any `Empty`, else `Ok`.
pub fn aggregate<I>(statuses: I) -> GlobalStatus
where
    I: IntoIterator<Item = SourceStatus>,
{
    let mut global = GlobalStatus::Ok;
    for status in statuses {
        match status {
            SourceStatus::Error => return GlobalStatus::Critical,
            SourceStatus::Empty => global = GlobalStatus::Degraded,
            SourceStatus::Ok => {}
        }
    }
    global
}
