#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Merge orchestrator: one scheduled pass over every source.
//!
//! A run fetches all sources concurrently, normalizes, filters through the
//! lifecycle rules, reconciles everything into the archive, detects
//! disappearances against the previous run's snapshot and emits the map
//! outputs. Individual source failures are absorbed into the health
//! summary; only a failure to write the outputs aborts the run.

pub mod lifecycle;
pub mod output;

use std::collections::BTreeMap;
use std::path::Path;
use std::time::{Duration, Instant};

use carto_inondations_archive::delta;
use carto_inondations_archive::store::ArchiveStore;
use carto_inondations_archive::ArchiveRepository;
use carto_inondations_health::{HealthMonitor, HealthSummary};
use carto_inondations_models::{dates, Report, ReportSeq};
use carto_inondations_source::{FloodSource, RawRecord, SourceError};
use chrono::{DateTime, Utc};

use output::{RunMetadata, SourceCounts};

/// Hard cap on a single source fetch.
pub const ADAPTER_TIMEOUT: Duration = Duration::from_secs(60);

/// Fatal run failure: the outputs could not be written.
#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    /// Output file could not be written.
    #[error("failed to write output: {0}")]
    Io(#[from] std::io::Error),

    /// Output document could not be encoded.
    #[error("failed to encode output: {0}")]
    Json(#[from] serde_json::Error),
}

/// Everything one pass produced, ready to emit.
#[derive(Debug)]
pub struct RunResult {
    /// Reports that passed the lifecycle filter, in normalization order.
    pub published: Vec<Report>,
    /// The `meta.json` document for this pass.
    pub metadata: RunMetadata,
}

/// Runs one full aggregation pass.
///
/// `previous_health` is the last published summary, used to carry each
/// source's `last_success` through failing runs. Nothing here is fatal;
/// emission is the caller's step.
pub async fn run_pipeline(
    adapters: &[Box<dyn FloodSource>],
    repo: &dyn ArchiveRepository,
    previous_health: Option<HealthSummary>,
    now: DateTime<Utc>,
) -> RunResult {
    let mut monitor = HealthMonitor::new(previous_health);

    log::info!("récupération: {} sources", adapters.len());
    let raw_batches = fetch_all(adapters, &mut monitor, now).await;

    log::info!("conversion");
    let mut seq = ReportSeq::new();
    let mut reports: Vec<Report> = Vec::new();
    let mut by_source: BTreeMap<String, SourceCounts> = BTreeMap::new();
    for (adapter, raws) in adapters.iter().zip(&raw_batches) {
        let tag = adapter.source().to_string();
        let before = reports.len();
        reports.extend(raws.iter().filter_map(|raw| adapter.normalize(raw, &mut seq)));
        by_source.entry(tag).or_default().received = count(reports.len() - before);
    }

    log::info!("filtrage: {} signalements normalisés", reports.len());
    let mut published: Vec<Report> = Vec::new();
    for report in &reports {
        if lifecycle::should_publish(report, now) {
            by_source
                .entry(report.source.to_string())
                .or_default()
                .published += 1;
            published.push(report.clone());
        }
    }
    let total_received = count(reports.len());
    let total_published = count(published.len());

    log::info!("archivage");
    let mut store = ArchiveStore::new(repo);
    for report in &reports {
        store.upsert(report, now);
    }
    let previous = delta::load_previous(repo);
    let deleted = delta::detect_deletions(&mut store, previous.as_ref(), &published, now);
    if deleted > 0 {
        log::info!("{deleted} signalements disparus marqués supprimés");
    }
    delta::save_snapshot(repo, &published, now);

    let metadata = RunMetadata {
        timestamp_utc: now,
        timestamp_local: dates::format_display(now),
        total_received,
        total_published,
        total_filtered: total_received - total_published,
        by_source,
        geometry_kinds: histogram(&published, |r| Some(r.geometry_kind().to_string())),
        by_manager: histogram(&published, |r| {
            (!r.manager.is_empty()).then(|| r.manager.clone())
        }),
        archive_note: store.status_note(),
        health: monitor.summarize(),
    };

    RunResult {
        published,
        metadata,
    }
}

/// Writes the pass outputs. The one fatal step.
///
/// # Errors
///
/// Returns [`MergeError`] when an output file cannot be written.
pub fn emit(output_dir: &Path, result: &RunResult) -> Result<(), MergeError> {
    log::info!(
        "émission: {} signalements publiés vers {}",
        result.published.len(),
        output_dir.display()
    );
    output::write_outputs(output_dir, &result.published, &result.metadata)
}

async fn fetch_all(
    adapters: &[Box<dyn FloodSource>],
    monitor: &mut HealthMonitor,
    now: DateTime<Utc>,
) -> Vec<Vec<RawRecord>> {
    let fetches = adapters.iter().map(|adapter| async move {
        let started = Instant::now();
        let outcome = tokio::time::timeout(ADAPTER_TIMEOUT, adapter.fetch()).await;
        let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let result = outcome.unwrap_or_else(|_| {
            Err(SourceError::provider(format!(
                "délai de {}s dépassé",
                ADAPTER_TIMEOUT.as_secs()
            )))
        });
        (result, latency_ms)
    });
    let outcomes = futures::future::join_all(fetches).await;

    let mut batches = Vec::with_capacity(adapters.len());
    for (adapter, (result, latency_ms)) in adapters.iter().zip(outcomes) {
        let tag = adapter.source().to_string();
        match result {
            Ok(raws) => {
                log::info!(
                    "{}: {} enregistrements bruts en {latency_ms}ms",
                    adapter.name(),
                    raws.len()
                );
                monitor.record_success(&tag, count(raws.len()), latency_ms, now);
                batches.push(raws);
            }
            Err(e) => {
                log::warn!("{}: échec de récupération: {e}", adapter.name());
                monitor.record_error(&tag, &e.to_string(), latency_ms);
                batches.push(Vec::new());
            }
        }
    }
    batches
}

fn count(len: usize) -> u64 {
    u64::try_from(len).unwrap_or(u64::MAX)
}

fn histogram<F>(reports: &[Report], mut key: F) -> BTreeMap<String, u64>
where
    F: FnMut(&Report) -> Option<String>,
{
    let mut counts = BTreeMap::new();
    for report in reports {
        if let Some(k) = key(report) {
            *counts.entry(k).or_insert(0) += 1;
        }
    }
    counts
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use carto_inondations_archive::memory::MemoryRepository;
    use carto_inondations_health::{GlobalStatus, SourceStatus};
    use carto_inondations_models::{ActiveKey, ClosureType, Source, Status};
    use chrono::{Duration as ChronoDuration, TimeZone as _};

    use super::*;

    struct MockSource {
        source: Source,
        queue: Mutex<VecDeque<Report>>,
        fail: bool,
    }

    impl MockSource {
        fn new(source: Source, reports: Vec<Report>) -> Self {
            Self {
                source,
                queue: Mutex::new(reports.into()),
                fail: false,
            }
        }

        fn failing(source: Source) -> Self {
            Self {
                source,
                queue: Mutex::new(VecDeque::new()),
                fail: true,
            }
        }
    }

    #[async_trait]
    impl FloodSource for MockSource {
        fn source(&self) -> Source {
            self.source
        }

        async fn fetch(&self) -> Result<Vec<RawRecord>, SourceError> {
            if self.fail {
                return Err(SourceError::provider("HTTP 503"));
            }
            let count = self.queue.lock().unwrap().len();
            let blank = geojson::Feature {
                bbox: None,
                geometry: None,
                id: None,
                properties: None,
                foreign_members: None,
            };
            Ok(vec![RawRecord::Diro(blank); count])
        }

        fn normalize(&self, _raw: &RawRecord, seq: &mut ReportSeq) -> Option<Report> {
            let mut report = self.queue.lock().unwrap().pop_front()?;
            report.id = seq.next_id();
            Some(report)
        }
    }

    fn report(source: Source, source_id: &str, status: Status) -> Report {
        Report {
            id: 0,
            source_id: Some(source_id.to_string()),
            source,
            road: "D177".to_string(),
            municipality: "Bruz".to_string(),
            cause: "Inondation".to_string(),
            status,
            closure_type: ClosureType::Total,
            direction: String::new(),
            comment: String::new(),
            manager: "CD35".to_string(),
            start_date: Some(Utc.with_ymd_and_hms(2024, 1, 10, 8, 0, 0).unwrap()),
            end_date: None,
            recorded_date: None,
            deletion_date: None,
            geometry: geojson::Geometry::new(geojson::Value::Point(vec![-1.68, 48.11])),
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 20, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn one_failing_source_does_not_block_the_others() {
        let adapters: Vec<Box<dyn FloodSource>> = vec![
            Box::new(MockSource::new(
                Source::Grist,
                vec![
                    report(Source::Grist, "1", Status::Active),
                    report(Source::Grist, "2", Status::Active),
                ],
            )),
            Box::new(MockSource::failing(Source::Cd56)),
        ];
        let repo = MemoryRepository::default();

        let result = run_pipeline(&adapters, &repo, None, now()).await;

        assert_eq!(result.published.len(), 2);
        assert_eq!(result.metadata.health.global, GlobalStatus::Critical);
        assert_eq!(
            result.metadata.health.sources["cd56"].status,
            SourceStatus::Error
        );
        assert_eq!(result.metadata.by_source["grist"].published, 2);
    }

    #[tokio::test]
    async fn filtered_accounting_adds_up_exactly() {
        let mut stale = report(Source::Cd35, "old", Status::Resolved);
        stale.end_date = Some(now() - ChronoDuration::hours(100));
        let adapters: Vec<Box<dyn FloodSource>> = vec![Box::new(MockSource::new(
            Source::Cd35,
            vec![
                report(Source::Cd35, "a", Status::Active),
                report(Source::Cd35, "b", Status::Active),
                stale,
            ],
        ))];
        let repo = MemoryRepository::default();

        let result = run_pipeline(&adapters, &repo, None, now()).await;

        let meta = &result.metadata;
        assert_eq!(meta.total_received, 3);
        assert_eq!(meta.total_published, 2);
        assert_eq!(meta.total_filtered, 1);
        assert_eq!(
            meta.total_received - meta.total_published,
            meta.total_filtered
        );
        assert_eq!(meta.by_source["cd35"].received, 3);
        assert_eq!(meta.by_source["cd35"].published, 2);
    }

    #[tokio::test]
    async fn filtered_reports_are_still_archived() {
        let mut stale = report(Source::Cd35, "old", Status::Resolved);
        stale.end_date = Some(now() - ChronoDuration::hours(100));
        let adapters: Vec<Box<dyn FloodSource>> =
            vec![Box::new(MockSource::new(Source::Cd35, vec![stale]))];
        let repo = MemoryRepository::default();

        run_pipeline(&adapters, &repo, None, now()).await;

        let archive = repo.load_year(2024).unwrap().expect("partition written");
        assert_eq!(archive.reports.len(), 1);
        assert_eq!(archive.reports[0].status, Status::Resolved);
    }

    #[tokio::test]
    async fn snapshot_is_saved_and_drives_deletion_on_the_next_run() {
        let repo = MemoryRepository::default();

        let adapters: Vec<Box<dyn FloodSource>> = vec![Box::new(MockSource::new(
            Source::Grist,
            vec![report(Source::Grist, "7", Status::Active)],
        ))];
        run_pipeline(&adapters, &repo, None, now()).await;

        let snapshot = repo.load_snapshot().unwrap().expect("snapshot saved");
        assert!(snapshot.contains(&ActiveKey {
            source: Source::Grist,
            source_id: "7".to_string(),
        }));

        // Next run: the report has vanished from its source.
        let empty: Vec<Box<dyn FloodSource>> =
            vec![Box::new(MockSource::new(Source::Grist, Vec::new()))];
        run_pipeline(&empty, &repo, None, now() + ChronoDuration::hours(1)).await;

        let archive = repo.load_year(2024).unwrap().expect("partition exists");
        assert_eq!(archive.reports[0].status, Status::Deleted);
        assert!(archive.reports[0].deletion_date.is_some());
    }

    #[tokio::test]
    async fn empty_fetch_degrades_health() {
        let adapters: Vec<Box<dyn FloodSource>> =
            vec![Box::new(MockSource::new(Source::Cd44, Vec::new()))];
        let repo = MemoryRepository::default();

        let result = run_pipeline(&adapters, &repo, None, now()).await;

        assert_eq!(result.metadata.health.global, GlobalStatus::Degraded);
        assert_eq!(
            result.metadata.health.sources["cd44"].status,
            SourceStatus::Empty
        );
        assert_eq!(result.metadata.total_received, 0);
    }

    #[tokio::test]
    async fn geometry_and_manager_histograms_cover_published_reports() {
        let mut line = report(Source::RennesMetropole, "l1", Status::Active);
        line.geometry = geojson::Geometry::new(geojson::Value::LineString(vec![
            vec![-1.67, 48.10],
            vec![-1.66, 48.11],
        ]));
        line.manager = "Rennes Métropole".to_string();
        let adapters: Vec<Box<dyn FloodSource>> = vec![
            Box::new(MockSource::new(
                Source::Grist,
                vec![report(Source::Grist, "1", Status::Active)],
            )),
            Box::new(MockSource::new(Source::RennesMetropole, vec![line])),
        ];
        let repo = MemoryRepository::default();

        let result = run_pipeline(&adapters, &repo, None, now()).await;

        assert_eq!(result.metadata.geometry_kinds["Point"], 1);
        assert_eq!(result.metadata.geometry_kinds["LineString"], 1);
        assert_eq!(result.metadata.by_manager["CD35"], 1);
        assert_eq!(result.metadata.by_manager["Rennes Métropole"], 1);
    }
}
