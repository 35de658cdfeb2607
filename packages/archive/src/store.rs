//! Per-year archive partitions and the upsert reconciliation logic.

use std::collections::HashMap;

use carto_inondations_models::{dates, ActiveKey, Report, Status};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ArchiveRepository;

/// One persisted calendar-year partition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveYear {
    /// Calendar year (Europe/Paris) of the contained reports' start dates.
    #[serde(rename = "annee")]
    pub year: i32,
    /// Stamped on every save (RFC 3339).
    #[serde(rename = "derniere_modification", default)]
    pub last_modified: Option<DateTime<Utc>>,
    /// All reports whose event started in this year, append/update only.
    #[serde(rename = "signalements", default)]
    pub reports: Vec<Report>,
}

impl ArchiveYear {
    /// A fresh, empty partition.
    #[must_use]
    pub const fn empty(year: i32) -> Self {
        Self {
            year,
            last_modified: None,
            reports: Vec::new(),
        }
    }
}

/// Result of one [`ArchiveStore::upsert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// Report carries no upstream id or no parseable start date; not
    /// archived.
    Skipped,
    /// First sighting of this (provider, id, start date): appended.
    Inserted,
    /// Same (provider, id) already archived with a different start date:
    /// the upstream reused an identifier, appended as a distinct event.
    InsertedIdReuse,
    /// Same event re-observed: mutable fields refreshed in place.
    Updated,
}

/// Reconciles incoming reports against the persisted partitions.
///
/// Partitions are loaded lazily and cached for the duration of the run;
/// every mutation is persisted immediately. Load and save failures are
/// warnings, never errors: a corrupt partition restarts empty, a failed
/// save leaves the previous file in place.
pub struct ArchiveStore<'a> {
    repo: &'a dyn ArchiveRepository,
    years: HashMap<i32, ArchiveYear>,
}

impl<'a> ArchiveStore<'a> {
    /// Creates a store over the given repository.
    #[must_use]
    pub fn new(repo: &'a dyn ArchiveRepository) -> Self {
        Self {
            repo,
            years: HashMap::new(),
        }
    }

    /// Inserts or updates one report in its start-year partition.
    ///
    /// Reports without an upstream id are never reconciled: providers like
    /// CD35/CD44 expose no stable identifier, so each sighting would match
    /// nothing meaningful. They are skipped here and the caller appends
    /// nothing to history for them.
    pub fn upsert(&mut self, report: &Report, now: DateTime<Utc>) -> UpsertOutcome {
        let Some(source_id) = report.source_id.clone() else {
            log::debug!(
                "archive: signalement {} sans identifiant amont, non archivé",
                report.source
            );
            return UpsertOutcome::Skipped;
        };
        let Some(start_date) = report.start_date else {
            log::warn!(
                "archive: {}/{source_id} sans date de début exploitable, non archivé",
                report.source
            );
            return UpsertOutcome::Skipped;
        };

        let year = dates::paris_year(start_date);
        let archive = self.year_mut(year);

        let mut key_seen = false;
        let mut same_event = None;
        for (idx, entry) in archive.reports.iter().enumerate() {
            if entry.source == report.source && entry.source_id.as_deref() == Some(&source_id) {
                key_seen = true;
                if dates::same_display(entry.start_date, report.start_date) {
                    same_event = Some(idx);
                    break;
                }
            }
        }

        let outcome = if let Some(idx) = same_event {
            let entry = &mut archive.reports[idx];
            if !entry.status.is_resolved() && report.status.is_resolved() {
                if let Some(end_date) = report.end_date {
                    entry.resolve(end_date);
                }
            }
            entry.geometry = report.geometry.clone();
            entry.closure_type = report.closure_type;
            entry.comment = report.comment.clone();
            UpsertOutcome::Updated
        } else {
            let mut stored = report.clone();
            stored.deletion_date = None;
            archive.reports.push(stored);
            if key_seen {
                log::info!(
                    "archive: id {source_id} réutilisé par {}, nouvel événement distinct",
                    report.source
                );
                UpsertOutcome::InsertedIdReuse
            } else {
                UpsertOutcome::Inserted
            }
        };

        self.persist(year, now);
        outcome
    }

    /// Transitions the entry matching `key` in `year`'s partition to
    /// `Deleted`, if it exists and is still active. Returns whether a
    /// transition happened.
    pub fn mark_deleted(&mut self, key: &ActiveKey, year: i32, now: DateTime<Utc>) -> bool {
        let archive = self.year_mut(year);
        let Some(entry) = archive.reports.iter_mut().find(|entry| {
            entry.source == key.source
                && entry.source_id.as_deref() == Some(&key.source_id)
                && entry.status == Status::Active
                && entry.deletion_date.is_none()
        }) else {
            return false;
        };

        entry.mark_deleted(now);
        self.persist(year, now);
        true
    }

    /// Read access to a year's entries (loads the partition if needed).
    pub fn entries(&mut self, year: i32) -> &[Report] {
        &self.year_mut(year).reports
    }

    /// One-line description of the partitions touched this run, for the
    /// run metadata.
    #[must_use]
    pub fn status_note(&self) -> String {
        let mut years: Vec<i32> = self.years.keys().copied().collect();
        years.sort_unstable();
        if years.is_empty() {
            return "aucune partition d'archive touchée".to_string();
        }
        let parts: Vec<String> = years
            .iter()
            .map(|year| {
                let count = self.years[year].reports.len();
                format!("{year}: {count} signalements")
            })
            .collect();
        format!("archives {}", parts.join(", "))
    }

    fn year_mut(&mut self, year: i32) -> &mut ArchiveYear {
        let repo = self.repo;
        self.years.entry(year).or_insert_with(|| {
            match repo.load_year(year) {
                Ok(Some(archive)) => archive,
                Ok(None) => ArchiveYear::empty(year),
                Err(e) => {
                    log::warn!("archive {year} illisible ({e}), réinitialisée vide");
                    ArchiveYear::empty(year)
                }
            }
        })
    }

    fn persist(&mut self, year: i32, now: DateTime<Utc>) {
        if let Some(archive) = self.years.get_mut(&year) {
            archive.last_modified = Some(now);
            if let Err(e) = self.repo.save_year(year, archive) {
                log::warn!("archive {year} non sauvegardée: {e}");
            }
        }
    }
}
