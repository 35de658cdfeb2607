//! Run-to-run delta: detecting reports that vanished from their source.
//!
//! A provider that drops a report without ever marking it resolved would
//! otherwise leave an eternally-active entry in the archive. Comparing the
//! previous run's snapshot of active identities against the current run's
//! flags exactly those disappearances.

use carto_inondations_models::{dates, Report, RunSnapshot};
use chrono::{DateTime, Utc};

use crate::store::ArchiveStore;
use crate::ArchiveRepository;

/// Loads the previous run's snapshot. A corrupt or unreadable snapshot is
/// treated as a first run.
pub fn load_previous(repo: &dyn ArchiveRepository) -> Option<RunSnapshot> {
    match repo.load_snapshot() {
        Ok(snapshot) => snapshot,
        Err(e) => {
            log::warn!("instantané de passe précédente illisible ({e}), ignoré");
            None
        }
    }
}

/// Marks as deleted every archive entry that was active in the previous
/// run but is no longer active in the current one. Returns the number of
/// entries transitioned.
///
/// On a first run (`previous` is `None`) nothing is a disappearance.
/// The partition holding a vanished entry is not recorded in the snapshot,
/// so both the current Paris year and the one before are tried; an entry
/// found in neither (already purged, or older still) is left alone.
pub fn detect_deletions(
    store: &mut ArchiveStore<'_>,
    previous: Option<&RunSnapshot>,
    current: &[Report],
    now: DateTime<Utc>,
) -> usize {
    let Some(previous) = previous else {
        log::info!("première passe, aucune détection de disparition");
        return 0;
    };

    let current_snapshot = RunSnapshot::from_reports(current, now);
    let year = dates::paris_year(now);

    let mut deleted = 0;
    for key in &previous.active {
        if current_snapshot.contains(key) {
            continue;
        }
        if store.mark_deleted(key, year, now) || store.mark_deleted(key, year - 1, now) {
            log::info!(
                "signalement disparu de {}: {} marqué supprimé",
                key.source,
                key.source_id
            );
            deleted += 1;
        }
    }

    deleted
}

/// Persists the current run's active identities for the next run's delta.
/// A failed save costs one run of deletion detection, nothing more.
pub fn save_snapshot(repo: &dyn ArchiveRepository, current: &[Report], now: DateTime<Utc>) {
    let snapshot = RunSnapshot::from_reports(current, now);
    if let Err(e) = repo.save_snapshot(&snapshot) {
        log::warn!("instantané de passe non sauvegardé: {e}");
    }
}
