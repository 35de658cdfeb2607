#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Permanent report archive and run-delta tracking.
//!
//! Every report ever observed is kept in per-calendar-year partitions,
//! keyed by (provider, upstream id). [`store::ArchiveStore`] reconciles
//! incoming reports against the stored entries (same-event refresh,
//! upstream ID reuse, resolution transitions); [`delta`] compares the
//! current run against the previous run's snapshot to detect reports that
//! silently disappeared from their source.
//!
//! Storage goes through the [`ArchiveRepository`] trait so the backend is
//! swappable; [`file_repo::FileRepository`] is the production flat-file
//! backend, [`memory::MemoryRepository`] backs the tests.

pub mod delta;
pub mod file_repo;
pub mod memory;
pub mod store;

use carto_inondations_models::RunSnapshot;
use store::ArchiveYear;

/// Errors surfaced by archive backends.
///
/// Callers treat all of these as non-fatal: a partition that cannot be
/// read is reinitialized empty with a warning, a failed save is logged and
/// the run goes on.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    /// I/O error (missing directory, permissions, ...).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Corrupt persisted document.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Persistence boundary for archive partitions and the run snapshot.
///
/// Absence is not an error: `load_year`/`load_snapshot` return `Ok(None)`
/// when nothing has been persisted yet. Corruption *is* an error here;
/// recovery policy (start fresh with a warning) lives in the callers.
pub trait ArchiveRepository: Send + Sync {
    /// Reads the partition for `year`, or `None` if never written.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError`] when the partition exists but cannot be
    /// read or decoded.
    fn load_year(&self, year: i32) -> Result<Option<ArchiveYear>, ArchiveError>;

    /// Persists the full partition for `year`. Last writer wins.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError`] when the partition cannot be written.
    fn save_year(&self, year: i32, archive: &ArchiveYear) -> Result<(), ArchiveError>;

    /// Reads the previous run's snapshot, or `None` on first run.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError`] when the snapshot exists but cannot be
    /// read or decoded.
    fn load_snapshot(&self) -> Result<Option<RunSnapshot>, ArchiveError>;

    /// Overwrites the persisted snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError`] when the snapshot cannot be written.
    fn save_snapshot(&self, snapshot: &RunSnapshot) -> Result<(), ArchiveError>;
}
