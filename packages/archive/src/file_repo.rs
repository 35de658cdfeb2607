//! Flat-file archive backend.
//!
//! Each year lives in `archive-<year>.json`, the run snapshot in
//! `derniere-passe.json`, all under a single data directory. Writes go
//! through a temp file and an atomic rename so a crash mid-write never
//! truncates an existing partition.

use std::fs;
use std::path::{Path, PathBuf};

use carto_inondations_models::RunSnapshot;
use serde::Serialize;

use crate::store::ArchiveYear;
use crate::{ArchiveError, ArchiveRepository};

/// Snapshot file name inside the data directory.
pub const SNAPSHOT_FILE: &str = "derniere-passe.json";

/// [`ArchiveRepository`] persisting to JSON files in one directory.
#[derive(Debug, Clone)]
pub struct FileRepository {
    dir: PathBuf,
}

impl FileRepository {
    /// Creates a repository rooted at `dir`. The directory is created on
    /// the first write, not here.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn year_path(&self, year: i32) -> PathBuf {
        self.dir.join(format!("archive-{year}.json"))
    }

    fn snapshot_path(&self) -> PathBuf {
        self.dir.join(SNAPSHOT_FILE)
    }

    fn write_atomic(&self, path: &Path, value: &impl Serialize) -> Result<(), ArchiveError> {
        fs::create_dir_all(&self.dir)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(value)?)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>, ArchiveError> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

impl ArchiveRepository for FileRepository {
    fn load_year(&self, year: i32) -> Result<Option<ArchiveYear>, ArchiveError> {
        read_json(&self.year_path(year))
    }

    fn save_year(&self, year: i32, archive: &ArchiveYear) -> Result<(), ArchiveError> {
        self.write_atomic(&self.year_path(year), archive)
    }

    fn load_snapshot(&self) -> Result<Option<RunSnapshot>, ArchiveError> {
        read_json(&self.snapshot_path())
    }

    fn save_snapshot(&self, snapshot: &RunSnapshot) -> Result<(), ArchiveError> {
        self.write_atomic(&self.snapshot_path(), snapshot)
    }
}

#[cfg(test)]
mod tests {
    use carto_inondations_models::{ActiveKey, Source};
    use chrono::{TimeZone as _, Utc};

    use super::*;

    fn temp_repo() -> (FileRepository, PathBuf) {
        let dir = std::env::temp_dir().join(format!("carto-archive-{}", uuid::Uuid::new_v4()));
        (FileRepository::new(&dir), dir)
    }

    #[test]
    fn missing_files_load_as_none() {
        let (repo, dir) = temp_repo();
        assert!(repo.load_year(2024).unwrap().is_none());
        assert!(repo.load_snapshot().unwrap().is_none());
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn year_partition_round_trips() {
        let (repo, dir) = temp_repo();
        let mut archive = ArchiveYear::empty(2024);
        archive.last_modified = Some(Utc.with_ymd_and_hms(2024, 2, 5, 6, 0, 0).unwrap());

        repo.save_year(2024, &archive).unwrap();
        let loaded = repo.load_year(2024).unwrap().expect("file written");
        assert_eq!(loaded, archive);
        assert!(dir.join("archive-2024.json").is_file());
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn snapshot_round_trips() {
        let (repo, dir) = temp_repo();
        let snapshot = RunSnapshot {
            timestamp: Some(Utc.with_ymd_and_hms(2024, 2, 5, 6, 0, 0).unwrap()),
            active: vec![ActiveKey {
                source: Source::Cd56,
                source_id: "flood.123".to_string(),
            }],
        };

        repo.save_snapshot(&snapshot).unwrap();
        assert_eq!(repo.load_snapshot().unwrap(), Some(snapshot));
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn corrupt_partition_is_an_error_not_none() {
        let (repo, dir) = temp_repo();
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("archive-2024.json"), b"pas du json").unwrap();

        assert!(matches!(
            repo.load_year(2024),
            Err(ArchiveError::Json(_))
        ));
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn save_replaces_without_leaving_temp_file() {
        let (repo, dir) = temp_repo();
        repo.save_year(2024, &ArchiveYear::empty(2024)).unwrap();
        repo.save_year(2024, &ArchiveYear::empty(2024)).unwrap();
        assert!(!dir.join("archive-2024.json.tmp").exists());
        let _ = fs::remove_dir_all(dir);
    }
}
