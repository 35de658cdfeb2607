//! In-memory repository backing the tests.

use std::collections::HashMap;
use std::sync::Mutex;

use carto_inondations_models::RunSnapshot;

use crate::store::ArchiveYear;
use crate::{ArchiveError, ArchiveRepository};

/// Volatile [`ArchiveRepository`] with no persistence across instances.
#[derive(Debug, Default)]
pub struct MemoryRepository {
    years: Mutex<HashMap<i32, ArchiveYear>>,
    snapshot: Mutex<Option<RunSnapshot>>,
}

impl ArchiveRepository for MemoryRepository {
    fn load_year(&self, year: i32) -> Result<Option<ArchiveYear>, ArchiveError> {
        Ok(self.years.lock().unwrap().get(&year).cloned())
    }

    fn save_year(&self, year: i32, archive: &ArchiveYear) -> Result<(), ArchiveError> {
        self.years.lock().unwrap().insert(year, archive.clone());
        Ok(())
    }

    fn load_snapshot(&self) -> Result<Option<RunSnapshot>, ArchiveError> {
        Ok(self.snapshot.lock().unwrap().clone())
    }

    fn save_snapshot(&self, snapshot: &RunSnapshot) -> Result<(), ArchiveError> {
        *self.snapshot.lock().unwrap() = Some(snapshot.clone());
        Ok(())
    }
}
