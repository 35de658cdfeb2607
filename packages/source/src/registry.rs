//! Adapter registry.
//!
//! One place that knows every configured provider, plus the `--sources` /
//! `CARTO_SOURCES` filter used to run a subset of them.

use std::path::Path;

use carto_inondations_models::Source;
use strum::IntoEnumIterator as _;

use crate::cd35::Cd35Source;
use crate::cd44::Cd44Source;
use crate::cd56::Cd56Source;
use crate::diro::DiroSource;
use crate::grist::GristSource;
use crate::rennes::RennesSource;
use crate::FloodSource;

/// Environment variable with a comma-separated list of source tags.
pub const SOURCES_ENV: &str = "CARTO_SOURCES";

/// Returns every configured adapter. The DIRO adapter reads its input file
/// from `data_dir`.
#[must_use]
pub fn all_sources(data_dir: &Path) -> Vec<Box<dyn FloodSource>> {
    vec![
        Box::new(GristSource::new()),
        Box::new(Cd35Source::new()),
        Box::new(Cd44Source::new()),
        Box::new(Cd56Source::new()),
        Box::new(RennesSource::new()),
        Box::new(DiroSource::new(data_dir)),
    ]
}

/// Returns the adapters to run, filtered by the `--sources` CLI flag or the
/// `CARTO_SOURCES` environment variable. If neither is set, all adapters
/// are returned.
#[must_use]
pub fn enabled_sources(data_dir: &Path, cli_filter: Option<String>) -> Vec<Box<dyn FloodSource>> {
    let filter = cli_filter.or_else(|| std::env::var(SOURCES_ENV).ok());

    let all = all_sources(data_dir);

    let Some(filter_str) = filter else {
        return all;
    };

    let tags: Vec<&str> = filter_str.split(',').map(str::trim).collect();

    let filtered: Vec<Box<dyn FloodSource>> = all
        .into_iter()
        .filter(|adapter| tags.contains(&adapter.source().to_string().as_str()))
        .collect();

    if filtered.is_empty() {
        log::warn!(
            "No matching sources found for filter {tags:?}. Available: {}",
            Source::iter()
                .map(|s| s.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );
    }

    filtered
}
