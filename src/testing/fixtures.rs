//! A small, internally consistent dataset and matching configurations.

use super::builders::DatasetBuilder;
use crate::config::{ImportConfig, StoreConfig};
use crate::model::EntityKind;
use anyhow::Result;
use std::path::Path;
use tempfile::TempDir;

/// Import settings for a dataset in `dir`: small batches, two workers, and
/// nothing derived from the host.
#[must_use]
pub fn import_config(dir: &Path) -> ImportConfig {
    ImportConfig {
        dataset_dir: dir.to_path_buf(),
        batch_size: Some(2),
        workers: Some(2),
        ..ImportConfig::default()
    }
}

/// A store file named `imdb.db` inside `dir`.
#[must_use]
pub fn store_config(dir: &Path) -> StoreConfig {
    StoreConfig {
        path: dir.join("imdb.db"),
        busy_timeout_ms: 5_000,
        ..StoreConfig::default()
    }
}

/// Every entity populated with a handful of related rows.
///
/// Contents, briefly:
/// - movies `tt0133093` "The Matrix" (1999), `tt0234215` "The Matrix
///   Reloaded" (2003) and `tt0000003` "Matrix" (1993);
/// - a series `tt0000010` with two episodes in season 1 and one in season 2;
/// - people `nm0905154` Lana Wachowski, `nm0000206` Keanu Reeves and
///   `nm0000401` Laurence Fishburne.
///
/// # Errors
/// Fails on any I/O error.
pub fn sample_dataset() -> Result<TempDir> {
    Ok(DatasetBuilder::new()?
        .rows(
            EntityKind::Title,
            &[
                "tt0133093\tmovie\tThe Matrix\tThe Matrix\t0\t1999\t\\N\t136\tAction,Sci-Fi",
                "tt0234215\tmovie\tThe Matrix Reloaded\tThe Matrix Reloaded\t0\t2003\t\\N\t138\tAction,Sci-Fi",
                "tt0000003\tmovie\tMatrix\tMatrix\t0\t1993\t\\N\t60\tDrama",
                "tt0000010\ttvSeries\tCode Lines\tCode Lines\t0\t2010\t2012\t30\tComedy,Drama",
                "tt0000011\ttvEpisode\tPilot\tPilot\t0\t2010\t\\N\t30\tComedy",
                "tt0000012\ttvEpisode\tSecond\tSecond\t0\t2010\t\\N\t30\tComedy",
                "tt0000013\ttvEpisode\tReturn\tReturn\t0\t2011\t\\N\t30\tComedy",
            ],
        )?
        .rows(
            EntityKind::Person,
            &[
                "nm0905154\tLana Wachowski\t1965\t\\N\tdirector,writer,producer\ttt0133093,tt0234215",
                "nm0000206\tKeanu Reeves\t1964\t\\N\tactor,producer\ttt0133093,tt0234215",
                "nm0000401\tLaurence Fishburne\t1961\t\\N\tactor,producer\ttt0133093",
            ],
        )?
        .rows(
            EntityKind::Rating,
            &[
                "tt0133093\t8.7\t2100000",
                "tt0234215\t7.2\t640000",
                "tt0000003\t6.1\t150",
                "tt0000010\t7.9\t4200",
                "tt0000011\t7.5\t900",
            ],
        )?
        .rows(
            EntityKind::Episode,
            &[
                "tt0000013\ttt0000010\t2\t1",
                "tt0000012\ttt0000010\t1\t2",
                "tt0000011\ttt0000010\t1\t1",
            ],
        )?
        .rows(
            EntityKind::Crew,
            &[
                "tt0133093\tnm0905154\tnm0905154",
                "tt0234215\tnm0905154\tnm0905154",
                "tt0000003\t\\N\t\\N",
            ],
        )?
        .rows(
            EntityKind::AlternateTitle,
            &[
                "tt0133093\t1\tMatrix\tDE\tde\timdbDisplay\t\\N\t0",
                "tt0133093\t2\tThe Matrix\t\\N\t\\N\toriginal\t\\N\t1",
            ],
        )?
        .rows(
            EntityKind::Principal,
            &[
                "tt0133093\t1\tnm0000206\tactor\t\\N\t[\"Neo\"]",
                "tt0133093\t2\tnm0000401\tactor\t\\N\t[\"Morpheus\"]",
                "tt0133093\t5\tnm0905154\tdirector\t\\N\t\\N",
                "tt0133093\t6\tnm0905154\twriter\twritten by\t\\N",
                "tt0234215\t1\tnm0000206\tactor\t\\N\t[\"Neo\"]",
            ],
        )?
        .build())
}
