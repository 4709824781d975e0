//! Test support for dataset imports.
//!
//! Builds small dataset directories on disk, in the same gzip TSV layout as
//! the real dump, and hands out configurations that point a store at a
//! temporary directory.
//!
//! ```no_run
//! use marquee::testing::*;
//! use marquee::ImportOrchestrator;
//!
//! # fn main() -> anyhow::Result<()> {
//! let dataset = sample_dataset()?;
//! let report = ImportOrchestrator::new(
//!     import_config(dataset.path()),
//!     store_config(dataset.path()),
//! )
//! .run()?;
//! assert!(report.total_persisted() > 0);
//! # Ok(())
//! # }
//! ```

pub mod builders;
pub mod fixtures;

pub use builders::{DATASET_EXTENSION, DatasetBuilder};
pub use fixtures::{import_config, sample_dataset, store_config};
