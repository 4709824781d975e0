//! # Marquee
//!
//! Bulk loader and query layer for the IMDb-style title dataset: seven
//! tab-separated, gzip-compressed files describing titles, people, ratings,
//! episodes, crews, alternate titles and principal credits.
//!
//! ## Importing
//!
//! [`ImportOrchestrator`] discovers each source file, streams it through a
//! tolerant TSV reader, coerces every row into a typed record, and persists
//! records in batches. Rows that cannot be coerced are counted and sampled in
//! the [`ImportReport`]; they never stop the load. Progress is recorded in
//! the store itself, so an interrupted run resumes where it stopped.
//!
//! ```no_run
//! use marquee::{Config, ImportOrchestrator};
//! # fn main() -> anyhow::Result<()> {
//! let config = Config::default();
//! let report = ImportOrchestrator::new(config.import, config.store).run()?;
//! println!("{}", report.to_json()?);
//! # Ok(())
//! # }
//! ```
//!
//! ## Querying
//!
//! Once an import has been finalized, [`QueryService`] answers the
//! read-side questions: counts, filtered listings, title details, credits,
//! ranked name search and aggregate statistics.
//!
//! ## Layout
//!
//! - [`io`]: file discovery, decompression, TSV reading
//! - [`coerce`]: raw rows to typed records
//! - [`store`]: schema, store detection, lifecycle
//! - [`loader`]: batched, optionally parallel, persistence
//! - [`orchestrator`]: phases, resume and cancellation
//! - [`query`]: read access with a bounded result cache

pub mod cli;
pub mod coerce;
pub mod config;
pub mod error;
pub mod io;
pub mod loader;
pub mod model;
pub mod orchestrator;
pub mod query;
pub mod report;
pub mod store;
pub mod testing;

pub use config::{Config, ImportConfig, QueryConfig, StoreConfig};
pub use error::{ImportError, QueryError, SourceError, StoreError};
pub use model::EntityKind;
pub use orchestrator::{CancelToken, ImportOrchestrator};
pub use query::{QueryService, SearchKind, TitleFilter, TitleSort};
pub use report::{EntityReport, EntityStatus, ImportOutcome, ImportPhase, ImportReport};
pub use store::{SchemaManager, StoreState};
