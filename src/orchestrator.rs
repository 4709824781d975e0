//! End-to-end import driver.
//!
//! The orchestrator walks the store through its phases:
//!
//! ```text
//! Uninitialized -> SchemaReady -> Loading(kind)* -> Indexed -> Finalized
//! ```
//!
//! Entities load one at a time in [`EntityKind::LOAD_ORDER`]. A missing
//! source file skips its entity; any other failure inside an entity step is
//! logged and recorded, and the import moves to the next entity. The only
//! error that aborts a run is failing to open or create the store.
//!
//! Progress is mirrored into the store, so a run that was cancelled or killed
//! resumes instead of starting over:
//!
//! | store state           | action                                              |
//! |-----------------------|-----------------------------------------------------|
//! | `Missing`/`SchemaOnly`| full import                                         |
//! | `PopulatedUnindexed`  | reload entities without a ledger row, then index    |
//! | `Indexed`             | finalize only                                       |
//! | `Finalized`           | nothing; reported as already loaded                 |

use crate::coerce::{Coerce, SchemaCoercer};
use crate::config::{ImportConfig, StoreConfig};
use crate::error::{ImportError, SourceError, StoreError};
use crate::io::{ReadOptions, SourceReader, locate_source};
use crate::loader::{ChunkedLoader, LoaderOptions, SqliteWriter};
use crate::model::{AlternateTitle, Crew, EntityKind, Episode, Person, Principal, Rating, Title};
use crate::report::{EntityReport, EntityStatus, ImportOutcome, ImportPhase, ImportReport};
use crate::store::{Insertable, SchemaManager, StoreState};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::{error, info, info_span, warn};

/// Cooperative cancellation, checked before each entity step.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Finish the current entity, then stop.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

type EntityHook = Box<dyn Fn(&EntityReport) + Send + Sync>;

pub struct ImportOrchestrator {
    import: ImportConfig,
    store: StoreConfig,
    cancel: CancelToken,
    on_entity: Option<EntityHook>,
}

/// Error inside one entity step. Never escapes [`ImportOrchestrator::run`].
#[derive(Debug, thiserror::Error)]
enum StepError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ImportOrchestrator {
    #[must_use]
    pub fn new(import: ImportConfig, store: StoreConfig) -> Self {
        Self {
            import,
            store,
            cancel: CancelToken::new(),
            on_entity: None,
        }
    }

    #[must_use]
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    #[must_use]
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Call `hook` with each entity's report once its ledger row is written.
    #[must_use]
    pub fn on_entity_done<F>(mut self, hook: F) -> Self
    where
        F: Fn(&EntityReport) + Send + Sync + 'static,
    {
        self.on_entity = Some(Box::new(hook));
        self
    }

    /// Run the import, or whatever part of it is still outstanding.
    ///
    /// # Errors
    /// [`ImportError::SchemaFatal`] when the store cannot be opened or its
    /// schema cannot be created, and [`ImportError::Config`] for an unusable
    /// configuration. Data defects are reported, never returned.
    pub fn run(&self) -> Result<ImportReport, ImportError> {
        let start = Instant::now();
        if !self.import.dataset_dir.is_dir() {
            warn!(
                dir = %self.import.dataset_dir.display(),
                "dataset directory not found; every entity will be skipped"
            );
        }
        if self.import.null_sentinel.is_empty() {
            return Err(ImportError::Config("null_sentinel must not be empty".to_string()));
        }

        let mut manager = SchemaManager::open(&self.store).map_err(ImportError::SchemaFatal)?;
        let state = manager.has_existing_data().map_err(ImportError::SchemaFatal)?;
        info!(?state, path = %manager.path().display(), "existing store inspected");

        let mut report = ImportReport::new(ImportOutcome::Completed);
        match state {
            StoreState::Finalized => {
                info!("store already finalized; nothing to do");
                report.outcome = ImportOutcome::AlreadyLoaded;
                report.total_elapsed_ms = elapsed_ms(start);
                return Ok(report);
            }
            StoreState::Indexed => {
                info!("indexes already built; finalizing");
            }
            StoreState::Missing | StoreState::SchemaOnly => {
                manager.create_schema().map_err(ImportError::SchemaFatal)?;
                if !self.load_entities(&manager, false, &mut report) {
                    return Ok(cancelled(report, start));
                }
                report.index = Some(manager.build_indexes().map_err(ImportError::SchemaFatal)?);
            }
            StoreState::PopulatedUnindexed => {
                info!("resuming an interrupted import");
                if !self.load_entities(&manager, true, &mut report) {
                    return Ok(cancelled(report, start));
                }
                report.index = Some(manager.build_indexes().map_err(ImportError::SchemaFatal)?);
            }
        }

        match manager.finalize(self.import.validate_references) {
            Ok(finalize) => report.finalize = Some(finalize),
            Err(e) => error!(error = %e, "finalize failed; store left indexed"),
        }

        report.total_elapsed_ms = elapsed_ms(start);
        report.log_summary();
        Ok(report)
    }

    /// Load every entity in order. Returns `false` if cancelled.
    fn load_entities(
        &self,
        manager: &SchemaManager,
        resume: bool,
        report: &mut ImportReport,
    ) -> bool {
        let ledger = if resume {
            manager.ledger().unwrap_or_else(|e| {
                warn!(error = %e, "cannot read import ledger; reloading every entity");
                Default::default()
            })
        } else {
            Default::default()
        };

        for kind in EntityKind::LOAD_ORDER {
            if self.cancel.is_cancelled() {
                info!(next = %kind, "cancellation requested");
                return false;
            }

            if let Some(entry) = ledger
                .get(&kind)
                .filter(|e| matches!(e.status, EntityStatus::Completed | EntityStatus::Resumed))
            {
                info!(entity = %kind, persisted = entry.persisted, "already loaded; skipping");
                let mut skipped = EntityReport::empty(kind, EntityStatus::Resumed);
                skipped.source.clone_from(&entry.source);
                skipped.persisted = entry.persisted;
                report.entities.push(skipped);
                continue;
            }

            let span = info_span!("load", entity = %kind);
            let _guard = span.enter();
            if let Err(e) = manager.set_phase(ImportPhase::Loading(kind)) {
                warn!(error = %e, "cannot record phase");
            }
            if resume {
                if let Err(e) = manager.clear_table(kind) {
                    warn!(error = %e, "cannot clear partially loaded table");
                }
            }

            let entity = self.load_entity(kind);
            if let Err(e) = manager.record_entity(&entity) {
                warn!(error = %e, "cannot record ledger entry");
            }
            if let Some(hook) = &self.on_entity {
                hook(&entity);
            }
            report.entities.push(entity);
        }
        true
    }

    fn load_entity(&self, kind: EntityKind) -> EntityReport {
        let start = Instant::now();
        let source = match locate_source(&self.import.dataset_dir, kind) {
            Ok(Some(path)) => path,
            Ok(None) => {
                warn!(stem = kind.file_stem(), "source file not found; skipping");
                return EntityReport::empty(kind, EntityStatus::Skipped);
            }
            Err(e) => return self.failed(kind, start, &StepError::from(e)),
        };

        let result = match kind {
            EntityKind::Title => self.load_file::<Title>(&source),
            EntityKind::Person => self.load_file::<Person>(&source),
            EntityKind::Rating => self.load_file::<Rating>(&source),
            EntityKind::Episode => self.load_file::<Episode>(&source),
            EntityKind::Crew => self.load_file::<Crew>(&source),
            EntityKind::AlternateTitle => self.load_file::<AlternateTitle>(&source),
            EntityKind::Principal => self.load_file::<Principal>(&source),
        };

        match result {
            Ok(mut entity) => {
                entity.elapsed_ms = elapsed_ms(start);
                info!(
                    attempted = entity.attempted,
                    persisted = entity.persisted,
                    rejected = entity.rejected,
                    malformed = entity.malformed,
                    duplicates = entity.duplicates,
                    truncated = entity.truncated,
                    elapsed_ms = entity.elapsed_ms,
                    "entity loaded"
                );
                entity
            }
            Err(e) => {
                let mut entity = self.failed(kind, start, &e);
                entity.source = Some(source.display().to_string());
                entity
            }
        }
    }

    fn failed(&self, kind: EntityKind, start: Instant, e: &StepError) -> EntityReport {
        error!(error = %e, "entity step failed; continuing with the next entity");
        let mut entity = EntityReport::empty(kind, EntityStatus::Failed);
        entity.error = Some(e.to_string());
        entity.elapsed_ms = elapsed_ms(start);
        entity
    }

    /// Read, coerce and persist one source file.
    fn load_file<T>(&self, path: &Path) -> Result<EntityReport, StepError>
    where
        T: Coerce + Insertable,
    {
        let options = ReadOptions {
            null_sentinel: self.import.null_sentinel.clone(),
            buffer_capacity: self.import.read_buffer_bytes,
        };
        let mut reader = SourceReader::open(path, T::SOURCE_COLUMNS, &options)?;
        let mut coercer = SchemaCoercer::<T>::new(self.import.max_rejection_samples);
        let loader = ChunkedLoader::new(
            SqliteWriter::open(&self.store)?,
            LoaderOptions {
                batch_size: self.import.effective_batch_size(),
                workers: self.import.effective_workers(),
            },
        );
        info!(
            file = %path.display(),
            batch_size = loader.options().batch_size,
            workers = loader.options().workers,
            "loading"
        );

        let stats = loader.load(reader.by_ref().filter_map(|raw| coercer.coerce(&raw)));
        let read = reader.stats();
        let coerced = coercer.stats();

        let mut entity = EntityReport::empty(T::KIND, EntityStatus::Completed);
        entity.source = Some(path.display().to_string());
        entity.attempted = read.records;
        entity.malformed = read.malformed;
        entity.truncated = read.truncated;
        entity.rejected = coerced.rejected;
        entity.persisted = stats.persisted;
        entity.duplicates = stats.duplicates;
        entity.failed_batches = stats.failed_batches;
        entity.rejection_samples = coercer.into_samples();
        Ok(entity)
    }
}

fn cancelled(mut report: ImportReport, start: Instant) -> ImportReport {
    warn!("import cancelled before indexing; rerun to resume");
    report.outcome = ImportOutcome::Cancelled;
    report.total_elapsed_ms = elapsed_ms(start);
    report.log_summary();
    report
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}
