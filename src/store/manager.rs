//! Schema lifecycle of the target store.
//!
//! [`SchemaManager`] owns DDL: it drops and recreates the entity tables,
//! builds indexes once loading is over, and finalizes the store. It also keeps
//! the bookkeeping tables that let an interrupted import resume: the current
//! phase in `import_meta` and one ledger row per loaded entity in
//! `import_ledger`.

use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::model::EntityKind;
use crate::report::{
    EntityReport, EntityStatus, FinalizeReport, ImportPhase, ImportStatus, IndexReport, LedgerEntry,
};
use crate::store::detect::{FsProbe, detect_store};
use crate::store::schema::{BOOKKEEPING_DDL, INDEXES, TableDef, all_tables};
use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const PHASE_KEY: &str = "phase";

/// What an existing store holds, as far as resuming an import is concerned.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreState {
    /// No entity tables.
    Missing,
    /// Tables exist but the Title table is empty.
    SchemaOnly,
    /// Titles loaded, indexes not yet built.
    PopulatedUnindexed,
    /// Indexes built, finalize not yet run.
    Indexed,
    /// Ready for queries.
    Finalized,
}

pub struct SchemaManager {
    conn: Connection,
    path: PathBuf,
}

impl SchemaManager {
    /// Open (or create) the configured database and its bookkeeping tables.
    ///
    /// # Errors
    /// Fails if the store location is invalid or SQLite cannot open it.
    pub fn open(config: &StoreConfig) -> Result<Self, StoreError> {
        let target = detect_store(config, &FsProbe)?;
        let conn = Connection::open(&target.path)?;
        conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
        conn.pragma_update(None, "cache_size", -config.cache_size_kib)?;
        conn.pragma_update(None, "temp_store", "MEMORY")?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        conn.pragma_update(None, "foreign_keys", false)?;
        conn.execute_batch(BOOKKEEPING_DDL)?;
        debug!(
            path = %target.path.display(),
            journal_mode = %mode,
            existed = target.exists,
            "opened store"
        );
        Ok(Self {
            conn,
            path: target.path,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Drop and recreate the seven entity tables and clear the ledger.
    ///
    /// Foreign keys are declared but stay off on every load connection.
    ///
    /// # Errors
    /// Any SQLite failure; the transaction is rolled back.
    pub fn create_schema(&mut self) -> Result<(), StoreError> {
        let tx = self.conn.transaction()?;
        // Children first so no declared reference dangles mid-rebuild.
        for table in all_tables().iter().rev() {
            tx.execute_batch(&format!("DROP TABLE IF EXISTS {}", table.name))?;
        }
        for table in all_tables() {
            tx.execute_batch(&table.create_sql())?;
        }
        tx.execute("DELETE FROM import_ledger", [])?;
        tx.commit()?;
        self.set_phase(ImportPhase::SchemaReady)?;
        info!(path = %self.path.display(), "schema created");
        Ok(())
    }

    /// Build every index. A failing index is logged and skipped.
    ///
    /// # Errors
    /// Only if the phase marker cannot be written.
    pub fn build_indexes(&self) -> Result<IndexReport, StoreError> {
        let start = Instant::now();
        let mut report = IndexReport::default();
        for index in INDEXES {
            let t = Instant::now();
            match self.conn.execute_batch(&index.create_sql()) {
                Ok(()) => {
                    debug!(
                        index = index.name,
                        elapsed_ms = t.elapsed().as_millis() as u64,
                        "index built"
                    );
                    report.created.push(index.name.to_string());
                }
                Err(e) => {
                    warn!(index = index.name, error = %e, "index creation failed; continuing");
                    report.failed.push((index.name.to_string(), e.to_string()));
                }
            }
        }
        report.elapsed_ms = start.elapsed().as_millis() as u64;
        self.set_phase(ImportPhase::Indexed)?;
        info!(
            created = report.created.len(),
            failed = report.failed.len(),
            elapsed_ms = report.elapsed_ms,
            "indexes built"
        );
        Ok(report)
    }

    /// Re-enable foreign keys, refresh planner statistics and checkpoint the WAL.
    ///
    /// With `validate_references`, orphan references are counted per table
    /// and logged; they never fail the import.
    ///
    /// # Errors
    /// Any SQLite failure while optimizing or recording the phase.
    pub fn finalize(&self, validate_references: bool) -> Result<FinalizeReport, StoreError> {
        let start = Instant::now();
        let mut report = FinalizeReport::default();

        if validate_references {
            report.orphan_references = self.foreign_key_violations()?;
            for (table, count) in &report.orphan_references {
                warn!(table = %table, orphans = count, "orphan references left in place");
            }
        }

        self.conn.pragma_update(None, "foreign_keys", true)?;
        self.conn.execute_batch("PRAGMA optimize; ANALYZE;")?;
        let (busy, log, checkpointed): (i64, i64, i64) = self.conn.query_row(
            "PRAGMA wal_checkpoint(TRUNCATE)",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;
        debug!(busy, log, checkpointed, "wal checkpoint");
        self.set_phase(ImportPhase::Finalized)?;

        report.elapsed_ms = start.elapsed().as_millis() as u64;
        info!(elapsed_ms = report.elapsed_ms, "store finalized");
        Ok(report)
    }

    fn foreign_key_violations(&self) -> Result<BTreeMap<String, u64>, StoreError> {
        let mut stmt = self.conn.prepare("PRAGMA foreign_key_check")?;
        let mut rows = stmt.query([])?;
        let mut counts = BTreeMap::new();
        while let Some(row) = rows.next()? {
            let table: String = row.get(0)?;
            *counts.entry(table).or_insert(0) += 1;
        }
        Ok(counts)
    }

    /// Classify what the store already holds. A finalized phase wins over
    /// everything else.
    ///
    /// # Errors
    /// Any SQLite failure.
    pub fn has_existing_data(&self) -> Result<StoreState, StoreError> {
        let phase = self.phase()?;
        if phase == Some(ImportPhase::Finalized) {
            return Ok(StoreState::Finalized);
        }
        let title = TableDef::for_kind(EntityKind::Title).name;
        if !self.table_exists(title)? {
            return Ok(StoreState::Missing);
        }
        let populated: bool = self.conn.query_row(
            &format!("SELECT EXISTS (SELECT 1 FROM {title})"),
            [],
            |row| row.get(0),
        )?;
        Ok(match (populated, phase) {
            (false, _) => StoreState::SchemaOnly,
            (true, Some(ImportPhase::Indexed)) => StoreState::Indexed,
            (true, _) => StoreState::PopulatedUnindexed,
        })
    }

    fn table_exists(&self, name: &str) -> Result<bool, StoreError> {
        Ok(self.conn.query_row(
            "SELECT EXISTS (SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
            [name],
            |row| row.get(0),
        )?)
    }

    /// # Errors
    /// Any SQLite failure.
    pub fn phase(&self) -> Result<Option<ImportPhase>, StoreError> {
        let value: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM import_meta WHERE key = ?1",
                [PHASE_KEY],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value.and_then(|v| match v.parse() {
            Ok(phase) => Some(phase),
            Err(e) => {
                warn!(error = %e, "ignoring unreadable phase marker");
                None
            }
        }))
    }

    /// # Errors
    /// Any SQLite failure.
    pub fn set_phase(&self, phase: ImportPhase) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO import_meta (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![PHASE_KEY, phase.to_string()],
        )?;
        debug!(%phase, "phase recorded");
        Ok(())
    }

    /// Write or replace the ledger row for one entity.
    ///
    /// # Errors
    /// Any SQLite failure.
    pub fn record_entity(&self, report: &EntityReport) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO import_ledger
             (entity, status, source, attempted, malformed, rejected, persisted, duplicates,
              failed_batches, elapsed_ms, completed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, datetime('now'))",
            params![
                report.entity.as_str(),
                report.status.as_str(),
                report.source,
                report.attempted as i64,
                report.malformed as i64,
                report.rejected as i64,
                report.persisted as i64,
                report.duplicates as i64,
                report.failed_batches as i64,
                report.elapsed_ms as i64,
            ],
        )?;
        Ok(())
    }

    /// Ledger rows keyed by entity. Rows with unreadable values are skipped.
    ///
    /// # Errors
    /// Any SQLite failure.
    pub fn ledger(&self) -> Result<BTreeMap<EntityKind, LedgerEntry>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT entity, status, source, attempted, malformed, rejected, persisted,
                    duplicates, failed_batches, elapsed_ms, completed_at
             FROM import_ledger",
        )?;
        let mut rows = stmt.query([])?;
        let mut ledger = BTreeMap::new();
        while let Some(row) = rows.next()? {
            let entity: String = row.get(0)?;
            let status: String = row.get(1)?;
            let (Ok(kind), Ok(status)) =
                (entity.parse::<EntityKind>(), status.parse::<EntityStatus>())
            else {
                warn!(entity = %entity, "skipping unreadable ledger row");
                continue;
            };
            ledger.insert(
                kind,
                LedgerEntry {
                    status,
                    source: row.get(2)?,
                    attempted: row.get::<_, i64>(3)?.max(0) as u64,
                    malformed: row.get::<_, i64>(4)?.max(0) as u64,
                    rejected: row.get::<_, i64>(5)?.max(0) as u64,
                    persisted: row.get::<_, i64>(6)?.max(0) as u64,
                    duplicates: row.get::<_, i64>(7)?.max(0) as u64,
                    failed_batches: row.get::<_, i64>(8)?.max(0) as u64,
                    elapsed_ms: row.get::<_, i64>(9)?.max(0) as u64,
                    completed_at: row.get(10)?,
                },
            );
        }
        Ok(ledger)
    }

    /// Phase plus ledger.
    ///
    /// # Errors
    /// Any SQLite failure.
    pub fn import_status(&self) -> Result<ImportStatus, StoreError> {
        Ok(ImportStatus {
            phase: self.phase()?,
            entities: self.ledger()?,
        })
    }

    /// Delete every row of `kind`'s table, ahead of reloading it.
    ///
    /// # Errors
    /// Any SQLite failure.
    pub fn clear_table(&self, kind: EntityKind) -> Result<u64, StoreError> {
        let table = TableDef::for_kind(kind).name;
        let removed = self.conn.execute(&format!("DELETE FROM {table}"), [])?;
        self.conn
            .execute("DELETE FROM import_ledger WHERE entity = ?1", [kind.as_str()])?;
        if removed > 0 {
            info!(entity = %kind, removed, "cleared partially loaded table");
        }
        Ok(removed as u64)
    }

    /// # Errors
    /// Any SQLite failure, including a missing table.
    pub fn row_count(&self, kind: EntityKind) -> Result<u64, StoreError> {
        let table = TableDef::for_kind(kind).name;
        let n: i64 = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;
        Ok(n.max(0) as u64)
    }
}

/// The database file and its WAL side files.
#[must_use]
pub fn store_files(path: &Path) -> [PathBuf; 3] {
    let with_suffix = |suffix: &str| {
        let mut name = path.as_os_str().to_owned();
        name.push(suffix);
        PathBuf::from(name)
    };
    [path.to_path_buf(), with_suffix("-wal"), with_suffix("-shm")]
}

/// Delete the database and its side files. Irreversible.
///
/// Returns the files that were actually removed.
///
/// # Errors
/// [`StoreError::ResetNotConfirmed`] unless `confirmed`, or an I/O error
/// from a failed delete.
pub fn reset_store(path: &Path, confirmed: bool) -> Result<Vec<PathBuf>, StoreError> {
    if !confirmed {
        return Err(StoreError::ResetNotConfirmed(path.to_path_buf()));
    }
    let mut removed = Vec::new();
    for file in store_files(path) {
        match std::fs::remove_file(&file) {
            Ok(()) => {
                info!(file = %file.display(), "deleted");
                removed.push(file);
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(file = %file.display(), "not present");
            }
            Err(e) => return Err(StoreError::Io(e)),
        }
    }
    if removed.is_empty() {
        info!(path = %path.display(), "nothing to reset");
    }
    Ok(removed)
}
