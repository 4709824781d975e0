//! Batched persistence of coerced records.
//!
//! [`ChunkedLoader`] cuts a record stream into fixed-size batches and hands
//! each batch to a [`BatchWriter`]. A batch either commits whole or is
//! logged and skipped; it is never retried or split, so one bad batch can
//! not stop the rest of the stream.
//!
//! With more than one worker, batches flow through a bounded channel to a
//! dedicated rayon pool. The calling thread keeps reading and coercing while
//! earlier batches are written, and at most `2 * workers` batches wait in
//! memory. Commit order is unspecified.

use crate::config::{MAX_WORKERS, StoreConfig};
use crate::error::StoreError;
use crate::store::Insertable;
use rusqlite::{Connection, TransactionBehavior, params_from_iter};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Storage seam for the loader.
pub trait BatchWriter: Send + Sync {
    /// Persist `rows` atomically and return how many rows were stored.
    ///
    /// # Errors
    /// Any storage failure; the caller counts the whole batch as lost.
    fn write_batch<T: Insertable>(&self, rows: &[T]) -> Result<usize, StoreError>;
}

impl<W: BatchWriter> BatchWriter for &W {
    fn write_batch<T: Insertable>(&self, rows: &[T]) -> Result<usize, StoreError> {
        (**self).write_batch(rows)
    }
}

/// Writes batches into SQLite, one transaction per batch.
///
/// Connections are pooled and opened lazily, at most one per concurrent
/// caller. Every load connection runs with foreign keys and fsync off.
pub struct SqliteWriter {
    path: PathBuf,
    busy_timeout: Duration,
    cache_size_kib: i64,
    idle: Mutex<Vec<Connection>>,
}

impl SqliteWriter {
    /// Open a writer against an existing store.
    ///
    /// # Errors
    /// Fails if the first connection cannot be opened.
    pub fn open(config: &StoreConfig) -> Result<Self, StoreError> {
        let writer = Self {
            path: config.path.clone(),
            busy_timeout: Duration::from_millis(config.busy_timeout_ms),
            cache_size_kib: config.cache_size_kib,
            idle: Mutex::new(Vec::new()),
        };
        let conn = writer.connect()?;
        writer.checkin(conn);
        Ok(writer)
    }

    fn connect(&self) -> Result<Connection, StoreError> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(self.busy_timeout)?;
        conn.pragma_update(None, "synchronous", "OFF")?;
        conn.pragma_update(None, "foreign_keys", false)?;
        conn.pragma_update(None, "cache_size", -self.cache_size_kib)?;
        conn.pragma_update(None, "temp_store", "MEMORY")?;
        Ok(conn)
    }

    fn checkout(&self) -> Result<Connection, StoreError> {
        let pooled = self.idle.lock().unwrap_or_else(PoisonError::into_inner).pop();
        match pooled {
            Some(conn) => Ok(conn),
            None => self.connect(),
        }
    }

    fn checkin(&self, conn: Connection) {
        self.idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(conn);
    }
}

impl BatchWriter for SqliteWriter {
    fn write_batch<T: Insertable>(&self, rows: &[T]) -> Result<usize, StoreError> {
        let mut conn = self.checkout()?;
        let result = insert_rows(&mut conn, rows);
        self.checkin(conn);
        result
    }
}

fn insert_rows<T: Insertable>(conn: &mut Connection, rows: &[T]) -> Result<usize, StoreError> {
    // Dropping the transaction on error rolls the batch back.
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let mut persisted = 0;
    {
        let mut stmt = tx.prepare_cached(&T::table().insert_sql())?;
        for row in rows {
            persisted += stmt.execute(params_from_iter(row.params()))?;
        }
    }
    tx.commit()?;
    Ok(persisted)
}

#[derive(Clone, Copy, Debug)]
pub struct LoaderOptions {
    pub batch_size: usize,
    pub workers: usize,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            batch_size: 25_000,
            workers: 1,
        }
    }
}

/// Outcome of loading one record stream.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoadStats {
    pub attempted: u64,
    pub persisted: u64,
    /// Rows in committed batches that the store ignored as already present.
    pub duplicates: u64,
    pub batches: u64,
    pub failed_batches: u64,
    pub elapsed: Duration,
}

#[derive(Default)]
struct Counters {
    attempted: AtomicU64,
    persisted: AtomicU64,
    duplicates: AtomicU64,
    batches: AtomicU64,
    failed_batches: AtomicU64,
}

impl Counters {
    fn snapshot(&self, elapsed: Duration) -> LoadStats {
        LoadStats {
            attempted: self.attempted.load(Ordering::Relaxed),
            persisted: self.persisted.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            batches: self.batches.load(Ordering::Relaxed),
            failed_batches: self.failed_batches.load(Ordering::Relaxed),
            elapsed,
        }
    }
}

pub struct ChunkedLoader<W> {
    writer: W,
    options: LoaderOptions,
}

impl<W: BatchWriter> ChunkedLoader<W> {
    /// Batch size is at least 1 and workers stay within `1..=MAX_WORKERS`.
    pub fn new(writer: W, options: LoaderOptions) -> Self {
        Self {
            writer,
            options: LoaderOptions {
                batch_size: options.batch_size.max(1),
                workers: options.workers.clamp(1, MAX_WORKERS),
            },
        }
    }

    pub fn writer(&self) -> &W {
        &self.writer
    }

    #[must_use]
    pub const fn options(&self) -> LoaderOptions {
        self.options
    }

    /// Persist every record of `records`, batch by batch.
    pub fn load<T, I>(&self, records: I) -> LoadStats
    where
        T: Insertable,
        I: IntoIterator<Item = T>,
    {
        let start = Instant::now();
        let counters = Counters::default();
        let records = records.into_iter();

        #[cfg(feature = "parallel-load")]
        if self.options.workers > 1 {
            self.load_parallel(records, &counters);
            return counters.snapshot(start.elapsed());
        }

        self.load_inline(records, &counters);
        counters.snapshot(start.elapsed())
    }

    fn load_inline<T: Insertable>(
        &self,
        mut records: impl Iterator<Item = T>,
        counters: &Counters,
    ) {
        let mut index = 0;
        loop {
            let batch = next_batch(&mut records, self.options.batch_size);
            if batch.is_empty() {
                break;
            }
            self.persist(index, &batch, counters);
            index += 1;
        }
    }

    #[cfg(feature = "parallel-load")]
    fn load_parallel<T: Insertable>(
        &self,
        mut records: impl Iterator<Item = T>,
        counters: &Counters,
    ) {
        let workers = self.options.workers;
        let pool = match rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("marquee-load-{i}"))
            .build()
        {
            Ok(pool) => pool,
            Err(e) => {
                warn!(error = %e, "cannot start load workers; loading inline");
                return self.load_inline(records, counters);
            }
        };

        let (tx, rx) = std::sync::mpsc::sync_channel::<(u64, Vec<T>)>(2 * workers);
        let rx = Mutex::new(rx);
        let rx = &rx;

        pool.in_place_scope(|scope| {
            for _ in 0..workers {
                scope.spawn(move |_| {
                    loop {
                        let next = rx.lock().unwrap_or_else(PoisonError::into_inner).recv();
                        match next {
                            Ok((index, batch)) => self.persist(index, &batch, counters),
                            Err(_) => break,
                        }
                    }
                });
            }

            let mut index = 0;
            loop {
                let batch = next_batch(&mut records, self.options.batch_size);
                if batch.is_empty() || tx.send((index, batch)).is_err() {
                    break;
                }
                index += 1;
            }
            drop(tx);
        });
    }

    fn persist<T: Insertable>(&self, index: u64, batch: &[T], counters: &Counters) {
        let len = batch.len() as u64;
        counters.attempted.fetch_add(len, Ordering::Relaxed);
        counters.batches.fetch_add(1, Ordering::Relaxed);
        match self.writer.write_batch(batch) {
            Ok(n) => {
                let persisted = (n as u64).min(len);
                counters.persisted.fetch_add(persisted, Ordering::Relaxed);
                counters
                    .duplicates
                    .fetch_add(len - persisted, Ordering::Relaxed);
                debug!(
                    table = T::table().name,
                    batch = index,
                    rows = len,
                    persisted,
                    "batch committed"
                );
            }
            Err(e) => {
                counters.failed_batches.fetch_add(1, Ordering::Relaxed);
                warn!(
                    table = T::table().name,
                    batch = index,
                    rows = len,
                    error = %e,
                    "batch failed; skipping"
                );
            }
        }
    }
}

fn next_batch<T>(records: &mut impl Iterator<Item = T>, size: usize) -> Vec<T> {
    records.by_ref().take(size).collect()
}
