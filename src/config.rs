//! Runtime configuration.
//!
//! Every section deserializes with `#[serde(default)]`, so an empty or
//! partial TOML file is valid. Command-line flags override file values in
//! the binary.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// Upper bound on load workers. More writers than this only contend for the
/// single SQLite write lock.
pub const MAX_WORKERS: usize = 8;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub import: ImportConfig,
    pub store: StoreConfig,
    pub query: QueryConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Read a TOML configuration file.
    ///
    /// # Errors
    /// Fails if the file cannot be read or is not valid TOML for this layout.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        info!("Loaded config from: {}", path.display());
        Ok(config)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    /// Directory holding the seven `*.tsv.gz` files.
    pub dataset_dir: PathBuf,

    /// Records per batch. When unset, derived from `memory_gb`.
    pub batch_size: Option<usize>,

    /// Installed memory in GiB, used only to size batches.
    pub memory_gb: Option<f64>,

    /// Load workers. When unset, `min(cpus, 8)`.
    pub workers: Option<usize>,

    /// Read window for the TSV parser, in bytes.
    pub read_buffer_bytes: usize,

    /// Literal token the source uses for "no value".
    pub null_sentinel: String,

    /// Rejected rows kept as samples per entity in the report.
    pub max_rejection_samples: usize,

    /// Count orphan references during finalize.
    pub validate_references: bool,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            dataset_dir: PathBuf::from("dataset"),
            batch_size: None,
            memory_gb: None,
            workers: None,
            read_buffer_bytes: 1 << 20,
            null_sentinel: "\\N".to_string(),
            max_rejection_samples: 20,
            validate_references: true,
        }
    }
}

impl ImportConfig {
    /// Effective batch size: explicit value, else sized from memory.
    #[must_use]
    pub fn effective_batch_size(&self) -> usize {
        self.batch_size
            .filter(|n| *n > 0)
            .unwrap_or_else(|| batch_size_for_memory(self.memory_gb))
    }

    /// Effective worker count, always within `1..=MAX_WORKERS`.
    #[must_use]
    pub fn effective_workers(&self) -> usize {
        self.workers
            .unwrap_or_else(num_cpus::get)
            .clamp(1, MAX_WORKERS)
    }
}

/// Batch size by installed memory: 50k at 16 GiB and up, 25k at 8 GiB, else 10k.
/// Unknown memory gets the middle tier.
#[must_use]
pub fn batch_size_for_memory(memory_gb: Option<f64>) -> usize {
    match memory_gb {
        Some(gb) if gb >= 16.0 => 50_000,
        Some(gb) if gb >= 8.0 => 25_000,
        Some(_) => 10_000,
        None => 25_000,
    }
}

/// Storage backend. Chosen explicitly; nothing is probed at construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    #[default]
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub kind: StoreKind,

    /// Database file. Its `-wal` and `-shm` side files live next to it.
    pub path: PathBuf,

    pub busy_timeout_ms: u64,

    /// Page cache per connection in KiB.
    pub cache_size_kib: i64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            kind: StoreKind::Sqlite,
            path: PathBuf::from("imdb.db"),
            busy_timeout_ms: 60_000,
            cache_size_kib: 64 * 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Result sets kept in the query cache.
    pub cache_entries: usize,
    pub default_page_size: usize,
    pub max_page_size: usize,
    /// Hits returned by a name search.
    pub search_limit: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            cache_entries: 1000,
            default_page_size: 20,
            max_page_size: 200,
            search_limit: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}
