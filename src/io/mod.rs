//! Reading the dataset: decompression, tab-separated parsing and file lookup.

pub mod compression;
pub mod discover;
pub mod tsv;

pub use discover::locate_source;
pub use tsv::{RawRecord, ReadOptions, ReadStats, SourceReader};
