//! Writes dataset files for tests.

use crate::io::compression::auto_detect_writer;
use crate::model::EntityKind;
use anyhow::{Context, Result};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Extension of files written by [`DatasetBuilder`].
#[cfg(feature = "compression-gzip")]
pub const DATASET_EXTENSION: &str = "tsv.gz";
#[cfg(not(feature = "compression-gzip"))]
pub const DATASET_EXTENSION: &str = "tsv";

/// Header line of each source file, as published.
#[must_use]
pub const fn header(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Title => {
            "tconst\ttitleType\tprimaryTitle\toriginalTitle\tisAdult\tstartYear\tendYear\truntimeMinutes\tgenres"
        }
        EntityKind::Person => {
            "nconst\tprimaryName\tbirthYear\tdeathYear\tprimaryProfession\tknownForTitles"
        }
        EntityKind::Rating => "tconst\taverageRating\tnumVotes",
        EntityKind::Episode => "tconst\tparentTconst\tseasonNumber\tepisodeNumber",
        EntityKind::Crew => "tconst\tdirectors\twriters",
        EntityKind::AlternateTitle => {
            "titleId\tordering\ttitle\tregion\tlanguage\ttypes\tattributes\tisOriginalTitle"
        }
        EntityKind::Principal => "tconst\tordering\tnconst\tcategory\tjob\tcharacters",
    }
}

/// A dataset directory under construction.
///
/// The directory is removed when the builder (or the [`TempDir`] it was
/// turned into) is dropped.
///
/// ```
/// use marquee::model::EntityKind;
/// use marquee::testing::DatasetBuilder;
///
/// # fn main() -> anyhow::Result<()> {
/// let dataset = DatasetBuilder::new()?
///     .rows(EntityKind::Rating, &["tt0000001\t5.7\t2100"])?
///     .build();
/// assert!(dataset.path().read_dir()?.next().is_some());
/// # Ok(())
/// # }
/// ```
pub struct DatasetBuilder {
    dir: TempDir,
}

impl DatasetBuilder {
    /// # Errors
    /// Fails if the temporary directory cannot be created.
    pub fn new() -> Result<Self> {
        Ok(Self {
            dir: tempfile::tempdir().context("creating dataset directory")?,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Where the file for `kind` is written.
    #[must_use]
    pub fn file_path(&self, kind: EntityKind) -> PathBuf {
        self.dir
            .path()
            .join(format!("{}.{DATASET_EXTENSION}", kind.file_stem()))
    }

    /// Write the file for `kind` with its real header followed by `rows`.
    /// Each row is one tab-separated line without the trailing newline.
    ///
    /// # Errors
    /// Fails on any I/O error.
    pub fn rows(self, kind: EntityKind, rows: &[&str]) -> Result<Self> {
        let mut body = String::from(header(kind));
        body.push('\n');
        for row in rows {
            body.push_str(row);
            body.push('\n');
        }
        self.raw(kind, body.as_bytes())
    }

    /// Write arbitrary bytes as the file for `kind`, header included.
    ///
    /// # Errors
    /// Fails on any I/O error.
    pub fn raw(self, kind: EntityKind, contents: &[u8]) -> Result<Self> {
        let path = self.file_path(kind);
        let file = File::create(&path).with_context(|| format!("creating {}", path.display()))?;
        let mut writer = auto_detect_writer(file, &path)?;
        writer.write_all(contents)?;
        writer.flush()?;
        Ok(self)
    }

    /// Write only the first `keep` bytes of what [`rows`](Self::rows) would
    /// have written, uncompressed, to simulate a download cut short.
    ///
    /// # Errors
    /// Fails on any I/O error.
    pub fn truncated_rows(self, kind: EntityKind, rows: &[&str], keep: usize) -> Result<Self> {
        let mut body = String::from(header(kind));
        body.push('\n');
        for row in rows {
            body.push_str(row);
            body.push('\n');
        }
        let cut = body.len().min(keep);
        let path = self.dir.path().join(format!("{}.tsv", kind.file_stem()));
        std::fs::write(&path, &body.as_bytes()[..cut])
            .with_context(|| format!("writing {}", path.display()))?;
        Ok(self)
    }

    /// Cut the file already written for `kind` to half its size on disk.
    /// For a compressed file the stream then ends in the middle of a block.
    ///
    /// # Errors
    /// Fails if the file is missing or cannot be resized.
    pub fn cut_in_half(self, kind: EntityKind) -> Result<Self> {
        let path = self.file_path(kind);
        let file = OpenOptions::new()
            .write(true)
            .open(&path)
            .with_context(|| format!("opening {}", path.display()))?;
        let len = file.metadata()?.len();
        file.set_len(len / 2)?;
        Ok(self)
    }

    #[must_use]
    pub fn build(self) -> TempDir {
        self.dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{ReadOptions, SourceReader, locate_source};

    #[test]
    fn written_files_are_found_and_readable() -> Result<()> {
        let dataset = DatasetBuilder::new()?
            .rows(EntityKind::Crew, &["tt0000001\tnm0000001\t\\N"])?
            .build();

        let path = locate_source(dataset.path(), EntityKind::Crew)?
            .context("crew file should be discovered")?;
        let mut reader = SourceReader::open(
            &path,
            &["tconst", "directors", "writers"],
            &ReadOptions::default(),
        )?;
        let record = reader.next().context("one record")?;
        assert_eq!(record.get("directors"), Some("nm0000001"));
        assert_eq!(record.get("writers"), None);
        assert!(reader.next().is_none());
        Ok(())
    }
}
