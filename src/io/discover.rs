//! Locating each entity's source file inside the dataset directory.
//!
//! Files are matched by glob on `<dir>/<stem>.tsv*`, so `title.basics.tsv.gz`,
//! `title.basics.tsv.zst` and a plain `title.basics.tsv` are all accepted.
//! Anything else the glob picks up, such as a `.part` download or a `.bak`
//! copy, is ignored. When several variants exist, gzip wins over zstd, which
//! wins over plain.

use crate::error::SourceError;
use crate::model::EntityKind;
use glob::{Pattern, glob};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Return the source file for `kind` under `dir`, if there is one.
///
/// # Errors
/// Returns [`SourceError::Discover`] if the directory cannot be searched.
pub fn locate_source(
    dir: impl AsRef<Path>,
    kind: EntityKind,
) -> Result<Option<PathBuf>, SourceError> {
    let dir = dir.as_ref();
    let pattern = format!(
        "{}/{}.tsv*",
        Pattern::escape(&dir.to_string_lossy()),
        Pattern::escape(kind.file_stem())
    );
    let entries = glob(&pattern).map_err(|e| SourceError::Discover {
        dir: dir.to_path_buf(),
        message: e.to_string(),
    })?;

    let mut candidates = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| SourceError::Discover {
            dir: dir.to_path_buf(),
            message: e.to_string(),
        })?;
        if !path.is_file() {
            continue;
        }
        match preference(&path, kind.file_stem()) {
            Some(rank) => candidates.push((rank, path)),
            None => debug!(file = %path.display(), "ignoring unrecognized source variant"),
        }
    }

    candidates.sort();
    Ok(candidates.into_iter().next().map(|(_, path)| path))
}

/// Rank of a recognized file name, lower is better; `None` for anything that
/// is not `<stem>.tsv` with an optional gzip or zstd suffix.
fn preference(path: &Path, stem: &str) -> Option<u8> {
    let name = path.file_name()?.to_string_lossy().to_lowercase();
    let suffix = name.strip_prefix(stem)?.strip_prefix(".tsv")?;
    match suffix {
        ".gz" | ".gzip" => Some(0),
        ".zst" | ".zstd" => Some(1),
        "" => Some(2),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn prefers_gzip_over_plain() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        fs::write(dir.path().join("title.ratings.tsv"), "tconst\n")?;
        fs::write(dir.path().join("title.ratings.tsv.gz"), "")?;
        let found = locate_source(dir.path(), EntityKind::Rating)?;
        assert_eq!(found, Some(dir.path().join("title.ratings.tsv.gz")));
        Ok(())
    }

    #[test]
    fn missing_file_is_none() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        fs::write(dir.path().join("title.basics.tsv"), "tconst\n")?;
        assert_eq!(locate_source(dir.path(), EntityKind::Crew)?, None);
        Ok(())
    }

    #[test]
    fn leftover_variants_are_ignored() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        fs::write(dir.path().join("title.basics.tsv.gz.part"), "")?;
        fs::write(dir.path().join("title.basics.tsv.bak"), "tconst\n")?;
        assert_eq!(locate_source(dir.path(), EntityKind::Title)?, None);

        fs::write(dir.path().join("title.basics.tsv.zst"), "")?;
        let found = locate_source(dir.path(), EntityKind::Title)?;
        assert_eq!(found, Some(dir.path().join("title.basics.tsv.zst")));
        Ok(())
    }

    #[test]
    fn does_not_match_prefix_collisions() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        fs::write(dir.path().join("title.basics.extra.tsv"), "tconst\n")?;
        assert_eq!(locate_source(dir.path(), EntityKind::Title)?, None);
        Ok(())
    }
}
