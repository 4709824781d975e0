//! Transparent decompression for dataset files.
//!
//! Dataset files normally arrive as `.tsv.gz`. Mirrors sometimes recompress
//! them with zstd, and tests like to write plain `.tsv`. Codecs are picked by
//! file extension first, then by magic bytes, and otherwise the stream is
//! read as-is.
//!
//! ```no_run
//! use marquee::io::compression::auto_detect_reader;
//! use std::fs::File;
//! # fn main() -> std::io::Result<()> {
//! let file = File::open("dataset/title.basics.tsv.gz")?;
//! let reader = auto_detect_reader(file, "dataset/title.basics.tsv.gz")?;
//! # Ok(())
//! # }
//! ```

use std::io::{BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

/// A compression format that can wrap readers and writers.
///
/// Implementations must be `Send + Sync` so the built-in table can be shared
/// by every reader thread.
pub trait CompressionCodec: Send + Sync {
    /// Human-readable codec name (e.g., "gzip").
    fn name(&self) -> &str;

    /// Lowercase file extensions, including the leading dot.
    fn extensions(&self) -> &[&str];

    /// Signature at the start of a compressed stream, if the format has one.
    fn magic_bytes(&self) -> Option<&[u8]>;

    /// Wrap a reader with decompression.
    fn wrap_reader_dyn(&self, reader: Box<dyn Read>) -> std::io::Result<Box<dyn Read>>;

    /// Wrap a writer with compression.
    fn wrap_writer_dyn(&self, writer: Box<dyn Write>) -> std::io::Result<Box<dyn Write>>;
}

static BUILTIN_CODECS: &[&dyn CompressionCodec] = &[
    #[cfg(feature = "compression-gzip")]
    &GzipCodec,
    #[cfg(feature = "compression-zstd")]
    &ZstdCodec,
];

/// Codecs compiled into this build, in detection order.
#[must_use]
pub fn builtin_codecs() -> &'static [&'static dyn CompressionCodec] {
    BUILTIN_CODECS
}

/// Find the codec whose extension matches the end of `path`.
#[must_use]
pub fn detect_from_extension(path: impl AsRef<Path>) -> Option<&'static dyn CompressionCodec> {
    let path_str = path.as_ref().to_string_lossy().to_lowercase();
    builtin_codecs()
        .iter()
        .copied()
        .find(|codec| codec.extensions().iter().any(|ext| path_str.ends_with(ext)))
}

/// Peek at the buffered stream and match codec signatures. The reader is not advanced.
fn detect_from_magic<R: BufRead>(reader: &mut R) -> Option<&'static dyn CompressionCodec> {
    let buf = reader.fill_buf().ok()?;
    if buf.is_empty() {
        return None;
    }
    builtin_codecs().iter().copied().find(|codec| {
        codec
            .magic_bytes()
            .is_some_and(|magic| buf.len() >= magic.len() && buf.starts_with(magic))
    })
}

/// Wrap `reader` with the decompressor matching `path_hint`, or its magic bytes.
///
/// # Errors
/// Returns an error if the codec cannot initialize its decoder.
pub fn auto_detect_reader<R: Read + 'static>(
    reader: R,
    path_hint: impl AsRef<Path>,
) -> std::io::Result<Box<dyn Read>> {
    if let Some(codec) = detect_from_extension(&path_hint) {
        return codec.wrap_reader_dyn(Box::new(BufReader::new(reader)));
    }

    let mut buf_reader = BufReader::new(reader);
    if let Some(codec) = detect_from_magic(&mut buf_reader) {
        return codec.wrap_reader_dyn(Box::new(buf_reader));
    }

    Ok(Box::new(buf_reader))
}

/// Wrap `writer` with the compressor matching `path_hint`'s extension.
///
/// # Errors
/// Returns an error if the codec cannot initialize its encoder.
pub fn auto_detect_writer<W: Write + 'static>(
    writer: W,
    path_hint: impl AsRef<Path>,
) -> std::io::Result<Box<dyn Write>> {
    if let Some(codec) = detect_from_extension(&path_hint) {
        return codec.wrap_writer_dyn(Box::new(BufWriter::new(writer)));
    }
    Ok(Box::new(BufWriter::new(writer)))
}

#[cfg(feature = "compression-gzip")]
struct GzipCodec;

#[cfg(feature = "compression-gzip")]
impl CompressionCodec for GzipCodec {
    fn name(&self) -> &str {
        "gzip"
    }

    fn extensions(&self) -> &[&str] {
        &[".gz", ".gzip"]
    }

    fn magic_bytes(&self) -> Option<&[u8]> {
        Some(&[0x1f, 0x8b])
    }

    fn wrap_reader_dyn(&self, reader: Box<dyn Read>) -> std::io::Result<Box<dyn Read>> {
        // Multi-member aware: some mirrors concatenate gzip members.
        use flate2::read::MultiGzDecoder;
        Ok(Box::new(MultiGzDecoder::new(reader)))
    }

    fn wrap_writer_dyn(&self, writer: Box<dyn Write>) -> std::io::Result<Box<dyn Write>> {
        use flate2::Compression;
        use flate2::write::GzEncoder;
        Ok(Box::new(GzEncoder::new(writer, Compression::fast())))
    }
}

#[cfg(feature = "compression-zstd")]
struct ZstdCodec;

#[cfg(feature = "compression-zstd")]
impl CompressionCodec for ZstdCodec {
    fn name(&self) -> &str {
        "zstd"
    }

    fn extensions(&self) -> &[&str] {
        &[".zst", ".zstd"]
    }

    fn magic_bytes(&self) -> Option<&[u8]> {
        Some(&[0x28, 0xb5, 0x2f, 0xfd])
    }

    fn wrap_reader_dyn(&self, reader: Box<dyn Read>) -> std::io::Result<Box<dyn Read>> {
        zstd::stream::read::Decoder::new(reader).map(|d| Box::new(d) as Box<dyn Read>)
    }

    fn wrap_writer_dyn(&self, writer: Box<dyn Write>) -> std::io::Result<Box<dyn Write>> {
        zstd::stream::write::Encoder::new(writer, 3)
            .map(|e| Box::new(e.auto_finish()) as Box<dyn Write>)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_paths_have_no_codec() {
        assert!(detect_from_extension("dataset/title.basics.tsv").is_none());
    }

    #[cfg(feature = "compression-gzip")]
    #[test]
    fn gzip_detected_by_extension_case_insensitively() {
        let codec = detect_from_extension("DATA/TITLE.BASICS.TSV.GZ").map(|c| c.name().to_string());
        assert_eq!(codec.as_deref(), Some("gzip"));
    }

    #[cfg(feature = "compression-gzip")]
    #[test]
    fn gzip_detected_by_magic_without_extension() -> std::io::Result<()> {
        let mut encoder =
            flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(b"tconst\ttitleType\n")?;
        let encoded = encoder.finish()?;
        let mut out = String::new();
        auto_detect_reader(std::io::Cursor::new(encoded), "no-extension")?
            .read_to_string(&mut out)?;
        assert_eq!(out, "tconst\ttitleType\n");
        Ok(())
    }
}
