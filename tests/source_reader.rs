use anyhow::{Context, Result};
use marquee::EntityKind;
use marquee::io::{ReadOptions, SourceReader, locate_source};
use marquee::testing::DatasetBuilder;

const RATING_COLUMNS: &[&str] = &["tconst", "averageRating", "numVotes"];

#[test]
fn rows_come_back_in_source_order_with_nulls() -> Result<()> {
    let dataset = DatasetBuilder::new()?
        .rows(
            EntityKind::Rating,
            &["tt0000001\t5.7\t2100", "tt0000002\t\\N\t14", "tt0000003\t\t9"],
        )?
        .build();
    let path = locate_source(dataset.path(), EntityKind::Rating)?.context("ratings file")?;

    let records: Vec<_> =
        SourceReader::open(&path, RATING_COLUMNS, &ReadOptions::default())?.collect();
    let ids: Vec<_> = records.iter().map(|r| r.get("tconst")).collect();
    assert_eq!(ids, [Some("tt0000001"), Some("tt0000002"), Some("tt0000003")]);
    assert_eq!(records[0].get("averageRating"), Some("5.7"));
    assert_eq!(records[1].get("averageRating"), None);
    assert_eq!(records[2].get("averageRating"), None);
    Ok(())
}

#[test]
fn malformed_lines_are_skipped_and_counted() -> Result<()> {
    let dataset = DatasetBuilder::new()?
        .rows(
            EntityKind::Rating,
            &["tt0000001\t5.7\t2100", "tt0000002\t6.0", "tt0000003\t7.1\t30\textra"],
        )?
        .build();
    let path = locate_source(dataset.path(), EntityKind::Rating)?.context("ratings file")?;

    let mut reader = SourceReader::open(&path, RATING_COLUMNS, &ReadOptions::default())?;
    let kept: Vec<_> = reader.by_ref().collect();
    assert_eq!(kept.len(), 1);
    assert_eq!(reader.stats().records, 1);
    assert_eq!(reader.stats().malformed, 2);
    assert!(!reader.stats().truncated);
    Ok(())
}

#[test]
fn header_bom_and_column_order_are_tolerated() -> Result<()> {
    let body = "\u{feff}numVotes\ttconst\taverageRating\n2100\ttt0000001\t5.7\n";
    let dataset = DatasetBuilder::new()?
        .raw(EntityKind::Rating, body.as_bytes())?
        .build();
    let path = locate_source(dataset.path(), EntityKind::Rating)?.context("ratings file")?;

    let record = SourceReader::open(&path, RATING_COLUMNS, &ReadOptions::default())?
        .next()
        .context("one record")?;
    assert_eq!(record.get("tconst"), Some("tt0000001"));
    assert_eq!(record.get("numVotes"), Some("2100"));
    assert_eq!(record.get("averageRating"), Some("5.7"));
    Ok(())
}

#[test]
fn missing_header_columns_read_as_null() -> Result<()> {
    let dataset = DatasetBuilder::new()?
        .raw(EntityKind::Rating, b"tconst\taverageRating\ntt0000001\t5.7\n")?
        .build();
    let path = locate_source(dataset.path(), EntityKind::Rating)?.context("ratings file")?;

    let record = SourceReader::open(&path, RATING_COLUMNS, &ReadOptions::default())?
        .next()
        .context("one record")?;
    assert_eq!(record.get("averageRating"), Some("5.7"));
    assert_eq!(record.get("numVotes"), None);
    Ok(())
}

#[test]
fn quotes_are_data_not_delimiters() -> Result<()> {
    let dataset = DatasetBuilder::new()?
        .rows(
            EntityKind::Principal,
            &["tt0000001\t1\tnm0000001\tactor\t\\N\t[\"Neo \"The One\"\"]"],
        )?
        .build();
    let path = locate_source(dataset.path(), EntityKind::Principal)?.context("principals file")?;

    let record = SourceReader::open(
        &path,
        &["tconst", "ordering", "nconst", "category", "job", "characters"],
        &ReadOptions::default(),
    )?
    .next()
    .context("one record")?;
    assert_eq!(record.get("characters"), Some("[\"Neo \"The One\"\"]"));
    assert_eq!(record.get("job"), None);
    Ok(())
}

#[test]
fn custom_null_sentinel() -> Result<()> {
    let dataset = DatasetBuilder::new()?
        .rows(EntityKind::Rating, &["tt0000001\tNA\t12"])?
        .build();
    let path = locate_source(dataset.path(), EntityKind::Rating)?.context("ratings file")?;
    let options = ReadOptions {
        null_sentinel: "NA".to_string(),
        ..ReadOptions::default()
    };

    let record = SourceReader::open(&path, RATING_COLUMNS, &options)?
        .next()
        .context("one record")?;
    assert_eq!(record.get("averageRating"), None);
    Ok(())
}

#[test]
fn missing_file_is_unavailable() {
    let result = SourceReader::open(
        "/nonexistent/title.ratings.tsv.gz",
        RATING_COLUMNS,
        &ReadOptions::default(),
    );
    assert!(matches!(result, Err(marquee::SourceError::Unavailable { .. })));
}

#[cfg(feature = "compression-gzip")]
#[test]
fn gzip_cut_mid_stream_keeps_earlier_rows() -> Result<()> {
    let rows: Vec<String> = (0..20_000)
        .map(|i| format!("tt{i:07}\t{}.{}\t{}", 1 + i % 9, i % 10, i * 7))
        .collect();
    let rows: Vec<&str> = rows.iter().map(String::as_str).collect();
    let dataset = DatasetBuilder::new()?
        .rows(EntityKind::Rating, &rows)?
        .cut_in_half(EntityKind::Rating)?
        .build();
    let path = locate_source(dataset.path(), EntityKind::Rating)?.context("ratings file")?;

    let mut reader = SourceReader::open(&path, RATING_COLUMNS, &ReadOptions::default())?;
    let kept: Vec<_> = reader.by_ref().collect();
    let stats = reader.stats();
    assert!(stats.truncated);
    assert!(!kept.is_empty());
    assert!(kept.len() < rows.len());
    assert_eq!(stats.records, kept.len() as u64);
    assert_eq!(kept[0].get("tconst"), Some("tt0000000"));
    Ok(())
}
