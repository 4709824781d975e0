use anyhow::{Context, Result};
use marquee::testing::builders::header;
use marquee::testing::{DatasetBuilder, import_config, sample_dataset, store_config};
use marquee::{
    CancelToken, EntityKind, EntityStatus, ImportOrchestrator, ImportOutcome, ImportPhase,
    QueryConfig, QueryService, SchemaManager, StoreState,
};
use std::path::Path;

fn orchestrator(dir: &Path) -> ImportOrchestrator {
    ImportOrchestrator::new(import_config(dir), store_config(dir))
}

#[test]
fn full_import_loads_every_entity_and_finalizes() -> Result<()> {
    let dataset = sample_dataset()?;
    let report = orchestrator(dataset.path()).run()?;

    assert_eq!(report.outcome, ImportOutcome::Completed);
    let expected = [
        (EntityKind::Title, 7),
        (EntityKind::Person, 3),
        (EntityKind::Rating, 5),
        (EntityKind::Episode, 3),
        (EntityKind::Crew, 3),
        (EntityKind::AlternateTitle, 2),
        (EntityKind::Principal, 5),
    ];
    for (kind, persisted) in expected {
        let entity = report.entity(kind).context("entity reported")?;
        assert_eq!(entity.status, EntityStatus::Completed, "{kind}");
        assert_eq!(entity.persisted, persisted, "{kind}");
        assert_eq!(entity.rejected, 0, "{kind}");
        assert_eq!(entity.duplicates, 0, "{kind}");
    }

    let order: Vec<_> = report.entities.iter().map(|e| e.entity).collect();
    assert_eq!(order, EntityKind::LOAD_ORDER);

    let index = report.index.as_ref().context("indexes built")?;
    assert!(index.failed.is_empty());
    assert!(report.finalize.is_some());

    let manager = SchemaManager::open(&store_config(dataset.path()))?;
    assert_eq!(manager.phase()?, Some(ImportPhase::Finalized));
    assert_eq!(manager.ledger()?.len(), 7);
    Ok(())
}

#[test]
fn second_run_is_a_no_op() -> Result<()> {
    let dataset = sample_dataset()?;
    orchestrator(dataset.path()).run()?;

    let again = orchestrator(dataset.path()).run()?;
    assert_eq!(again.outcome, ImportOutcome::AlreadyLoaded);
    assert!(again.entities.is_empty());

    let manager = SchemaManager::open(&store_config(dataset.path()))?;
    assert_eq!(manager.row_count(EntityKind::Title)?, 7);
    assert_eq!(manager.row_count(EntityKind::Principal)?, 5);
    Ok(())
}

#[test]
fn missing_files_are_skipped() -> Result<()> {
    let dataset = DatasetBuilder::new()?
        .rows(
            EntityKind::Title,
            &["tt0000001\tshort\tCarmencita\tCarmencita\t0\t1894\t\\N\t1\tDocumentary,Short"],
        )?
        .build();
    let report = orchestrator(dataset.path()).run()?;

    assert_eq!(report.outcome, ImportOutcome::Completed);
    assert_eq!(report.entity(EntityKind::Title).map(|e| e.persisted), Some(1));
    for kind in &EntityKind::LOAD_ORDER[1..] {
        assert_eq!(
            report.entity(*kind).map(|e| e.status),
            Some(EntityStatus::Skipped),
            "{kind}"
        );
    }
    assert!(report.finalize.is_some());
    Ok(())
}

#[test]
fn bad_title_fields_degrade_instead_of_rejecting() -> Result<()> {
    let dataset = DatasetBuilder::new()?
        .rows(
            EntityKind::Title,
            &[
                "tt0000001\tshort\tCarmencita\tCarmencita\t0\t1894\t\\N\t1\tDocumentary,Short",
                "tt0000002\tshort\tLe clown et ses chiens\tLe clown et ses chiens\t0\t\t\\N\t5\tAnimation,Short",
                "tt0000003\tshort\tPauvre Pierrot\tPauvre Pierrot\tmaybe\t1892\t\\N\t5\tAnimation,Comedy,Romance",
            ],
        )?
        .build();
    let report = orchestrator(dataset.path()).run()?;
    let titles = report.entity(EntityKind::Title).context("titles reported")?;
    assert_eq!(titles.attempted, 3);
    assert_eq!(titles.persisted, 3);
    assert_eq!(titles.rejected, 0);

    let service = QueryService::open(&store_config(dataset.path()), QueryConfig::default())?;
    let second = service.get_title("tt0000002")?.context("row 2 stored")?;
    assert_eq!(second.title.start_year, None);
    let third = service.get_title("tt0000003")?.context("row 3 stored")?;
    assert!(!third.title.is_adult);
    assert_eq!(third.title.start_year, Some(1892));
    Ok(())
}

#[test]
fn unusable_ratings_are_rejected_and_counted() -> Result<()> {
    let dataset = DatasetBuilder::new()?
        .rows(
            EntityKind::Rating,
            &[
                "tt0000001\t5.7\t2100",
                "tt0000002\t5.6\t283",
                "tt0000003\tN/A\t2090",
                "tt0000004\t5.4\t184",
                "tt0000005\t6.2\t2850",
            ],
        )?
        .build();
    let report = orchestrator(dataset.path()).run()?;

    let ratings = report.entity(EntityKind::Rating).context("ratings reported")?;
    assert_eq!(ratings.attempted, 5);
    assert_eq!(ratings.persisted, 4);
    assert_eq!(ratings.rejected, 1);
    let sample = ratings.rejection_samples.first().context("rejection sampled")?;
    assert_eq!(sample.field.as_deref(), Some("averageRating"));
    Ok(())
}

#[test]
fn cut_off_file_keeps_complete_rows() -> Result<()> {
    let rows = [
        "tt0000001\tshort\tCarmencita\tCarmencita\t0\t1894\t\\N\t1\tDocumentary,Short",
        "tt0000002\tshort\tLe clown et ses chiens\tLe clown et ses chiens\t0\t1892\t\\N\t5\tAnimation,Short",
        "tt0000003\tshort\tPauvre Pierrot\tPauvre Pierrot\t0\t1892\t\\N\t5\tAnimation,Comedy,Romance",
    ];
    // Header and two full lines, plus the first few bytes of the third.
    let keep = header(EntityKind::Title).len() + 1 + rows[0].len() + 1 + rows[1].len() + 1 + 12;
    let dataset = DatasetBuilder::new()?
        .truncated_rows(EntityKind::Title, &rows, keep)?
        .build();
    let report = orchestrator(dataset.path()).run()?;

    let titles = report.entity(EntityKind::Title).context("titles reported")?;
    assert_eq!(titles.status, EntityStatus::Completed);
    assert_eq!(titles.persisted, 2);
    assert_eq!(titles.malformed, 1);
    assert_eq!(report.outcome, ImportOutcome::Completed);
    Ok(())
}

#[test]
fn principals_without_a_usable_ordering_are_all_kept() -> Result<()> {
    let dataset = DatasetBuilder::new()?
        .rows(
            EntityKind::Principal,
            &[
                "tt0000001\t\\N\tnm0000001\tself\t\\N\t\\N",
                "tt0000001\tx\tnm0000002\tdirector\t\\N\t\\N",
                "tt0000001\t\tnm0000003\tproducer\tproducer\t\\N",
                "tt0000001\t1\tnm0000004\tactor\t\\N\t[\"Himself\"]",
            ],
        )?
        .build();
    let report = orchestrator(dataset.path()).run()?;

    let principals = report.entity(EntityKind::Principal).context("principals reported")?;
    assert_eq!(principals.attempted, 4);
    assert_eq!(principals.rejected, 0);
    assert_eq!(principals.duplicates, 0);
    assert_eq!(principals.persisted, 4);

    let manager = SchemaManager::open(&store_config(dataset.path()))?;
    assert_eq!(manager.row_count(EntityKind::Principal)?, 4);
    Ok(())
}

#[test]
fn repeated_keys_are_counted_as_duplicates() -> Result<()> {
    let dataset = DatasetBuilder::new()?
        .rows(
            EntityKind::Rating,
            &["tt0000001\t5.7\t2100", "tt0000002\t5.6\t283", "tt0000001\t5.8\t2101"],
        )?
        .build();
    let report = orchestrator(dataset.path()).run()?;

    let ratings = report.entity(EntityKind::Rating).context("ratings reported")?;
    assert_eq!(ratings.attempted, 3);
    assert_eq!(ratings.persisted, 2);
    assert_eq!(ratings.duplicates, 1);
    assert_eq!(
        ratings.attempted,
        ratings.rejected + ratings.persisted + ratings.duplicates
    );

    let manager = SchemaManager::open(&store_config(dataset.path()))?;
    let ledger = manager.ledger()?;
    assert_eq!(ledger.get(&EntityKind::Rating).map(|e| e.duplicates), Some(1));
    Ok(())
}

#[cfg(feature = "compression-gzip")]
#[test]
fn gzip_cut_mid_stream_still_completes_the_entity() -> Result<()> {
    let rows: Vec<String> = (0..20_000)
        .map(|i| format!("tt{i:07}\t{}.{}\t{}", 1 + i % 9, i % 10, i * 3))
        .collect();
    let rows: Vec<&str> = rows.iter().map(String::as_str).collect();
    let dataset = DatasetBuilder::new()?
        .rows(EntityKind::Rating, &rows)?
        .cut_in_half(EntityKind::Rating)?
        .build();
    let report = orchestrator(dataset.path()).run()?;

    let ratings = report.entity(EntityKind::Rating).context("ratings reported")?;
    assert_eq!(ratings.status, EntityStatus::Completed);
    assert!(ratings.truncated);
    assert!(ratings.attempted > 0);
    assert!(ratings.attempted < 20_000);
    assert_eq!(ratings.persisted, ratings.attempted);
    assert_eq!(report.outcome, ImportOutcome::Completed);
    Ok(())
}

#[test]
fn cancel_after_titles_leaves_a_resumable_store() -> Result<()> {
    let dataset = sample_dataset()?;
    let token = CancelToken::new();
    let trigger = token.clone();

    let report = orchestrator(dataset.path())
        .with_cancel_token(token)
        .on_entity_done(move |entity| {
            if entity.entity == EntityKind::Title {
                trigger.cancel();
            }
        })
        .run()?;
    assert_eq!(report.outcome, ImportOutcome::Cancelled);
    let loaded: Vec<_> = report.entities.iter().map(|e| e.entity).collect();
    assert_eq!(loaded, [EntityKind::Title]);
    assert!(report.index.is_none());
    {
        let manager = SchemaManager::open(&store_config(dataset.path()))?;
        assert_eq!(manager.has_existing_data()?, StoreState::PopulatedUnindexed);
        assert_eq!(manager.row_count(EntityKind::Title)?, 7);
        assert_eq!(manager.row_count(EntityKind::Person)?, 0);
    }

    let resumed = orchestrator(dataset.path()).run()?;
    assert_eq!(resumed.outcome, ImportOutcome::Completed);
    assert_eq!(
        resumed.entity(EntityKind::Title).map(|e| e.status),
        Some(EntityStatus::Resumed)
    );
    assert_eq!(resumed.entity(EntityKind::Person).map(|e| e.persisted), Some(3));

    let manager = SchemaManager::open(&store_config(dataset.path()))?;
    assert_eq!(manager.row_count(EntityKind::Title)?, 7);
    assert_eq!(manager.phase()?, Some(ImportPhase::Finalized));
    Ok(())
}

#[test]
fn cancelled_import_stops_and_reruns_cleanly() -> Result<()> {
    let dataset = sample_dataset()?;
    let token = CancelToken::new();
    token.cancel();

    let report = orchestrator(dataset.path()).with_cancel_token(token).run()?;
    assert_eq!(report.outcome, ImportOutcome::Cancelled);
    assert!(report.entities.is_empty());
    assert!(report.index.is_none());
    {
        let manager = SchemaManager::open(&store_config(dataset.path()))?;
        assert_eq!(manager.has_existing_data()?, StoreState::SchemaOnly);
    }

    let rerun = orchestrator(dataset.path()).run()?;
    assert_eq!(rerun.outcome, ImportOutcome::Completed);
    assert_eq!(rerun.entity(EntityKind::Principal).map(|e| e.persisted), Some(5));
    Ok(())
}

#[test]
fn interrupted_import_resumes_unfinished_entities() -> Result<()> {
    let dataset = sample_dataset()?;
    orchestrator(dataset.path()).run()?;

    // Pretend the run died while loading ratings: partial table, no ledger row.
    {
        let manager = SchemaManager::open(&store_config(dataset.path()))?;
        manager.clear_table(EntityKind::Rating)?;
        manager.set_phase(ImportPhase::Loading(EntityKind::Rating))?;
        assert_eq!(manager.has_existing_data()?, StoreState::PopulatedUnindexed);
    }

    let resumed = orchestrator(dataset.path()).run()?;
    assert_eq!(resumed.outcome, ImportOutcome::Completed);
    assert_eq!(
        resumed.entity(EntityKind::Title).map(|e| e.status),
        Some(EntityStatus::Resumed)
    );
    let ratings = resumed.entity(EntityKind::Rating).context("ratings reported")?;
    assert_eq!(ratings.status, EntityStatus::Completed);
    assert_eq!(ratings.persisted, 5);
    assert!(resumed.finalize.is_some());

    let manager = SchemaManager::open(&store_config(dataset.path()))?;
    assert_eq!(manager.row_count(EntityKind::Title)?, 7);
    assert_eq!(manager.row_count(EntityKind::Rating)?, 5);
    assert_eq!(manager.phase()?, Some(ImportPhase::Finalized));
    Ok(())
}

#[test]
fn empty_null_sentinel_is_a_config_error() -> Result<()> {
    let dataset = sample_dataset()?;
    let mut import = import_config(dataset.path());
    import.null_sentinel.clear();
    let result = ImportOrchestrator::new(import, store_config(dataset.path())).run();
    assert!(matches!(result, Err(marquee::ImportError::Config(_))));
    Ok(())
}
