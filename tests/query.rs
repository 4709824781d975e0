use anyhow::{Context, Result};
use marquee::query::MatchTier;
use marquee::testing::{DatasetBuilder, import_config, sample_dataset, store_config};
use marquee::{
    EntityKind, ImportOrchestrator, QueryConfig, QueryError, QueryService, SchemaManager,
    SearchKind, TitleFilter, TitleSort,
};
use tempfile::TempDir;

fn loaded() -> Result<(TempDir, QueryService)> {
    let dataset = sample_dataset()?;
    ImportOrchestrator::new(import_config(dataset.path()), store_config(dataset.path())).run()?;
    let service = QueryService::open(&store_config(dataset.path()), QueryConfig::default())?;
    Ok((dataset, service))
}

fn titles() -> SearchKind {
    SearchKind::Titles { title_type: None }
}

#[test]
fn search_ranks_exact_then_prefix_then_substring() -> Result<()> {
    let dataset = DatasetBuilder::new()?
        .rows(
            EntityKind::Title,
            &[
                "tt0000001\tmovie\tA Matrix Clone\tA Matrix Clone\t0\t2005\t\\N\t90\tSci-Fi",
                "tt0000002\tmovie\tThe Matrix Reloaded\tThe Matrix Reloaded\t0\t2003\t\\N\t138\tSci-Fi",
                "tt0000003\tmovie\tMatrix\tMatrix\t0\t1993\t\\N\t60\tDrama",
                "tt0000004\tmovie\tMatrix Revisited\tMatrix Revisited\t0\t2001\t\\N\t123\tDocumentary",
                "tt0000005\tmovie\tUnrelated\tUnrelated\t0\t2001\t\\N\t99\tDrama",
            ],
        )?
        .rows(
            EntityKind::Rating,
            &[
                "tt0000001\t3.0\t50",
                "tt0000002\t7.2\t640000",
                "tt0000003\t6.1\t150",
                "tt0000004\t7.0\t20",
            ],
        )?
        .build();
    ImportOrchestrator::new(import_config(dataset.path()), store_config(dataset.path())).run()?;
    let service = QueryService::open(&store_config(dataset.path()), QueryConfig::default())?;

    let results = service.search_by_name("matrix", &titles())?;
    let ranked: Vec<_> = results.hits.iter().map(|h| (h.id.as_str(), h.tier)).collect();
    assert_eq!(
        ranked,
        [
            ("tt0000003", MatchTier::Exact),
            ("tt0000004", MatchTier::Prefix),
            ("tt0000002", MatchTier::Substring),
            ("tt0000001", MatchTier::Substring),
        ]
    );
    assert_eq!(results.query, "matrix");
    Ok(())
}

#[test]
fn search_matches_original_titles_and_filters_by_type() -> Result<()> {
    let (_dataset, service) = loaded()?;

    let series_only = service.search_by_name(
        "code",
        &SearchKind::Titles {
            title_type: Some("tvSeries".to_string()),
        },
    )?;
    assert_eq!(series_only.hits.len(), 1);
    assert_eq!(series_only.hits[0].id, "tt0000010");

    let movies_only = service.search_by_name(
        "code",
        &SearchKind::Titles {
            title_type: Some("movie".to_string()),
        },
    )?;
    assert!(movies_only.hits.is_empty());
    Ok(())
}

#[test]
fn search_people_by_name() -> Result<()> {
    let (_dataset, service) = loaded()?;
    let results = service.search_by_name("Keanu", &SearchKind::People)?;
    assert_eq!(results.hits.len(), 1);
    assert_eq!(results.hits[0].id, "nm0000206");
    assert_eq!(results.hits[0].tier, MatchTier::Prefix);
    assert_eq!(results.hits[0].year, Some(1964));
    Ok(())
}

#[test]
fn blank_or_unmatched_search_is_empty_not_an_error() -> Result<()> {
    let (_dataset, service) = loaded()?;
    let blank = service.search_by_name("   ", &titles())?;
    assert_eq!(blank.query, "   ");
    assert!(blank.hits.is_empty());

    let none = service.search_by_name("100%_nothing", &titles())?;
    assert_eq!(none.query, "100%_nothing");
    assert!(none.hits.is_empty());
    Ok(())
}

#[test]
fn counts_by_kind_name() -> Result<()> {
    let (_dataset, service) = loaded()?;
    assert_eq!(service.count_by_kind("title")?, 7);
    assert_eq!(service.count_by_kind("people")?, 3);
    assert_eq!(service.count_by_kind("akas")?, 2);
    assert_eq!(service.count(EntityKind::Principal)?, 5);
    assert!(matches!(service.count_by_kind("widgets"), Err(QueryError::UnknownKind(_))));
    Ok(())
}

#[test]
fn list_titles_filters_sorts_and_pages() -> Result<()> {
    let (_dataset, service) = loaded()?;
    let movies = TitleFilter {
        title_type: Some("movie".to_string()),
        ..TitleFilter::default()
    };

    let first = service.list_titles(&movies, TitleSort::Rating, 1, Some(2))?;
    assert_eq!(first.total, 3);
    assert_eq!(first.total_pages(), 2);
    let ids: Vec<_> = first.rows.iter().map(|r| r.tconst.as_str()).collect();
    assert_eq!(ids, ["tt0133093", "tt0234215"]);

    let second = service.list_titles(&movies, TitleSort::Rating, 2, Some(2))?;
    assert_eq!(second.rows.len(), 1);
    assert_eq!(second.rows[0].tconst, "tt0000003");

    let past_end = service.list_titles(&movies, TitleSort::Rating, 3, Some(2))?;
    assert!(past_end.rows.is_empty());
    assert_eq!(past_end.total, 3);

    let oldest = service.list_titles(&movies, TitleSort::Oldest, 1, None)?;
    assert_eq!(oldest.rows[0].tconst, "tt0000003");
    Ok(())
}

#[test]
fn genre_filter_matches_whole_values_case_insensitively() -> Result<()> {
    let (_dataset, service) = loaded()?;
    let filter = |genre: &str| TitleFilter {
        genre: Some(genre.to_string()),
        ..TitleFilter::default()
    };

    let scifi = service.list_titles(&filter("sci-fi"), TitleSort::Popularity, 1, None)?;
    let ids: Vec<_> = scifi.rows.iter().map(|r| r.tconst.as_str()).collect();
    assert_eq!(ids, ["tt0133093", "tt0234215"]);

    let partial = service.list_titles(&filter("Sci"), TitleSort::Popularity, 1, None)?;
    assert_eq!(partial.total, 0);

    let rated = TitleFilter {
        genre: Some("Action".to_string()),
        year_min: Some(2000),
        min_rating: Some(7.0),
        ..TitleFilter::default()
    };
    let reloaded = service.list_titles(&rated, TitleSort::Popularity, 1, None)?;
    assert_eq!(reloaded.total, 1);
    assert_eq!(reloaded.rows[0].tconst, "tt0234215");
    Ok(())
}

#[test]
fn invalid_listing_parameters_are_rejected() -> Result<()> {
    let (_dataset, service) = loaded()?;
    let any = TitleFilter::default();
    let inverted = TitleFilter {
        year_min: Some(2010),
        year_max: Some(2000),
        ..TitleFilter::default()
    };
    let too_high = TitleFilter {
        min_rating: Some(11.0),
        ..TitleFilter::default()
    };

    for result in [
        service.list_titles(&any, TitleSort::Popularity, 0, None),
        service.list_titles(&any, TitleSort::Popularity, 1, Some(0)),
        service.list_titles(&inverted, TitleSort::Popularity, 1, None),
        service.list_titles(&too_high, TitleSort::Popularity, 1, None),
    ] {
        assert!(matches!(result, Err(QueryError::InvalidParameter(_))));
    }
    assert!(matches!("sideways".parse::<TitleSort>(), Err(QueryError::InvalidParameter(_))));
    Ok(())
}

#[test]
fn page_size_is_capped() -> Result<()> {
    let (_dataset, service) = loaded()?;
    let page = service.list_titles(&TitleFilter::default(), TitleSort::Title, 1, Some(10_000))?;
    assert_eq!(page.page_size, QueryConfig::default().max_page_size);
    assert_eq!(page.rows.len(), 7);
    Ok(())
}

#[test]
fn title_detail_includes_crew_and_series_placement() -> Result<()> {
    let (_dataset, service) = loaded()?;

    let matrix = service.get_title("tt0133093")?.context("matrix")?;
    assert_eq!(matrix.title.primary_title.as_deref(), Some("The Matrix"));
    assert_eq!(matrix.title.average_rating, Some(8.7));
    assert_eq!(matrix.directors, ["nm0905154"]);
    assert!(matrix.episode_of.is_none());

    let series = service.get_title("tt0000010")?.context("series")?;
    assert_eq!(series.episode_count, 3);
    assert_eq!(series.season_count, 2);

    let pilot = service.get_title("tt0000011")?.context("pilot")?;
    let of = pilot.episode_of.context("pilot is an episode")?;
    assert_eq!(of.parent_tconst.as_deref(), Some("tt0000010"));
    assert_eq!(of.series_title.as_deref(), Some("Code Lines"));
    assert_eq!((of.season_number, of.episode_number), (Some(1), Some(1)));

    assert!(service.get_title("tt9999999")?.is_none());
    Ok(())
}

#[test]
fn cast_and_crew_lists_crew_before_cast() -> Result<()> {
    let (_dataset, service) = loaded()?;
    let credits = service.cast_and_crew("tt0133093", 10)?;
    let listed: Vec<_> = credits
        .iter()
        .map(|c| (c.category.as_deref(), c.primary_name.as_deref()))
        .collect();
    assert_eq!(
        listed,
        [
            (Some("director"), Some("Lana Wachowski")),
            (Some("writer"), Some("Lana Wachowski")),
            (Some("actor"), Some("Keanu Reeves")),
            (Some("actor"), Some("Laurence Fishburne")),
        ]
    );

    assert_eq!(service.cast_and_crew("tt0133093", 1)?.len(), 1);
    assert!(matches!(service.cast_and_crew("tt0133093", 0), Err(QueryError::InvalidParameter(_))));
    Ok(())
}

#[test]
fn filmography_is_newest_first() -> Result<()> {
    let (_dataset, service) = loaded()?;
    let films: Vec<_> = service
        .filmography("nm0000206")?
        .into_iter()
        .map(|f| (f.tconst, f.start_year))
        .collect();
    assert_eq!(
        films,
        [("tt0234215".to_string(), Some(2003)), ("tt0133093".to_string(), Some(1999))]
    );
    assert!(service.filmography("nm9999999")?.is_empty());
    Ok(())
}

#[test]
fn episodes_and_alternate_titles() -> Result<()> {
    let (_dataset, service) = loaded()?;
    let episodes: Vec<_> = service
        .series_episodes("tt0000010")?
        .into_iter()
        .map(|e| e.tconst)
        .collect();
    assert_eq!(episodes, ["tt0000011", "tt0000012", "tt0000013"]);

    let akas = service.alternate_titles("tt0133093")?;
    assert_eq!(akas.len(), 2);
    assert_eq!(akas[0].ordering, Some(1));
    assert_eq!(akas[0].region.as_deref(), Some("DE"));
    assert!(akas[1].is_original_title);
    Ok(())
}

#[test]
fn genre_aggregate_counts_rated_movies() -> Result<()> {
    let (_dataset, service) = loaded()?;

    let all = service.genre_aggregate(0, 1)?;
    let genres: Vec<_> = all.iter().map(|g| (g.genre.as_str(), g.count)).collect();
    assert_eq!(genres, [("Action", 2), ("Sci-Fi", 2), ("Drama", 1)]);
    assert!((all[0].avg_rating - 7.95).abs() < 1e-9);
    assert_eq!(all[0].total_votes, 2_740_000);

    let popular = service.genre_aggregate(1000, 1)?;
    assert!(popular.iter().all(|g| g.genre != "Drama"));

    let common = service.genre_aggregate(0, 2)?;
    assert_eq!(common.len(), 2);

    assert!(matches!(service.genre_aggregate(-1, 1), Err(QueryError::InvalidParameter(_))));
    Ok(())
}

#[test]
fn dashboard_and_trend() -> Result<()> {
    let (_dataset, service) = loaded()?;

    let stats = service.dashboard_stats()?;
    assert_eq!((stats.movies, stats.tv_series, stats.people, stats.ratings), (3, 1, 3, 5));
    let top: Vec<_> = stats.top_rated.iter().map(|t| t.tconst.as_str()).collect();
    assert_eq!(top, ["tt0133093", "tt0234215"]);

    let trend = service.rating_trend(1990, 2010, 0)?;
    let years: Vec<_> = trend.iter().map(|p| p.year).collect();
    assert_eq!(years, [1993, 1999, 2003]);
    assert!((trend[1].rolling_5yr_avg - 7.4).abs() < 1e-9);
    assert!((trend[2].rolling_5yr_avg - 22.0 / 3.0).abs() < 1e-9);
    assert!(matches!(service.rating_trend(2010, 1990, 0), Err(QueryError::InvalidParameter(_))));
    Ok(())
}

#[test]
fn results_are_cached_until_cleared() -> Result<()> {
    let (_dataset, service) = loaded()?;
    assert_eq!(service.cache_len(), 0);
    let first = service.dashboard_stats()?;
    let second = service.dashboard_stats()?;
    assert_eq!(first, second);
    assert_eq!(service.cache_len(), 1);

    service.clear_cache();
    assert_eq!(service.cache_len(), 0);
    Ok(())
}

#[test]
fn unfinished_store_is_not_ready() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let config = store_config(dir.path());
    assert!(matches!(
        QueryService::open(&config, QueryConfig::default()),
        Err(QueryError::NotReady(_))
    ));

    SchemaManager::open(&config)?.create_schema()?;
    assert!(matches!(
        QueryService::open(&config, QueryConfig::default()),
        Err(QueryError::NotReady(_))
    ));
    Ok(())
}
