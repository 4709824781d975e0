//! Parameterized read access to a finalized store.
//!
//! [`QueryService`] is what a presentation layer talks to. It owns one
//! query-only connection and a bounded [`QueryCache`]; every operation takes
//! typed parameters, validates them, and returns plain serializable rows.
//! An empty result is never an error. Errors are reserved for bad
//! parameters, an unknown entity kind, or a store that is not ready.
//!
//! ```no_run
//! use marquee::config::{QueryConfig, StoreConfig};
//! use marquee::query::{QueryService, SearchKind};
//! # fn main() -> anyhow::Result<()> {
//! let service = QueryService::open(&StoreConfig::default(), QueryConfig::default())?;
//! let results = service.search_by_name("Matrix", &SearchKind::Titles { title_type: None })?;
//! for hit in results.hits {
//!     println!("{} {:?} {:?}", hit.id, hit.name, hit.tier);
//! }
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod rows;

pub use cache::{QueryCache, QueryKey};
pub use rows::{
    AlternateTitleRow, CreditRow, DashboardStats, EpisodeOf, EpisodeRow, FilmographyRow,
    GenreStat, MatchTier, Page, SearchHit, SearchResults, TitleDetail, TitleRow, TrendPoint,
};

use crate::config::{QueryConfig, StoreConfig};
use crate::error::QueryError;
use crate::model::EntityKind;
use crate::report::ImportPhase;
use crate::store::{TableDef, multi_value};
use ordered_float::OrderedFloat;
use rusqlite::{Connection, OpenFlags, OptionalExtension, params};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::debug;

/// Votes a movie needs to appear in the dashboard's top-rated list.
const TOP_RATED_MIN_VOTES: i64 = 1000;
const TOP_RATED_LIMIT: i64 = 10;

/// Filters for [`QueryService::list_titles`]. `None` means "any".
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TitleFilter {
    /// Title type such as `movie` or `tvSeries`.
    pub title_type: Option<String>,
    pub year_min: Option<i32>,
    pub year_max: Option<i32>,
    /// Whole genre name, case-insensitive.
    pub genre: Option<String>,
    pub min_rating: Option<f64>,
    pub adult: Option<bool>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum TitleSort {
    /// Most votes first.
    #[default]
    Popularity,
    Rating,
    Newest,
    Oldest,
    Title,
}

impl TitleSort {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Popularity => "popularity",
            Self::Rating => "rating",
            Self::Newest => "newest",
            Self::Oldest => "oldest",
            Self::Title => "title",
        }
    }

    const fn order_sql(self) -> &'static str {
        match self {
            Self::Popularity => {
                "tr.numVotes DESC NULLS LAST, tr.averageRating DESC NULLS LAST, tb.tconst"
            }
            Self::Rating => {
                "tr.averageRating DESC NULLS LAST, tr.numVotes DESC NULLS LAST, tb.tconst"
            }
            Self::Newest => "tb.startYear DESC NULLS LAST, tb.tconst",
            Self::Oldest => "tb.startYear ASC NULLS LAST, tb.tconst",
            Self::Title => "tb.primaryTitle COLLATE NOCASE, tb.tconst",
        }
    }
}

impl FromStr for TitleSort {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "popularity" | "votes" => Ok(Self::Popularity),
            "rating" => Ok(Self::Rating),
            "newest" | "year_desc" => Ok(Self::Newest),
            "oldest" | "year_asc" => Ok(Self::Oldest),
            "title" | "name" => Ok(Self::Title),
            other => Err(QueryError::InvalidParameter(format!("unknown sort '{other}'"))),
        }
    }
}

/// What [`QueryService::search_by_name`] searches.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SearchKind {
    /// Primary and original titles, optionally of one title type.
    Titles { title_type: Option<String> },
    /// Primary names of people.
    People,
}

pub struct QueryService {
    conn: Mutex<Connection>,
    cache: Mutex<QueryCache>,
    config: QueryConfig,
}

impl QueryService {
    /// Open a query-only connection to a finalized store.
    ///
    /// # Errors
    /// [`QueryError::NotReady`] if the store is missing or has not been
    /// finalized, and [`QueryError::Store`] if it cannot be opened.
    pub fn open(store: &StoreConfig, config: QueryConfig) -> Result<Self, QueryError> {
        if !store.path.is_file() {
            return Err(QueryError::NotReady(format!(
                "no database at {}",
                store.path.display()
            )));
        }
        let conn = Connection::open_with_flags(
            &store.path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.busy_timeout(Duration::from_millis(store.busy_timeout_ms))?;
        conn.pragma_update(None, "query_only", true)?;
        conn.pragma_update(None, "cache_size", -store.cache_size_kib)?;

        let phase = read_phase(&conn)?;
        if phase != Some(ImportPhase::Finalized) {
            let shown = phase.map_or_else(|| "uninitialized".to_string(), |p| p.to_string());
            return Err(QueryError::NotReady(shown));
        }

        Ok(Self {
            conn: Mutex::new(conn),
            cache: Mutex::new(QueryCache::new(config.cache_entries)),
            config,
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn cache(&self) -> MutexGuard<'_, QueryCache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Serve from cache, or compute, store and return.
    fn cached<T, F>(&self, key: QueryKey, compute: F) -> Result<T, QueryError>
    where
        T: Clone + Send + Sync + 'static,
        F: FnOnce(&Connection) -> Result<T, QueryError>,
    {
        let hit = self.cache().get::<T>(&key);
        if let Some(hit) = hit {
            debug!(?key, "query cache hit");
            return Ok((*hit).clone());
        }
        let value = compute(&self.conn())?;
        self.cache().put(key, Arc::new(value.clone()));
        Ok(value)
    }

    /// Drop every cached result.
    pub fn clear_cache(&self) {
        self.cache().clear();
    }

    #[must_use]
    pub fn cache_len(&self) -> usize {
        self.cache().len()
    }

    /// Row count for an entity kind given by name (`title`, `people`, `akas`, ...).
    ///
    /// # Errors
    /// [`QueryError::UnknownKind`] for an unrecognized name.
    pub fn count_by_kind(&self, kind: &str) -> Result<u64, QueryError> {
        self.count(kind.parse()?)
    }

    /// # Errors
    /// Store failures only.
    pub fn count(&self, kind: EntityKind) -> Result<u64, QueryError> {
        self.cached(QueryKey::Count(kind), |conn| {
            let table = TableDef::for_kind(kind).name;
            count_sql(conn, &format!("SELECT COUNT(*) FROM {table}"))
        })
    }

    /// Headline counts and the top-rated movies.
    ///
    /// # Errors
    /// Store failures only.
    pub fn dashboard_stats(&self) -> Result<DashboardStats, QueryError> {
        self.cached(QueryKey::Dashboard, |conn| {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {cols}
                 FROM title_basics tb
                 JOIN title_ratings tr ON tr.tconst = tb.tconst
                 WHERE tb.titleType = 'movie' AND tr.numVotes >= ?1
                 ORDER BY tr.averageRating DESC, tr.numVotes DESC, tb.tconst
                 LIMIT ?2",
                cols = TitleRow::COLUMNS
            ))?;
            let top_rated = stmt
                .query_map(params![TOP_RATED_MIN_VOTES, TOP_RATED_LIMIT], TitleRow::from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(DashboardStats {
                movies: count_sql(
                    conn,
                    "SELECT COUNT(*) FROM title_basics WHERE titleType = 'movie'",
                )?,
                tv_series: count_sql(
                    conn,
                    "SELECT COUNT(*) FROM title_basics WHERE titleType = 'tvSeries'",
                )?,
                people: count_sql(conn, "SELECT COUNT(*) FROM name_basics")?,
                ratings: count_sql(conn, "SELECT COUNT(*) FROM title_ratings")?,
                top_rated,
            })
        })
    }

    /// Filtered, sorted, paginated title listing.
    ///
    /// `page` is 1-based. `page_size` defaults to the configured size and is
    /// capped at the configured maximum.
    ///
    /// # Errors
    /// [`QueryError::InvalidParameter`] for page 0, page size 0, an inverted
    /// year range or a rating outside `0..=10`.
    pub fn list_titles(
        &self,
        filter: &TitleFilter,
        sort: TitleSort,
        page: usize,
        page_size: Option<usize>,
    ) -> Result<Page<TitleRow>, QueryError> {
        let page_size = self.page_size(page_size)?;
        if page == 0 {
            return Err(QueryError::InvalidParameter("page numbers start at 1".to_string()));
        }
        let offset = (page - 1)
            .checked_mul(page_size)
            .and_then(|o| i64::try_from(o).ok())
            .ok_or_else(|| QueryError::InvalidParameter(format!("page {page} is out of range")))?;
        if let (Some(lo), Some(hi)) = (filter.year_min, filter.year_max) {
            if lo > hi {
                return Err(QueryError::InvalidParameter(format!(
                    "year range {lo}..{hi} is inverted"
                )));
            }
        }
        if let Some(r) = filter.min_rating {
            if !(0.0..=10.0).contains(&r) {
                return Err(QueryError::InvalidParameter(format!(
                    "minimum rating {r} outside 0..=10"
                )));
            }
        }

        let title_type = non_empty(filter.title_type.as_deref());
        let genre = non_empty(filter.genre.as_deref()).map(|g| multi_value::like_escape(&g));
        let key = QueryKey::Titles {
            title_type: title_type.clone(),
            year_min: filter.year_min,
            year_max: filter.year_max,
            genre: genre.clone(),
            min_rating: filter.min_rating.map(OrderedFloat),
            adult: filter.adult,
            sort: sort.as_str(),
            page,
            page_size,
        };

        self.cached(key, |conn| {
            let filter_sql = format!(
                "FROM title_basics tb
                 LEFT JOIN title_ratings tr ON tr.tconst = tb.tconst
                 WHERE (?1 IS NULL OR tb.titleType = ?1)
                   AND (?2 IS NULL OR tb.startYear >= ?2)
                   AND (?3 IS NULL OR tb.startYear <= ?3)
                   AND (?4 IS NULL OR {genre})
                   AND (?5 IS NULL OR tr.averageRating >= ?5)
                   AND (?6 IS NULL OR tb.isAdult = ?6)",
                genre = multi_value::contains_sql("tb.genres", 4)
            );
            let bound = params![
                title_type,
                filter.year_min,
                filter.year_max,
                genre,
                filter.min_rating,
                filter.adult
            ];

            let total: i64 =
                conn.query_row(&format!("SELECT COUNT(*) {filter_sql}"), bound, |row| row.get(0))?;

            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {cols} {filter_sql} ORDER BY {order} LIMIT ?7 OFFSET ?8",
                cols = TitleRow::COLUMNS,
                order = sort.order_sql()
            ))?;
            let rows = stmt
                .query_map(
                    params![
                        title_type,
                        filter.year_min,
                        filter.year_max,
                        genre,
                        filter.min_rating,
                        filter.adult,
                        page_size as i64,
                        offset
                    ],
                    TitleRow::from_row,
                )?
                .collect::<Result<Vec<_>, _>>()?;

            Ok(Page {
                rows,
                page,
                page_size,
                total: total.max(0) as u64,
            })
        })
    }

    fn page_size(&self, requested: Option<usize>) -> Result<usize, QueryError> {
        match requested.unwrap_or(self.config.default_page_size) {
            0 => Err(QueryError::InvalidParameter("page size must be positive".to_string())),
            n => Ok(n.min(self.config.max_page_size.max(1))),
        }
    }

    /// A title with its crew, rating and series placement.
    ///
    /// # Errors
    /// Store failures only; an unknown id is `Ok(None)`.
    pub fn get_title(&self, id: &str) -> Result<Option<TitleDetail>, QueryError> {
        let id = id.trim().to_string();
        self.cached(QueryKey::Title(id.clone()), |conn| {
            let found = conn
                .query_row(
                    &format!(
                        "SELECT {cols}, tc.directors, tc.writers
                         FROM title_basics tb
                         LEFT JOIN title_ratings tr ON tr.tconst = tb.tconst
                         LEFT JOIN title_crew tc ON tc.tconst = tb.tconst
                         WHERE tb.tconst = ?1",
                        cols = TitleRow::COLUMNS
                    ),
                    [&id],
                    |row| {
                        Ok((
                            TitleRow::from_row(row)?,
                            row.get::<_, Option<String>>(11)?,
                            row.get::<_, Option<String>>(12)?,
                        ))
                    },
                )
                .optional()?;
            let Some((title, directors, writers)) = found else {
                return Ok(None);
            };

            let episode_of = conn
                .query_row(
                    "SELECT te.parentTconst, p.primaryTitle, te.seasonNumber, te.episodeNumber
                     FROM title_episode te
                     LEFT JOIN title_basics p ON p.tconst = te.parentTconst
                     WHERE te.tconst = ?1",
                    [&id],
                    |row| {
                        Ok(EpisodeOf {
                            parent_tconst: row.get(0)?,
                            series_title: row.get(1)?,
                            season_number: row.get(2)?,
                            episode_number: row.get(3)?,
                        })
                    },
                )
                .optional()?;
            let (episode_count, season_count): (i64, i64) = conn.query_row(
                "SELECT COUNT(*), COUNT(DISTINCT seasonNumber) FROM title_episode WHERE parentTconst = ?1",
                [&id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;

            let ids = |list: Option<String>| -> Vec<String> {
                list.as_deref()
                    .map(|l| multi_value::split(l).map(str::to_string).collect())
                    .unwrap_or_default()
            };
            Ok(Some(TitleDetail {
                title,
                directors: ids(directors),
                writers: ids(writers),
                episode_of,
                episode_count: episode_count.max(0) as u64,
                season_count: season_count.max(0) as u64,
            }))
        })
    }

    /// Principals of a title: directors, writers, producers, then cast,
    /// each group in billing order.
    ///
    /// # Errors
    /// [`QueryError::InvalidParameter`] for a zero limit.
    pub fn cast_and_crew(
        &self,
        title_id: &str,
        limit: usize,
    ) -> Result<Vec<CreditRow>, QueryError> {
        if limit == 0 {
            return Err(QueryError::InvalidParameter("limit must be positive".to_string()));
        }
        let limit = limit.min(self.config.max_page_size.max(1));
        let title_id = title_id.trim().to_string();
        self.cached(
            QueryKey::CastAndCrew {
                title_id: title_id.clone(),
                limit,
            },
            |conn| {
                let mut stmt = conn.prepare_cached(
                    "SELECT tp.ordering, tp.nconst, nb.primaryName, tp.category, tp.job, tp.characters
                     FROM title_principals tp
                     LEFT JOIN name_basics nb ON nb.nconst = tp.nconst
                     WHERE tp.tconst = ?1
                     ORDER BY CASE tp.category
                                WHEN 'director' THEN 1
                                WHEN 'writer' THEN 2
                                WHEN 'producer' THEN 3
                                WHEN 'actor' THEN 4
                                WHEN 'actress' THEN 4
                                ELSE 5
                              END,
                              tp.ordering
                     LIMIT ?2",
                )?;
                let rows = stmt
                    .query_map(params![title_id, limit as i64], |row| {
                        Ok(CreditRow {
                            ordering: row.get(0)?,
                            nconst: row.get(1)?,
                            primary_name: row.get(2)?,
                            category: row.get(3)?,
                            job: row.get(4)?,
                            characters: row.get(5)?,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            },
        )
    }

    /// Every title a person is credited on, newest first.
    ///
    /// # Errors
    /// Store failures only.
    pub fn filmography(&self, person_id: &str) -> Result<Vec<FilmographyRow>, QueryError> {
        let person_id = person_id.trim().to_string();
        self.cached(QueryKey::Filmography(person_id.clone()), |conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT tb.tconst, tb.primaryTitle, tb.titleType, tb.startYear,
                        tp.category, tp.characters, tr.averageRating
                 FROM title_principals tp
                 JOIN title_basics tb ON tb.tconst = tp.tconst
                 LEFT JOIN title_ratings tr ON tr.tconst = tb.tconst
                 WHERE tp.nconst = ?1
                 ORDER BY tb.startYear DESC NULLS LAST, tr.averageRating DESC NULLS LAST, tb.tconst",
            )?;
            let rows = stmt
                .query_map([&person_id], |row| {
                    Ok(FilmographyRow {
                        tconst: row.get(0)?,
                        primary_title: row.get(1)?,
                        title_type: row.get(2)?,
                        start_year: row.get(3)?,
                        category: row.get(4)?,
                        characters: row.get(5)?,
                        average_rating: row.get(6)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Case-insensitive name search ranked exact, then prefix, then
    /// substring. Titles tie-break on vote count, people on name.
    ///
    /// # Errors
    /// Store failures only; no match is an empty hit list.
    pub fn search_by_name(
        &self,
        term: &str,
        kind: &SearchKind,
    ) -> Result<SearchResults, QueryError> {
        let trimmed = term.trim();
        if trimmed.is_empty() {
            return Ok(SearchResults {
                query: term.to_string(),
                hits: Vec::new(),
            });
        }
        let pattern = multi_value::like_escape(trimmed);
        let limit = self.config.search_limit.max(1) as i64;

        let hits = match kind {
            SearchKind::Titles { title_type } => {
                let title_type = non_empty(title_type.as_deref());
                self.cached(
                    QueryKey::SearchTitles {
                        term: trimmed.to_string(),
                        title_type: title_type.clone(),
                    },
                    |conn| search_titles(conn, &pattern, title_type.as_deref(), limit),
                )?
            }
            SearchKind::People => self.cached(QueryKey::SearchPeople(trimmed.to_string()), |conn| {
                search_people(conn, &pattern, limit)
            })?,
        };

        Ok(SearchResults {
            query: term.to_string(),
            hits,
        })
    }

    /// Per-genre movie count, mean rating and total votes over movies with
    /// at least `min_votes` votes. Genres with fewer than `min_count` movies
    /// are dropped. Most common genre first.
    ///
    /// # Errors
    /// [`QueryError::InvalidParameter`] for negative `min_votes`.
    pub fn genre_aggregate(
        &self,
        min_votes: i64,
        min_count: u64,
    ) -> Result<Vec<GenreStat>, QueryError> {
        if min_votes < 0 {
            return Err(QueryError::InvalidParameter(
                "minimum votes must not be negative".to_string(),
            ));
        }
        self.cached(QueryKey::Genres { min_votes, min_count }, |conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT tb.genres, tr.averageRating, tr.numVotes
                 FROM title_basics tb
                 JOIN title_ratings tr ON tr.tconst = tb.tconst
                 WHERE tb.titleType = 'movie' AND tb.genres IS NOT NULL AND tr.numVotes >= ?1",
            )?;
            let mut rows = stmt.query([min_votes])?;

            // genre -> (movies, rating sum, votes)
            let mut acc: BTreeMap<String, (u64, f64, i64)> = BTreeMap::new();
            while let Some(row) = rows.next()? {
                let genres: String = row.get(0)?;
                let rating: f64 = row.get(1)?;
                let votes: i64 = row.get(2)?;
                for genre in multi_value::split(&genres) {
                    let entry = acc.entry(genre.to_string()).or_insert((0, 0.0, 0));
                    entry.0 += 1;
                    entry.1 += rating;
                    entry.2 = entry.2.saturating_add(votes);
                }
            }

            let mut stats: Vec<GenreStat> = acc
                .into_iter()
                .filter(|(_, (count, _, _))| *count >= min_count)
                .map(|(genre, (count, sum, votes))| GenreStat {
                    genre,
                    count,
                    avg_rating: sum / count as f64,
                    total_votes: votes,
                })
                .collect();
            stats.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.genre.cmp(&b.genre)));
            Ok(stats)
        })
    }

    /// Episodes of a series ordered by season and episode number.
    ///
    /// # Errors
    /// Store failures only.
    pub fn series_episodes(&self, series_id: &str) -> Result<Vec<EpisodeRow>, QueryError> {
        let series_id = series_id.trim().to_string();
        self.cached(QueryKey::Episodes(series_id.clone()), |conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT te.tconst, tb.primaryTitle, te.seasonNumber, te.episodeNumber,
                        tb.startYear, tr.averageRating
                 FROM title_episode te
                 LEFT JOIN title_basics tb ON tb.tconst = te.tconst
                 LEFT JOIN title_ratings tr ON tr.tconst = te.tconst
                 WHERE te.parentTconst = ?1
                 ORDER BY te.seasonNumber NULLS LAST, te.episodeNumber NULLS LAST, te.tconst",
            )?;
            let rows = stmt
                .query_map([&series_id], |row| {
                    Ok(EpisodeRow {
                        tconst: row.get(0)?,
                        primary_title: row.get(1)?,
                        season_number: row.get(2)?,
                        episode_number: row.get(3)?,
                        start_year: row.get(4)?,
                        average_rating: row.get(5)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Localized titles of a title, in source order.
    ///
    /// # Errors
    /// Store failures only.
    pub fn alternate_titles(&self, title_id: &str) -> Result<Vec<AlternateTitleRow>, QueryError> {
        let title_id = title_id.trim().to_string();
        self.cached(QueryKey::AlternateTitles(title_id.clone()), |conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT CAST(ordering AS INTEGER), title, region, language, types, attributes,
                        isOriginalTitle
                 FROM title_akas
                 WHERE titleId = ?1
                 ORDER BY CAST(ordering AS INTEGER) NULLS LAST, rowid",
            )?;
            let rows = stmt
                .query_map([&title_id], |row| {
                    Ok(AlternateTitleRow {
                        ordering: row.get(0)?,
                        title: row.get(1)?,
                        region: row.get(2)?,
                        language: row.get(3)?,
                        types: row.get(4)?,
                        attributes: row.get(5)?,
                        is_original_title: row.get::<_, Option<bool>>(6)?.unwrap_or(false),
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Yearly movie rating averages with a rolling five-year mean.
    ///
    /// # Errors
    /// [`QueryError::InvalidParameter`] for an inverted year range or
    /// negative `min_votes`.
    pub fn rating_trend(
        &self,
        year_from: i32,
        year_to: i32,
        min_votes: i64,
    ) -> Result<Vec<TrendPoint>, QueryError> {
        if year_from > year_to {
            return Err(QueryError::InvalidParameter(format!(
                "year range {year_from}..{year_to} is inverted"
            )));
        }
        if min_votes < 0 {
            return Err(QueryError::InvalidParameter(
                "minimum votes must not be negative".to_string(),
            ));
        }
        self.cached(
            QueryKey::RatingTrend {
                year_from,
                year_to,
                min_votes,
            },
            |conn| {
                let mut stmt = conn.prepare_cached(
                    "SELECT tb.startYear,
                            COUNT(*),
                            AVG(tr.averageRating),
                            AVG(AVG(tr.averageRating)) OVER (
                                ORDER BY tb.startYear
                                ROWS BETWEEN 4 PRECEDING AND CURRENT ROW
                            ),
                            SUM(tr.numVotes)
                     FROM title_basics tb
                     JOIN title_ratings tr ON tr.tconst = tb.tconst
                     WHERE tb.titleType = 'movie'
                       AND tb.startYear BETWEEN ?1 AND ?2
                       AND tr.numVotes >= ?3
                     GROUP BY tb.startYear
                     ORDER BY tb.startYear",
                )?;
                let rows = stmt
                    .query_map(params![year_from, year_to, min_votes], |row| {
                        Ok(TrendPoint {
                            year: row.get(0)?,
                            movie_count: row.get::<_, i64>(1)?.max(0) as u64,
                            avg_rating: row.get(2)?,
                            rolling_5yr_avg: row.get(3)?,
                            total_votes: row.get(4)?,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            },
        )
    }
}

fn read_phase(conn: &Connection) -> Result<Option<ImportPhase>, QueryError> {
    let has_meta: bool = conn.query_row(
        "SELECT EXISTS (SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'import_meta')",
        [],
        |row| row.get(0),
    )?;
    if !has_meta {
        return Ok(None);
    }
    let value: Option<String> = conn
        .query_row("SELECT value FROM import_meta WHERE key = 'phase'", [], |row| row.get(0))
        .optional()?;
    Ok(value.and_then(|v| v.parse().ok()))
}

fn count_sql(conn: &Connection, sql: &str) -> Result<u64, QueryError> {
    let n: i64 = conn.query_row(sql, [], |row| row.get(0))?;
    Ok(n.max(0) as u64)
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

fn search_titles(
    conn: &Connection,
    pattern: &str,
    title_type: Option<&str>,
    limit: i64,
) -> Result<Vec<SearchHit>, QueryError> {
    let mut stmt = conn.prepare_cached(
        r"SELECT tb.tconst, tb.primaryTitle, tb.titleType, tb.startYear,
                 tr.averageRating, tr.numVotes,
                 CASE
                     WHEN tb.primaryTitle LIKE ?1 ESCAPE '\'
                       OR tb.originalTitle LIKE ?1 ESCAPE '\' THEN 0
                     WHEN tb.primaryTitle LIKE ?1 || '%' ESCAPE '\'
                       OR tb.originalTitle LIKE ?1 || '%' ESCAPE '\' THEN 1
                     ELSE 2
                 END AS tier
          FROM title_basics tb
          LEFT JOIN title_ratings tr ON tr.tconst = tb.tconst
          WHERE (tb.primaryTitle LIKE '%' || ?1 || '%' ESCAPE '\'
                 OR tb.originalTitle LIKE '%' || ?1 || '%' ESCAPE '\')
            AND (?2 IS NULL OR tb.titleType = ?2)
          ORDER BY tier, COALESCE(tr.numVotes, 0) DESC, tb.primaryTitle, tb.tconst
          LIMIT ?3",
    )?;
    let hits = stmt
        .query_map(params![pattern, title_type, limit], |row| {
            Ok(SearchHit {
                id: row.get(0)?,
                name: row.get(1)?,
                category: row.get(2)?,
                year: row.get(3)?,
                average_rating: row.get(4)?,
                num_votes: row.get(5)?,
                tier: MatchTier::from_rank(row.get(6)?),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(hits)
}

fn search_people(
    conn: &Connection,
    pattern: &str,
    limit: i64,
) -> Result<Vec<SearchHit>, QueryError> {
    let mut stmt = conn.prepare_cached(
        r"SELECT nb.nconst, nb.primaryName, nb.primaryProfession, nb.birthYear,
                 CASE
                     WHEN nb.primaryName LIKE ?1 ESCAPE '\' THEN 0
                     WHEN nb.primaryName LIKE ?1 || '%' ESCAPE '\' THEN 1
                     ELSE 2
                 END AS tier
          FROM name_basics nb
          WHERE nb.primaryName LIKE '%' || ?1 || '%' ESCAPE '\'
          ORDER BY tier, nb.primaryName, nb.nconst
          LIMIT ?2",
    )?;
    let hits = stmt
        .query_map(params![pattern, limit], |row| {
            Ok(SearchHit {
                id: row.get(0)?,
                name: row.get(1)?,
                category: row.get(2)?,
                year: row.get(3)?,
                average_rating: None,
                num_votes: None,
                tier: MatchTier::from_rank(row.get(4)?),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(hits)
}
