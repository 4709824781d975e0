//! Result rows returned by the query service.

use rusqlite::Row;
use serde::{Deserialize, Serialize};

/// A title with its rating, as listed on overview pages.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TitleRow {
    pub tconst: String,
    pub title_type: Option<String>,
    pub primary_title: Option<String>,
    pub original_title: Option<String>,
    pub is_adult: bool,
    pub start_year: Option<i32>,
    pub end_year: Option<i32>,
    pub runtime_minutes: Option<i32>,
    pub genres: Option<String>,
    pub average_rating: Option<f64>,
    pub num_votes: Option<i64>,
}

impl TitleRow {
    /// Column list matching [`TitleRow::from_row`]; expects aliases `tb`
    /// (title_basics) and `tr` (title_ratings).
    pub const COLUMNS: &'static str = "tb.tconst, tb.titleType, tb.primaryTitle, tb.originalTitle, \
         tb.isAdult, tb.startYear, tb.endYear, tb.runtimeMinutes, tb.genres, \
         tr.averageRating, tr.numVotes";

    pub(crate) fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            tconst: row.get(0)?,
            title_type: row.get(1)?,
            primary_title: row.get(2)?,
            original_title: row.get(3)?,
            is_adult: row.get::<_, Option<bool>>(4)?.unwrap_or(false),
            start_year: row.get(5)?,
            end_year: row.get(6)?,
            runtime_minutes: row.get(7)?,
            genres: row.get(8)?,
            average_rating: row.get(9)?,
            num_votes: row.get(10)?,
        })
    }
}

/// Episode placement of a title that belongs to a series.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeOf {
    pub parent_tconst: Option<String>,
    pub series_title: Option<String>,
    pub season_number: Option<i32>,
    pub episode_number: Option<i32>,
}

/// Everything shown on a single title's page.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TitleDetail {
    #[serde(flatten)]
    pub title: TitleRow,
    pub directors: Vec<String>,
    pub writers: Vec<String>,
    pub episode_of: Option<EpisodeOf>,
    /// Episodes listed under this title, for series.
    pub episode_count: u64,
    pub season_count: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditRow {
    pub ordering: i64,
    pub nconst: Option<String>,
    pub primary_name: Option<String>,
    pub category: Option<String>,
    pub job: Option<String>,
    pub characters: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FilmographyRow {
    pub tconst: String,
    pub primary_title: Option<String>,
    pub title_type: Option<String>,
    pub start_year: Option<i32>,
    pub category: Option<String>,
    pub characters: Option<String>,
    pub average_rating: Option<f64>,
}

/// How closely a search hit matched the term.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchTier {
    Exact,
    Prefix,
    Substring,
}

impl MatchTier {
    pub(crate) fn from_rank(rank: i64) -> Self {
        match rank {
            0 => Self::Exact,
            1 => Self::Prefix,
            _ => Self::Substring,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    /// `tconst` or `nconst`.
    pub id: String,
    pub name: Option<String>,
    pub tier: MatchTier,
    /// Title type for titles, primary profession for people.
    pub category: Option<String>,
    /// Start year for titles, birth year for people.
    pub year: Option<i32>,
    pub average_rating: Option<f64>,
    pub num_votes: Option<i64>,
}

/// Search response; the term is echoed even when nothing matched.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchResults {
    pub query: String,
    pub hits: Vec<SearchHit>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GenreStat {
    pub genre: String,
    pub count: u64,
    pub avg_rating: f64,
    pub total_votes: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DashboardStats {
    pub movies: u64,
    pub tv_series: u64,
    pub people: u64,
    pub ratings: u64,
    /// Best rated movies with at least a thousand votes.
    pub top_rated: Vec<TitleRow>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EpisodeRow {
    pub tconst: String,
    pub primary_title: Option<String>,
    pub season_number: Option<i32>,
    pub episode_number: Option<i32>,
    pub start_year: Option<i32>,
    pub average_rating: Option<f64>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlternateTitleRow {
    pub ordering: Option<i64>,
    pub title: Option<String>,
    pub region: Option<String>,
    pub language: Option<String>,
    pub types: Option<String>,
    pub attributes: Option<String>,
    pub is_original_title: bool,
}

/// One year of the movie rating trend.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrendPoint {
    pub year: i32,
    pub movie_count: u64,
    pub avg_rating: f64,
    /// Mean of this and the four preceding years' averages.
    pub rolling_5yr_avg: f64,
    pub total_votes: i64,
}

/// One page of a listing. `page` is 1-based.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub rows: Vec<T>,
    pub page: usize,
    pub page_size: usize,
    pub total: u64,
}

impl<T> Page<T> {
    #[must_use]
    pub fn total_pages(&self) -> u64 {
        self.total.div_ceil(self.page_size.max(1) as u64)
    }
}
