//! Field coercion from raw source records to typed entity records.
//!
//! Coercion never fails upward. A field that cannot be parsed becomes `None`;
//! a row is rejected only when its key is missing or, for ratings, when the
//! average rating or vote count is unusable. Rejections are counted and a
//! bounded sample is kept for the import report.

use crate::io::RawRecord;
use crate::model::{AlternateTitle, Crew, EntityKind, Episode, Person, Principal, Rating, Title};
use crate::store::multi_value;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

/// Rejections reported at `warn` per file before switching to `debug`.
const LOUD_REJECTIONS: u64 = 5;

/// Why a row was dropped.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    /// Source line number.
    pub line: u64,
    /// Offending column, if the rejection is about one field.
    pub field: Option<String>,
    pub reason: String,
}

impl Rejection {
    pub fn field<M: Into<String>>(line: u64, field: &str, reason: M) -> Self {
        Self {
            line,
            field: Some(field.to_string()),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.field {
            Some(field) => write!(f, "line {}: {}: {}", self.line, field, self.reason),
            None => write!(f, "line {}: {}", self.line, self.reason),
        }
    }
}

/// Bounded collection of sample rejections plus the total count.
#[derive(Clone, Debug, Default)]
pub struct RejectLog {
    capacity: usize,
    total: u64,
    samples: Vec<Rejection>,
}

impl RejectLog {
    #[must_use]
    pub const fn new(capacity: usize) -> Self {
        Self {
            capacity,
            total: 0,
            samples: Vec::new(),
        }
    }

    pub fn push(&mut self, rejection: Rejection) {
        self.total += 1;
        if self.samples.len() < self.capacity {
            self.samples.push(rejection);
        }
    }

    #[must_use]
    pub const fn total(&self) -> u64 {
        self.total
    }

    #[must_use]
    pub fn samples(&self) -> &[Rejection] {
        &self.samples
    }

    #[must_use]
    pub fn into_samples(self) -> Vec<Rejection> {
        self.samples
    }
}

/// Per-file coercion counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoercionStats {
    pub accepted: u64,
    pub rejected: u64,
}

/// A typed record that can be built from a [`RawRecord`].
pub trait Coerce: Sized {
    const KIND: EntityKind;

    /// Columns expected in the source header, in source order.
    const SOURCE_COLUMNS: &'static [&'static str];

    /// Build the record or explain why the row is unusable.
    ///
    /// # Errors
    /// Returns the [`Rejection`] for rows that must be dropped.
    fn coerce(raw: &RawRecord) -> Result<Self, Rejection>;
}

/// Applies [`Coerce`] to a stream of raw records and keeps score.
pub struct SchemaCoercer<T> {
    stats: CoercionStats,
    rejections: RejectLog,
    _record: std::marker::PhantomData<fn() -> T>,
}

impl<T: Coerce> SchemaCoercer<T> {
    #[must_use]
    pub const fn new(max_samples: usize) -> Self {
        Self {
            stats: CoercionStats {
                accepted: 0,
                rejected: 0,
            },
            rejections: RejectLog::new(max_samples),
            _record: std::marker::PhantomData,
        }
    }

    /// Coerce one record; `None` means it was rejected and counted.
    pub fn coerce(&mut self, raw: &RawRecord) -> Option<T> {
        match T::coerce(raw) {
            Ok(record) => {
                self.stats.accepted += 1;
                Some(record)
            }
            Err(rejection) => {
                self.stats.rejected += 1;
                if self.stats.rejected <= LOUD_REJECTIONS {
                    warn!(entity = %T::KIND, %rejection, "rejected row");
                } else {
                    debug!(entity = %T::KIND, %rejection, "rejected row");
                }
                self.rejections.push(rejection);
                None
            }
        }
    }

    #[must_use]
    pub const fn stats(&self) -> CoercionStats {
        self.stats
    }

    #[must_use]
    pub fn into_samples(self) -> Vec<Rejection> {
        self.rejections.into_samples()
    }
}

fn key(raw: &RawRecord, column: &str) -> Result<String, Rejection> {
    raw.get(column)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or_else(|| Rejection::field(raw.line(), column, "missing key"))
}

fn text(raw: &RawRecord, column: &str) -> Option<String> {
    raw.get(column).map(str::to_string)
}

/// Integer or `None`; never fails.
fn int(raw: &RawRecord, column: &str) -> Option<i32> {
    raw.get(column).and_then(|v| v.trim().parse().ok())
}

/// `1`/`true` are true; everything else, including absent, is false.
fn flag(raw: &RawRecord, column: &str) -> bool {
    raw.get(column)
        .is_some_and(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true"))
}

fn list(raw: &RawRecord, column: &str) -> Option<String> {
    raw.get(column).and_then(multi_value::normalize)
}

impl Coerce for Title {
    const KIND: EntityKind = EntityKind::Title;
    const SOURCE_COLUMNS: &'static [&'static str] = &[
        "tconst",
        "titleType",
        "primaryTitle",
        "originalTitle",
        "isAdult",
        "startYear",
        "endYear",
        "runtimeMinutes",
        "genres",
    ];

    fn coerce(raw: &RawRecord) -> Result<Self, Rejection> {
        Ok(Self {
            tconst: key(raw, "tconst")?,
            title_type: text(raw, "titleType"),
            primary_title: text(raw, "primaryTitle"),
            original_title: text(raw, "originalTitle"),
            is_adult: flag(raw, "isAdult"),
            start_year: int(raw, "startYear"),
            end_year: int(raw, "endYear"),
            runtime_minutes: int(raw, "runtimeMinutes"),
            genres: list(raw, "genres"),
        })
    }
}

impl Coerce for Person {
    const KIND: EntityKind = EntityKind::Person;
    const SOURCE_COLUMNS: &'static [&'static str] = &[
        "nconst",
        "primaryName",
        "birthYear",
        "deathYear",
        "primaryProfession",
        "knownForTitles",
    ];

    fn coerce(raw: &RawRecord) -> Result<Self, Rejection> {
        Ok(Self {
            nconst: key(raw, "nconst")?,
            primary_name: text(raw, "primaryName"),
            birth_year: int(raw, "birthYear"),
            death_year: int(raw, "deathYear"),
            primary_profession: list(raw, "primaryProfession"),
            known_for_titles: list(raw, "knownForTitles"),
        })
    }
}

impl Coerce for Rating {
    const KIND: EntityKind = EntityKind::Rating;
    const SOURCE_COLUMNS: &'static [&'static str] = &["tconst", "averageRating", "numVotes"];

    fn coerce(raw: &RawRecord) -> Result<Self, Rejection> {
        let line = raw.line();
        let tconst = key(raw, "tconst")?;

        let average_rating = match raw.get("averageRating").map(|v| v.trim().parse::<f64>()) {
            Some(Ok(v)) if v.is_finite() && (0.0..=10.0).contains(&v) => v,
            Some(Ok(v)) => {
                return Err(Rejection::field(
                    line,
                    "averageRating",
                    format!("{v} outside 0..=10"),
                ));
            }
            Some(Err(e)) => return Err(Rejection::field(line, "averageRating", e.to_string())),
            None => return Err(Rejection::field(line, "averageRating", "missing")),
        };
        let num_votes = match raw.get("numVotes").map(|v| v.trim().parse::<i64>()) {
            Some(Ok(v)) if v >= 0 => v,
            Some(Ok(v)) => {
                return Err(Rejection::field(line, "numVotes", format!("{v} is negative")));
            }
            Some(Err(e)) => return Err(Rejection::field(line, "numVotes", e.to_string())),
            None => return Err(Rejection::field(line, "numVotes", "missing")),
        };

        Ok(Self {
            tconst,
            average_rating,
            num_votes,
        })
    }
}

impl Coerce for Episode {
    const KIND: EntityKind = EntityKind::Episode;
    const SOURCE_COLUMNS: &'static [&'static str] =
        &["tconst", "parentTconst", "seasonNumber", "episodeNumber"];

    fn coerce(raw: &RawRecord) -> Result<Self, Rejection> {
        Ok(Self {
            tconst: key(raw, "tconst")?,
            parent_tconst: text(raw, "parentTconst"),
            season_number: int(raw, "seasonNumber"),
            episode_number: int(raw, "episodeNumber"),
        })
    }
}

impl Coerce for Crew {
    const KIND: EntityKind = EntityKind::Crew;
    const SOURCE_COLUMNS: &'static [&'static str] = &["tconst", "directors", "writers"];

    fn coerce(raw: &RawRecord) -> Result<Self, Rejection> {
        Ok(Self {
            tconst: key(raw, "tconst")?,
            directors: list(raw, "directors"),
            writers: list(raw, "writers"),
        })
    }
}

impl Coerce for AlternateTitle {
    const KIND: EntityKind = EntityKind::AlternateTitle;
    const SOURCE_COLUMNS: &'static [&'static str] = &[
        "titleId",
        "ordering",
        "title",
        "region",
        "language",
        "types",
        "attributes",
        "isOriginalTitle",
    ];

    fn coerce(raw: &RawRecord) -> Result<Self, Rejection> {
        Ok(Self {
            title_id: key(raw, "titleId")?,
            ordering: text(raw, "ordering"),
            title: text(raw, "title"),
            region: text(raw, "region"),
            language: text(raw, "language"),
            types: text(raw, "types"),
            attributes: text(raw, "attributes"),
            is_original_title: flag(raw, "isOriginalTitle"),
        })
    }
}

impl Coerce for Principal {
    const KIND: EntityKind = EntityKind::Principal;
    const SOURCE_COLUMNS: &'static [&'static str] =
        &["tconst", "ordering", "nconst", "category", "job", "characters"];

    fn coerce(raw: &RawRecord) -> Result<Self, Rejection> {
        Ok(Self {
            tconst: key(raw, "tconst")?,
            ordering: raw
                .get("ordering")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(0),
            nconst: text(raw, "nconst"),
            category: text(raw, "category"),
            job: text(raw, "job"),
            characters: text(raw, "characters"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn raw<T: Coerce>(values: &[Option<&str>]) -> RawRecord {
        RawRecord::new(
            2,
            Arc::from(T::SOURCE_COLUMNS),
            values.iter().map(|v| v.map(str::to_string)).collect(),
        )
    }

    #[test]
    fn title_numeric_fields_degrade_to_null() {
        let t = Title::coerce(&raw::<Title>(&[
            Some("tt1"),
            Some("movie"),
            Some("A"),
            Some("A"),
            Some("yes"),
            None,
            Some("19x5"),
            Some("90"),
            Some("Drama, Comedy"),
        ]))
        .unwrap();
        assert!(!t.is_adult);
        assert_eq!(t.start_year, None);
        assert_eq!(t.end_year, None);
        assert_eq!(t.runtime_minutes, Some(90));
        assert_eq!(t.genres.as_deref(), Some("Drama,Comedy"));
    }

    #[test]
    fn adult_flag_accepts_one_and_true() {
        for (value, expected) in [("1", true), ("TRUE", true), ("0", false), ("2", false)] {
            let mut values = vec![Some("tt1"); 9];
            values[4] = Some(value);
            let t = Title::coerce(&raw::<Title>(&values)).unwrap();
            assert_eq!(t.is_adult, expected, "isAdult={value}");
        }
    }

    #[test]
    fn rating_rejects_bad_core_fields() {
        let bad_avg = Rating::coerce(&raw::<Rating>(&[Some("tt1"), Some("N/A"), Some("10")]));
        assert_eq!(bad_avg.unwrap_err().field.as_deref(), Some("averageRating"));

        let out_of_range = Rating::coerce(&raw::<Rating>(&[Some("tt1"), Some("10.5"), Some("10")]));
        assert!(out_of_range.is_err());

        let negative = Rating::coerce(&raw::<Rating>(&[Some("tt1"), Some("7.0"), Some("-3")]));
        assert_eq!(negative.unwrap_err().field.as_deref(), Some("numVotes"));

        let ok = Rating::coerce(&raw::<Rating>(&[Some("tt1"), Some("7.5"), Some("1200")])).unwrap();
        assert_eq!(ok.num_votes, 1200);
    }

    #[test]
    fn principal_ordering_defaults_to_zero() {
        let p = Principal::coerce(&raw::<Principal>(&[
            Some("tt1"),
            Some("first"),
            Some("nm1"),
            Some("actor"),
            None,
            None,
        ]))
        .unwrap();
        assert_eq!(p.ordering, 0);
        assert_eq!(p.job, None);
    }

    #[test]
    fn keyless_rows_are_rejected_and_sampled() {
        let mut coercer = SchemaCoercer::<Crew>::new(1);
        assert!(coercer.coerce(&raw::<Crew>(&[None, Some("nm1"), None])).is_none());
        assert!(coercer.coerce(&raw::<Crew>(&[Some(" "), None, None])).is_none());
        assert!(coercer.coerce(&raw::<Crew>(&[Some("tt1"), None, None])).is_some());
        assert_eq!(
            coercer.stats(),
            CoercionStats {
                accepted: 1,
                rejected: 2
            }
        );
        assert_eq!(coercer.into_samples().len(), 1);
    }
}
