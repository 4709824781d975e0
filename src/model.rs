//! Entity kinds and the typed records produced by coercion.
//!
//! The seven entity kinds mirror the seven files of the dataset export. Each
//! record type holds already-coerced values: numbers are parsed or `None`,
//! multi-value fields are normalized comma-joined text.

use crate::error::QueryError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One of the seven logical record types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Title,
    Person,
    Rating,
    Episode,
    Crew,
    AlternateTitle,
    Principal,
}

impl EntityKind {
    /// Mandatory load order. `Principal` references both `Title` and `Person`
    /// and is the largest file, so it goes last.
    pub const LOAD_ORDER: [EntityKind; 7] = [
        EntityKind::Title,
        EntityKind::Person,
        EntityKind::Rating,
        EntityKind::Episode,
        EntityKind::Crew,
        EntityKind::AlternateTitle,
        EntityKind::Principal,
    ];

    /// Stable lowercase name used in logs, the ledger and the CLI.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::Person => "person",
            Self::Rating => "rating",
            Self::Episode => "episode",
            Self::Crew => "crew",
            Self::AlternateTitle => "alternate_title",
            Self::Principal => "principal",
        }
    }

    /// File stem in the dataset directory (`<stem>.tsv.gz`).
    #[must_use]
    pub const fn file_stem(self) -> &'static str {
        match self {
            Self::Title => "title.basics",
            Self::Person => "name.basics",
            Self::Rating => "title.ratings",
            Self::Episode => "title.episode",
            Self::Crew => "title.crew",
            Self::AlternateTitle => "title.akas",
            Self::Principal => "title.principals",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKind {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let kind = match s.trim().to_ascii_lowercase().as_str() {
            "title" | "titles" | "title_basics" => Self::Title,
            "person" | "people" | "name" | "names" | "name_basics" => Self::Person,
            "rating" | "ratings" | "title_ratings" => Self::Rating,
            "episode" | "episodes" | "title_episode" => Self::Episode,
            "crew" | "title_crew" => Self::Crew,
            "alternate_title" | "alternate_titles" | "aka" | "akas" | "title_akas" => {
                Self::AlternateTitle
            }
            "principal" | "principals" | "title_principals" => Self::Principal,
            _ => return Err(QueryError::UnknownKind(s.to_string())),
        };
        Ok(kind)
    }
}

/// Root entity: a movie, series, episode, short, ...
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Title {
    pub tconst: String,
    pub title_type: Option<String>,
    pub primary_title: Option<String>,
    pub original_title: Option<String>,
    pub is_adult: bool,
    pub start_year: Option<i32>,
    pub end_year: Option<i32>,
    pub runtime_minutes: Option<i32>,
    pub genres: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Person {
    pub nconst: String,
    pub primary_name: Option<String>,
    pub birth_year: Option<i32>,
    pub death_year: Option<i32>,
    pub primary_profession: Option<String>,
    pub known_for_titles: Option<String>,
}

/// Average rating in `[0, 10]` and a non-negative vote count. Both required.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Rating {
    pub tconst: String,
    pub average_rating: f64,
    pub num_votes: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Principal {
    pub tconst: String,
    pub ordering: i64,
    pub nconst: Option<String>,
    pub category: Option<String>,
    pub job: Option<String>,
    pub characters: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Crew {
    pub tconst: String,
    pub directors: Option<String>,
    pub writers: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    pub tconst: String,
    pub parent_tconst: Option<String>,
    pub season_number: Option<i32>,
    pub episode_number: Option<i32>,
}

/// Localized title. `ordering` is stored as given; the column's integer
/// affinity converts numeric text on insert.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AlternateTitle {
    pub title_id: String,
    pub ordering: Option<String>,
    pub title: Option<String>,
    pub region: Option<String>,
    pub language: Option<String>,
    pub types: Option<String>,
    pub attributes: Option<String>,
    pub is_original_title: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_order_ends_with_principal() {
        assert_eq!(EntityKind::LOAD_ORDER[0], EntityKind::Title);
        assert_eq!(EntityKind::LOAD_ORDER[6], EntityKind::Principal);
    }

    #[test]
    fn parses_aliases() {
        assert_eq!("people".parse::<EntityKind>().unwrap(), EntityKind::Person);
        assert_eq!("AKAS".parse::<EntityKind>().unwrap(), EntityKind::AlternateTitle);
        assert!(matches!(
            "studio".parse::<EntityKind>(),
            Err(QueryError::UnknownKind(k)) if k == "studio"
        ));
    }
}
