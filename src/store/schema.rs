//! Static descriptors for the target tables and indexes.
//!
//! Each entity kind owns one [`TableDef`]. DDL and insert statements are
//! generated from the descriptors so column lists never drift between the
//! schema, the loader and the record types.

use crate::model::{AlternateTitle, Crew, EntityKind, Episode, Person, Principal, Rating, Title};
use rusqlite::ToSql;

#[derive(Clone, Copy, Debug)]
pub struct ColumnDef {
    pub name: &'static str,
    pub sql_type: &'static str,
    pub not_null: bool,
}

impl ColumnDef {
    const fn new(name: &'static str, sql_type: &'static str) -> Self {
        Self {
            name,
            sql_type,
            not_null: false,
        }
    }

    const fn required(name: &'static str, sql_type: &'static str) -> Self {
        Self {
            name,
            sql_type,
            not_null: true,
        }
    }
}

/// Declared reference to the Title or Person table. Declared only; the load
/// connections run with foreign keys off.
#[derive(Clone, Copy, Debug)]
pub struct ForeignKey {
    pub column: &'static str,
    pub references: &'static str,
    pub ref_column: &'static str,
}

#[derive(Debug)]
pub struct TableDef {
    pub kind: EntityKind,
    pub name: &'static str,
    pub columns: &'static [ColumnDef],
    /// Empty for keyless tables.
    pub primary_key: &'static [&'static str],
    pub foreign_keys: &'static [ForeignKey],
}

impl TableDef {
    /// Descriptor for `kind`.
    #[must_use]
    pub fn for_kind(kind: EntityKind) -> &'static TableDef {
        match kind {
            EntityKind::Title => &TITLE_BASICS,
            EntityKind::Person => &NAME_BASICS,
            EntityKind::Rating => &TITLE_RATINGS,
            EntityKind::Episode => &TITLE_EPISODE,
            EntityKind::Crew => &TITLE_CREW,
            EntityKind::AlternateTitle => &TITLE_AKAS,
            EntityKind::Principal => &TITLE_PRINCIPALS,
        }
    }

    /// Source column names, in insert order.
    #[must_use]
    pub fn column_names(&self) -> Vec<&'static str> {
        self.columns.iter().map(|c| c.name).collect()
    }

    #[must_use]
    pub fn create_sql(&self) -> String {
        let mut parts: Vec<String> = self
            .columns
            .iter()
            .map(|c| {
                let null = if c.not_null { " NOT NULL" } else { "" };
                format!("{} {}{}", c.name, c.sql_type, null)
            })
            .collect();
        if !self.primary_key.is_empty() {
            parts.push(format!("PRIMARY KEY ({})", self.primary_key.join(", ")));
        }
        for fk in self.foreign_keys {
            parts.push(format!(
                "FOREIGN KEY ({}) REFERENCES {}({})",
                fk.column, fk.references, fk.ref_column
            ));
        }
        format!("CREATE TABLE {} (\n    {}\n)", self.name, parts.join(",\n    "))
    }

    /// Insert statement. Rows whose key already exists are ignored so a
    /// duplicate source line costs one row, not a whole batch.
    #[must_use]
    pub fn insert_sql(&self) -> String {
        let placeholders: Vec<String> = (1..=self.columns.len()).map(|i| format!("?{i}")).collect();
        format!(
            "INSERT OR IGNORE INTO {} ({}) VALUES ({})",
            self.name,
            self.column_names().join(", "),
            placeholders.join(", ")
        )
    }
}

pub static TITLE_BASICS: TableDef = TableDef {
    kind: EntityKind::Title,
    name: "title_basics",
    columns: &[
        ColumnDef::required("tconst", "TEXT"),
        ColumnDef::new("titleType", "TEXT"),
        ColumnDef::new("primaryTitle", "TEXT"),
        ColumnDef::new("originalTitle", "TEXT"),
        ColumnDef::required("isAdult", "INTEGER DEFAULT 0"),
        ColumnDef::new("startYear", "INTEGER"),
        ColumnDef::new("endYear", "INTEGER"),
        ColumnDef::new("runtimeMinutes", "INTEGER"),
        ColumnDef::new("genres", "TEXT"),
    ],
    primary_key: &["tconst"],
    foreign_keys: &[],
};

pub static NAME_BASICS: TableDef = TableDef {
    kind: EntityKind::Person,
    name: "name_basics",
    columns: &[
        ColumnDef::required("nconst", "TEXT"),
        ColumnDef::new("primaryName", "TEXT"),
        ColumnDef::new("birthYear", "INTEGER"),
        ColumnDef::new("deathYear", "INTEGER"),
        ColumnDef::new("primaryProfession", "TEXT"),
        ColumnDef::new("knownForTitles", "TEXT"),
    ],
    primary_key: &["nconst"],
    foreign_keys: &[],
};

const TITLE_REF: ForeignKey = ForeignKey {
    column: "tconst",
    references: "title_basics",
    ref_column: "tconst",
};

pub static TITLE_RATINGS: TableDef = TableDef {
    kind: EntityKind::Rating,
    name: "title_ratings",
    columns: &[
        ColumnDef::required("tconst", "TEXT"),
        ColumnDef::required("averageRating", "REAL"),
        ColumnDef::required("numVotes", "INTEGER"),
    ],
    primary_key: &["tconst"],
    foreign_keys: &[TITLE_REF],
};

pub static TITLE_EPISODE: TableDef = TableDef {
    kind: EntityKind::Episode,
    name: "title_episode",
    columns: &[
        ColumnDef::required("tconst", "TEXT"),
        ColumnDef::new("parentTconst", "TEXT"),
        ColumnDef::new("seasonNumber", "INTEGER"),
        ColumnDef::new("episodeNumber", "INTEGER"),
    ],
    primary_key: &["tconst"],
    foreign_keys: &[
        TITLE_REF,
        ForeignKey {
            column: "parentTconst",
            references: "title_basics",
            ref_column: "tconst",
        },
    ],
};

pub static TITLE_CREW: TableDef = TableDef {
    kind: EntityKind::Crew,
    name: "title_crew",
    columns: &[
        ColumnDef::required("tconst", "TEXT"),
        ColumnDef::new("directors", "TEXT"),
        ColumnDef::new("writers", "TEXT"),
    ],
    primary_key: &["tconst"],
    foreign_keys: &[TITLE_REF],
};

pub static TITLE_AKAS: TableDef = TableDef {
    kind: EntityKind::AlternateTitle,
    name: "title_akas",
    columns: &[
        ColumnDef::required("titleId", "TEXT"),
        ColumnDef::new("ordering", "INTEGER"),
        ColumnDef::new("title", "TEXT"),
        ColumnDef::new("region", "TEXT"),
        ColumnDef::new("language", "TEXT"),
        ColumnDef::new("types", "TEXT"),
        ColumnDef::new("attributes", "TEXT"),
        ColumnDef::required("isOriginalTitle", "INTEGER DEFAULT 0"),
    ],
    primary_key: &["titleId", "ordering"],
    foreign_keys: &[ForeignKey {
        column: "titleId",
        references: "title_basics",
        ref_column: "tconst",
    }],
};

pub static TITLE_PRINCIPALS: TableDef = TableDef {
    kind: EntityKind::Principal,
    name: "title_principals",
    columns: &[
        ColumnDef::required("tconst", "TEXT"),
        ColumnDef::required("ordering", "INTEGER"),
        ColumnDef::new("nconst", "TEXT"),
        ColumnDef::new("category", "TEXT"),
        ColumnDef::new("job", "TEXT"),
        ColumnDef::new("characters", "TEXT"),
    ],
    // Ordering only sorts credits; rows sharing a defaulted ordering all stay.
    primary_key: &[],
    foreign_keys: &[
        TITLE_REF,
        ForeignKey {
            column: "nconst",
            references: "name_basics",
            ref_column: "nconst",
        },
    ],
};

/// Every entity table, in load order.
#[must_use]
pub fn all_tables() -> [&'static TableDef; 7] {
    EntityKind::LOAD_ORDER.map(TableDef::for_kind)
}

#[derive(Clone, Copy, Debug)]
pub struct IndexDef {
    pub name: &'static str,
    pub table: &'static str,
    pub columns: &'static str,
}

impl IndexDef {
    #[must_use]
    pub fn create_sql(&self) -> String {
        format!(
            "CREATE INDEX IF NOT EXISTS {} ON {}({})",
            self.name, self.table, self.columns
        )
    }
}

const fn index(name: &'static str, table: &'static str, columns: &'static str) -> IndexDef {
    IndexDef {
        name,
        table,
        columns,
    }
}

/// Built once, after every entity has loaded.
pub static INDEXES: &[IndexDef] = &[
    index("idx_title_type", "title_basics", "titleType"),
    index("idx_title_year", "title_basics", "startYear"),
    index("idx_title_genre", "title_basics", "genres"),
    index("idx_title_primary", "title_basics", "primaryTitle"),
    index("idx_name_primary", "name_basics", "primaryName"),
    index("idx_ratings_score", "title_ratings", "averageRating DESC"),
    index("idx_ratings_votes", "title_ratings", "numVotes DESC"),
    index("idx_principals_title", "title_principals", "tconst"),
    index("idx_principals_person", "title_principals", "nconst"),
    index("idx_principals_category", "title_principals", "category"),
    index("idx_episode_parent", "title_episode", "parentTconst"),
    index("idx_akas_title", "title_akas", "titleId"),
    index("idx_title_type_year", "title_basics", "titleType, startYear"),
    index("idx_principals_title_order", "title_principals", "tconst, ordering"),
    index("idx_episode_season", "title_episode", "parentTconst, seasonNumber"),
];

/// Phase marker and per-entity ledger. Never dropped by `create_schema`
/// except as part of a full rebuild.
pub const BOOKKEEPING_DDL: &str = "
CREATE TABLE IF NOT EXISTS import_meta (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS import_ledger (
    entity         TEXT PRIMARY KEY,
    status         TEXT NOT NULL,
    source         TEXT,
    attempted      INTEGER NOT NULL DEFAULT 0,
    malformed      INTEGER NOT NULL DEFAULT 0,
    rejected       INTEGER NOT NULL DEFAULT 0,
    persisted      INTEGER NOT NULL DEFAULT 0,
    duplicates     INTEGER NOT NULL DEFAULT 0,
    failed_batches INTEGER NOT NULL DEFAULT 0,
    elapsed_ms     INTEGER NOT NULL DEFAULT 0,
    completed_at   TEXT NOT NULL DEFAULT (datetime('now'))
);
";

/// A record that maps onto one row of its entity table.
///
/// `params` yields values in the order of [`TableDef::columns`].
pub trait Insertable: Send + Sync + 'static {
    fn table() -> &'static TableDef;
    fn params(&self) -> Vec<&dyn ToSql>;
}

impl Insertable for Title {
    fn table() -> &'static TableDef {
        &TITLE_BASICS
    }

    fn params(&self) -> Vec<&dyn ToSql> {
        vec![
            &self.tconst,
            &self.title_type,
            &self.primary_title,
            &self.original_title,
            &self.is_adult,
            &self.start_year,
            &self.end_year,
            &self.runtime_minutes,
            &self.genres,
        ]
    }
}

impl Insertable for Person {
    fn table() -> &'static TableDef {
        &NAME_BASICS
    }

    fn params(&self) -> Vec<&dyn ToSql> {
        vec![
            &self.nconst,
            &self.primary_name,
            &self.birth_year,
            &self.death_year,
            &self.primary_profession,
            &self.known_for_titles,
        ]
    }
}

impl Insertable for Rating {
    fn table() -> &'static TableDef {
        &TITLE_RATINGS
    }

    fn params(&self) -> Vec<&dyn ToSql> {
        vec![&self.tconst, &self.average_rating, &self.num_votes]
    }
}

impl Insertable for Episode {
    fn table() -> &'static TableDef {
        &TITLE_EPISODE
    }

    fn params(&self) -> Vec<&dyn ToSql> {
        vec![
            &self.tconst,
            &self.parent_tconst,
            &self.season_number,
            &self.episode_number,
        ]
    }
}

impl Insertable for Crew {
    fn table() -> &'static TableDef {
        &TITLE_CREW
    }

    fn params(&self) -> Vec<&dyn ToSql> {
        vec![&self.tconst, &self.directors, &self.writers]
    }
}

impl Insertable for AlternateTitle {
    fn table() -> &'static TableDef {
        &TITLE_AKAS
    }

    fn params(&self) -> Vec<&dyn ToSql> {
        vec![
            &self.title_id,
            &self.ordering,
            &self.title,
            &self.region,
            &self.language,
            &self.types,
            &self.attributes,
            &self.is_original_title,
        ]
    }
}

impl Insertable for Principal {
    fn table() -> &'static TableDef {
        &TITLE_PRINCIPALS
    }

    fn params(&self) -> Vec<&dyn ToSql> {
        vec![
            &self.tconst,
            &self.ordering,
            &self.nconst,
            &self.category,
            &self.job,
            &self.characters,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_table_has_matching_kind() {
        for kind in EntityKind::LOAD_ORDER {
            assert_eq!(TableDef::for_kind(kind).kind, kind);
        }
    }

    #[test]
    fn insert_sql_lists_every_column() {
        let sql = TITLE_RATINGS.insert_sql();
        assert_eq!(
            sql,
            "INSERT OR IGNORE INTO title_ratings (tconst, averageRating, numVotes) VALUES (?1, ?2, ?3)"
        );
    }

    #[test]
    fn principals_with_the_same_ordering_are_all_kept() -> anyhow::Result<()> {
        let conn = rusqlite::Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", false)?;
        conn.execute_batch(&TITLE_PRINCIPALS.create_sql())?;
        let sql = TITLE_PRINCIPALS.insert_sql();
        for nconst in ["nm1", "nm2", "nm3"] {
            conn.execute(
                &sql,
                rusqlite::params!["tt1", 0, nconst, "actor", None::<String>, None::<String>],
            )?;
        }
        let rows: i64 =
            conn.query_row("SELECT COUNT(*) FROM title_principals", [], |r| r.get(0))?;
        assert_eq!(rows, 3);
        Ok(())
    }

    #[test]
    fn ddl_creates_in_memory() -> anyhow::Result<()> {
        let conn = rusqlite::Connection::open_in_memory()?;
        for table in all_tables() {
            conn.execute_batch(&table.create_sql())?;
        }
        for idx in INDEXES {
            conn.execute_batch(&idx.create_sql())?;
        }
        conn.execute_batch(BOOKKEEPING_DDL)?;
        Ok(())
    }
}
