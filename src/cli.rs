//! Command-line interface.
//!
//! Results go to stdout as pretty JSON; logs go to stderr.

use crate::config::Config;
use crate::orchestrator::ImportOrchestrator;
use crate::query::{QueryService, SearchKind, TitleFilter, TitleSort};
use crate::store::{SchemaManager, StoreState, reset_store};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Marquee - load the IMDb title dataset into SQLite and query it
#[derive(Parser)]
#[command(name = "marquee")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// TOML configuration file
    #[arg(long, global = true, env = "MARQUEE_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Load the dataset, or resume an interrupted load
    Import {
        /// Directory holding the *.tsv.gz files
        #[arg(long)]
        dataset: Option<PathBuf>,
        /// Database file
        #[arg(long)]
        db: Option<PathBuf>,
        #[arg(long)]
        batch_size: Option<usize>,
        #[arg(long)]
        workers: Option<usize>,
        /// Also write the import report to this file
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Show the import phase and per-entity ledger
    Status {
        #[arg(long)]
        db: Option<PathBuf>,
    },

    /// Delete the database and its side files
    Reset {
        #[arg(long)]
        db: Option<PathBuf>,
        /// Required; reset refuses to run without it
        #[arg(long)]
        yes: bool,
    },

    /// Row count for an entity kind (title, people, ratings, episodes, crew, akas, principals)
    Count { kind: String },

    /// Headline counts and top rated movies
    Dashboard,

    /// List titles with filters
    #[command(alias = "ls")]
    Titles {
        #[arg(long = "type")]
        title_type: Option<String>,
        #[arg(long)]
        year_min: Option<i32>,
        #[arg(long)]
        year_max: Option<i32>,
        #[arg(long)]
        genre: Option<String>,
        #[arg(long)]
        min_rating: Option<f64>,
        #[arg(long)]
        adult: Option<bool>,
        /// popularity, rating, newest, oldest or title
        #[arg(long, default_value = "popularity")]
        sort: String,
        #[arg(long, default_value = "1")]
        page: usize,
        #[arg(long)]
        page_size: Option<usize>,
    },

    /// Show one title
    #[command(alias = "i")]
    Title {
        id: String,
        /// Include cast and crew, episodes and alternate titles
        #[arg(long)]
        full: bool,
    },

    /// Credits of a person, newest first
    Filmography { id: String },

    /// Search titles, or people with --people
    #[command(alias = "s")]
    Search {
        #[arg(required = true)]
        term: Vec<String>,
        #[arg(long)]
        people: bool,
        #[arg(long = "type")]
        title_type: Option<String>,
    },

    /// Per-genre movie statistics
    Genres {
        #[arg(long, default_value = "1000")]
        min_votes: i64,
        #[arg(long, default_value = "1")]
        min_count: u64,
    },

    /// Yearly movie rating trend with a rolling five-year average
    Trend {
        #[arg(long, default_value = "1950")]
        from: i32,
        #[arg(long, default_value = "2030")]
        to: i32,
        #[arg(long, default_value = "1000")]
        min_votes: i64,
    },
}

/// Parse arguments, set up logging and dispatch.
///
/// # Errors
/// Any configuration, import or query failure, with context.
pub fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::default(),
    };
    init_logging(&config.logging.level);

    let Config {
        mut import,
        mut store,
        query,
        ..
    } = config;

    match cli.command {
        Commands::Import {
            dataset,
            db,
            batch_size,
            workers,
            report,
        } => {
            if let Some(dir) = dataset {
                import.dataset_dir = dir;
            }
            if let Some(db) = db {
                store.path = db;
            }
            if batch_size.is_some() {
                import.batch_size = batch_size;
            }
            if workers.is_some() {
                import.workers = workers;
            }
            let result = ImportOrchestrator::new(import, store)
                .run()
                .context("import failed")?;
            if let Some(path) = report {
                result.save_to_file(&path)?;
                info!(path = %path.display(), "report written");
            }
            println!("{}", result.to_json()?);
        }
        Commands::Status { db } => {
            if let Some(db) = db {
                store.path = db;
            }
            if store.path.is_file() {
                let manager = SchemaManager::open(&store)?;
                let state = manager.has_existing_data()?;
                let status = manager.import_status()?;
                print_json(&json!({
                    "path": store.path,
                    "state": state,
                    "phase": status.phase.map(|p| p.to_string()),
                    "entities": status.entities,
                }))?;
            } else {
                print_json(&json!({ "path": store.path, "state": StoreState::Missing }))?;
            }
        }
        Commands::Reset { db, yes } => {
            if let Some(db) = db {
                store.path = db;
            }
            let removed = reset_store(&store.path, yes)?;
            print_json(&json!({ "removed": removed }))?;
        }
        command => {
            let service = QueryService::open(&store, query)?;
            run_query(&service, command)?;
        }
    }
    Ok(())
}

fn run_query(service: &QueryService, command: Commands) -> Result<()> {
    match command {
        Commands::Count { kind } => {
            let count = service.count_by_kind(&kind)?;
            print_json(&json!({ "kind": kind, "count": count }))
        }
        Commands::Dashboard => print_json(&service.dashboard_stats()?),
        Commands::Titles {
            title_type,
            year_min,
            year_max,
            genre,
            min_rating,
            adult,
            sort,
            page,
            page_size,
        } => {
            let filter = TitleFilter {
                title_type,
                year_min,
                year_max,
                genre,
                min_rating,
                adult,
            };
            let sort: TitleSort = sort.parse()?;
            print_json(&service.list_titles(&filter, sort, page, page_size)?)
        }
        Commands::Title { id, full } => {
            let Some(detail) = service.get_title(&id)? else {
                return print_json(&json!({ "id": id, "found": false }));
            };
            if full {
                print_json(&json!({
                    "title": detail,
                    "credits": service.cast_and_crew(&id, 50)?,
                    "episodes": service.series_episodes(&id)?,
                    "alternate_titles": service.alternate_titles(&id)?,
                }))
            } else {
                print_json(&detail)
            }
        }
        Commands::Filmography { id } => print_json(&service.filmography(&id)?),
        Commands::Search {
            term,
            people,
            title_type,
        } => {
            let kind = if people {
                SearchKind::People
            } else {
                SearchKind::Titles { title_type }
            };
            print_json(&service.search_by_name(&term.join(" "), &kind)?)
        }
        Commands::Genres {
            min_votes,
            min_count,
        } => print_json(&service.genre_aggregate(min_votes, min_count)?),
        Commands::Trend {
            from,
            to,
            min_votes,
        } => print_json(&service.rating_trend(from, to, min_votes)?),
        Commands::Import { .. } | Commands::Status { .. } | Commands::Reset { .. } => Ok(()),
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// `RUST_LOG` wins over the configured level.
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
