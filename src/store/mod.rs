//! Target store: table descriptors, schema lifecycle, list-column helpers
//! and store resolution.

pub mod detect;
pub mod manager;
pub mod multi_value;
pub mod schema;

pub use detect::{FsProbe, StoreProbe, StoreTarget, detect_store};
pub use manager::{SchemaManager, StoreState, reset_store, store_files};
pub use schema::{Insertable, TableDef};
