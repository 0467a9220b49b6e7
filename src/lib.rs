//! Access log ingestion and aggregation.
//!
//! Lines of a combined-format access log are parsed, enriched with
//! geolocation and user-agent details, deduplicated by their raw text and
//! stored in SQLite. [`query::QueryEngine`] answers paged listings and
//! grouped aggregations over the stored records.

use derive_more::{Display, From};

pub mod config;
pub mod db;
pub mod enrichment;
pub mod fields;
pub mod filter;
pub mod ingest;
pub mod models;
pub mod parser;
pub mod query;
mod utils;

pub use db::RecordStore;
pub use enrichment::Enricher;
pub use fields::{Field, FieldValue};
pub use filter::Filter;
pub use ingest::{IngestionPipeline, IngestionResult};
pub use models::LogRecord;
pub use query::QueryEngine;

#[derive(Debug, Display, From)]
pub enum Error {
    #[display(fmt = "storage failure: {}", _0)]
    Storage(rusqlite::Error),

    #[display(fmt = "connection pool failure: {}", _0)]
    Pool(r2d2::Error),

    #[from(ignore)]
    #[display(fmt = "cannot read '{}': {}", path, source)]
    FileAccess {
        path: String,
        source: std::io::Error,
    },

    #[from(ignore)]
    #[display(fmt = "{}: is not supported", _0)]
    InvalidField(String),

    #[from(ignore)]
    #[display(fmt = "invalid filter '{}'", _0)]
    InvalidFilter(String),

    #[from(ignore)]
    #[display(fmt = "invalid page: start must be >= 1, got {}", _0)]
    InvalidPage(u64),
}

impl std::error::Error for Error {}
