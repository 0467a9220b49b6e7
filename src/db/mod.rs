//! SQLite persistence of [`LogRecord`]s.
//!
//! All connections come from an `r2d2` pool; every operation checks one out
//! for its own duration so it is returned on every exit path.

mod batchinsert;

use std::path::Path;
use std::time::Duration;

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, OptionalExtension, ToSql};
use tracing::debug;

pub use batchinsert::RecordInsertor;
pub(crate) use batchinsert::{record_from_row, RECORD_COLUMNS};

use crate::fields::Field;
use crate::filter::Filter;
use crate::models::LogRecord;
use crate::Error;

const SCHEMA: &str = include_str!("schema.sql");

/// Records per insert transaction.
pub const DEFAULT_BATCH_SIZE: usize = 300;

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConnection = PooledConnection<SqliteConnectionManager>;

fn configure(conn: &mut Connection) -> rusqlite::Result<()> {
    let _: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
    conn.execute_batch("PRAGMA synchronous = NORMAL;")?;
    conn.busy_timeout(Duration::from_secs(5))?;
    Ok(())
}

fn create_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA)
}

pub fn init(path: impl AsRef<Path>) -> Result<DbPool, Error> {
    let manager = SqliteConnectionManager::file(path).with_init(configure);
    let pool = r2d2::Pool::new(manager)?;
    create_schema(&*pool.get()?)?;
    Ok(pool)
}

/// A single in-memory database. The pool is pinned to one connection that
/// is never recycled, otherwise each checkout would see a fresh database.
pub fn init_in_memory() -> Result<DbPool, Error> {
    let manager = SqliteConnectionManager::memory().with_init(configure);
    let pool = r2d2::Pool::builder()
        .max_size(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .build(manager)?;
    create_schema(&*pool.get()?)?;
    Ok(pool)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderBy {
    pub field: Field,
    pub desc: bool,
}

impl OrderBy {
    pub fn asc(field: Field) -> Self {
        OrderBy { field, desc: false }
    }

    pub fn desc(field: Field) -> Self {
        OrderBy { field, desc: true }
    }

    fn sql(&self) -> String {
        let dir = if self.desc { "DESC" } else { "ASC" };
        // rowid keeps ties in insertion order
        format!(" ORDER BY {} {}, rowid ASC", self.field.column(), dir)
    }
}

/// Durable keyed collection of log records. Cheap to clone.
#[derive(Clone)]
pub struct RecordStore {
    pool: DbPool,
    batch_size: usize,
}

impl RecordStore {
    pub fn new(pool: DbPool) -> Self {
        RecordStore {
            pool,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        Ok(RecordStore::new(init(path)?))
    }

    pub fn open_in_memory() -> Result<Self, Error> {
        Ok(RecordStore::new(init_in_memory()?))
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn connection(&self) -> Result<DbConnection, Error> {
        Ok(self.pool.get()?)
    }

    pub fn exists(&self, raw_text: &str) -> Result<bool, Error> {
        let conn = self.connection()?;
        Ok(exists_with(&conn, raw_text)?)
    }

    pub fn get(&self, raw_text: &str) -> Result<Option<LogRecord>, Error> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {} FROM logs WHERE raw_text = ?",
            RECORD_COLUMNS
        ))?;
        Ok(stmt
            .query_row([raw_text], record_from_row)
            .optional()?)
    }

    /// Inserts one record; false when its raw text is already stored.
    pub fn insert(&self, record: &LogRecord) -> Result<bool, Error> {
        let mut conn = self.connection()?;
        let tx = conn.transaction()?;
        let inserted = RecordInsertor::new(&tx)?.add(record)?;
        tx.commit()?;
        Ok(inserted)
    }

    /// Inserts records in transactions of `batch_size`, returning how many
    /// were new. A failure rolls back only the chunk in progress.
    pub fn insert_batch(&self, records: &[LogRecord]) -> Result<usize, Error> {
        let mut conn = self.connection()?;
        let mut inserted = 0;
        for chunk in records.chunks(self.batch_size) {
            let tx = conn.transaction()?;
            {
                let mut insertor = RecordInsertor::new(&tx)?;
                for record in chunk {
                    if insertor.add(record)? {
                        inserted += 1;
                    }
                }
            }
            tx.commit()?;
            debug!("committed {} records", chunk.len());
        }
        Ok(inserted)
    }

    /// Records matching `filter`, optionally ordered, skipping `offset` and
    /// returning at most `limit` (all when `None`).
    pub fn scan(
        &self,
        filter: &Filter,
        order_by: Option<OrderBy>,
        offset: u64,
        limit: Option<u64>,
    ) -> Result<Vec<LogRecord>, Error> {
        let limit = limit.map(sql_count).unwrap_or(-1);
        let offset = sql_count(offset);
        let (where_sql, mut params) = filter.where_clause();
        let order_sql = order_by.map(|o| o.sql()).unwrap_or_default();
        params.push(&limit as &dyn ToSql);
        params.push(&offset as &dyn ToSql);

        let conn = self.connection()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM logs{}{} LIMIT ? OFFSET ?",
            RECORD_COLUMNS, where_sql, order_sql
        ))?;
        let rows = stmt.query_map(&params[..], record_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn count(&self, filter: &Filter) -> Result<u64, Error> {
        let (where_sql, params) = filter.where_clause();
        let conn = self.connection()?;
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM logs{}", where_sql),
            &params[..],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

/// LIMIT/OFFSET value; anything past SQLite's range means "past the end".
pub(crate) fn sql_count(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

pub(crate) fn exists_with(conn: &Connection, raw_text: &str) -> rusqlite::Result<bool> {
    let mut stmt = conn.prepare_cached("SELECT EXISTS(SELECT 1 FROM logs WHERE raw_text = ?)")?;
    stmt.query_row([raw_text], |row| row.get(0))
}
