use rusqlite::{params, CachedStatement, Row, Transaction};

use crate::models::LogRecord;

pub(crate) const RECORD_COLUMNS: &str = "
    raw_text, ip, country, city, timestamp, utc_offset, date, method, url,
    referer, status, bytes, browser, browser_version, platform,
    platform_version, device, brand
";

/// Inserts records inside one transaction, reusing a cached statement.
pub struct RecordInsertor<'conn> {
    add_record: CachedStatement<'conn>,
}

impl<'conn> RecordInsertor<'conn> {
    pub fn new(tx: &'conn Transaction) -> rusqlite::Result<RecordInsertor<'conn>> {
        let add_record = tx.prepare_cached(
            "
            INSERT INTO
            logs(
                raw_text, ip, country, city, timestamp, utc_offset, date, method, url,
                referer, status, bytes, browser, browser_version, platform,
                platform_version, device, brand
            )
            VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(raw_text) DO NOTHING
            ",
        )?;

        Ok(RecordInsertor { add_record })
    }

    /// Returns false when a record with the same raw text already exists.
    pub fn add(&mut self, record: &LogRecord) -> rusqlite::Result<bool> {
        let changed = self.add_record.execute(params![
            &record.raw_text,
            &record.ip,
            &record.country,
            &record.city,
            record.time.timestamp(),
            record.time.offset().local_minus_utc(),
            &record.date,
            &record.method,
            &record.url,
            &record.referer,
            record.status,
            record.bytes,
            &record.browser,
            &record.browser_version,
            &record.platform,
            &record.platform_version,
            &record.device,
            &record.brand,
        ])?;
        Ok(changed == 1)
    }
}

/// Maps a row selected with [`RECORD_COLUMNS`] back into a record.
pub(crate) fn record_from_row(row: &Row<'_>) -> rusqlite::Result<LogRecord> {
    use chrono::{FixedOffset, TimeZone};

    let timestamp: i64 = row.get(4)?;
    let utc_offset: i32 = row.get(5)?;
    let offset = FixedOffset::east_opt(utc_offset)
        .ok_or(rusqlite::Error::IntegralValueOutOfRange(5, utc_offset as i64))?;
    let time = offset
        .timestamp_opt(timestamp, 0)
        .single()
        .ok_or(rusqlite::Error::IntegralValueOutOfRange(4, timestamp))?;

    Ok(LogRecord {
        raw_text: row.get(0)?,
        ip: row.get(1)?,
        country: row.get(2)?,
        city: row.get(3)?,
        time,
        date: row.get(6)?,
        method: row.get(7)?,
        url: row.get(8)?,
        referer: row.get(9)?,
        status: row.get(10)?,
        bytes: row.get(11)?,
        browser: row.get(12)?,
        browser_version: row.get(13)?,
        platform: row.get(14)?,
        platform_version: row.get(15)?,
        device: row.get(16)?,
        brand: row.get(17)?,
    })
}
