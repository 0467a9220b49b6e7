use chrono::{DateTime, FixedOffset, NaiveDate};
use serde::Serialize;

use crate::enrichment::EnrichedFields;

/// Fields pulled out of one log line before enrichment.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ParsedLine {
    pub ip: String,
    pub time: DateTime<FixedOffset>,
    pub method: String,
    pub url: String,
    pub referer: String,
    pub status: i64,
    pub bytes: i64,
    pub user_agent: String,
}

/// A stored access log entry. The raw line is its identity.
#[derive(Clone, PartialEq, Eq, Debug, Serialize)]
pub struct LogRecord {
    #[serde(rename = "text")]
    pub raw_text: String,
    pub ip: String,
    pub country: String,
    pub city: String,
    pub time: DateTime<FixedOffset>,
    pub date: NaiveDate,
    pub method: String,
    pub url: String,
    #[serde(rename = "refer")]
    pub referer: String,
    pub status: i64,
    #[serde(rename = "byte")]
    pub bytes: i64,
    pub browser: String,
    pub browser_version: String,
    pub platform: String,
    pub platform_version: String,
    pub device: String,
    pub brand: Option<String>,
}

impl LogRecord {
    pub fn new(raw_text: String, parsed: ParsedLine, enriched: EnrichedFields) -> Self {
        let EnrichedFields { geo, ua } = enriched;
        LogRecord {
            raw_text,
            ip: parsed.ip,
            country: geo.country,
            city: geo.city,
            date: parsed.time.date_naive(),
            time: parsed.time,
            method: parsed.method,
            url: parsed.url,
            referer: parsed.referer,
            status: parsed.status,
            bytes: parsed.bytes,
            browser: ua.browser_family,
            browser_version: ua.browser_version,
            platform: ua.platform_family,
            platform_version: ua.platform_version,
            device: ua.device_family,
            brand: ua.device_brand,
        }
    }
}
