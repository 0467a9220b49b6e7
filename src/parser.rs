use crate::models::ParsedLine;
use chrono::DateTime;
use once_cell::sync::Lazy;
use regex::Regex;

pub const TIMESTAMP_FORMAT: &str = "%d/%b/%Y:%H:%M:%S %z";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError(String);

impl ParseError {
    pub fn new(line: impl AsRef<str>) -> Self {
        ParseError(line.as_ref().to_owned())
    }

    pub fn line(&self) -> &str {
        &self.0
    }
}

impl std::error::Error for ParseError {}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Unable to parse line '{}'", self.0)
    }
}

// Nginx "combined" format restricted to GET/POST over HTTP/1.1. The url is
// everything between the method and the protocol marker, so it keeps the
// separating space.
static COMBINED_LOG_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?i)(?P<ip>\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}) - - \[(?P<date>\d{2}/[a-z]{3}/\d{4}:\d{2}:\d{2}:\d{2} [+\-]\d{4})\] "(?P<method>GET|POST) (?P<url>.+)HTTP/1\.1" (?P<status>\d{3}) (?P<bytes>\d+) "(?P<referrer>-|.+)" "(?P<useragent>.+)""#,
    )
    .expect("combined log regex is valid")
});

/// Extracts the fields of one access log line.
///
/// The whole grammar must match; there are no partial results.
pub fn parse(line: &str) -> Result<ParsedLine, ParseError> {
    let captures = COMBINED_LOG_REGEX
        .captures(line)
        .ok_or_else(|| ParseError::new(line))?;

    if let (
        Some(ipmatch),
        Some(datematch),
        Some(methodmatch),
        Some(urlmatch),
        Some(statusmatch),
        Some(bytesmatch),
        Some(referrermatch),
        Some(useragentmatch),
    ) = (
        captures.name("ip"),
        captures.name("date"),
        captures.name("method"),
        captures.name("url"),
        captures.name("status"),
        captures.name("bytes"),
        captures.name("referrer"),
        captures.name("useragent"),
    ) {
        let time = DateTime::parse_from_str(datematch.as_str(), TIMESTAMP_FORMAT)
            .map_err(|_| ParseError::new(line))?;
        let status = statusmatch
            .as_str()
            .parse::<i64>()
            .map_err(|_| ParseError::new(line))?;
        let bytes = bytesmatch
            .as_str()
            .parse::<i64>()
            .map_err(|_| ParseError::new(line))?;

        Ok(ParsedLine {
            ip: ipmatch.as_str().to_owned(),
            time,
            method: methodmatch.as_str().to_owned(),
            url: urlmatch.as_str().to_owned(),
            referer: referrermatch.as_str().to_owned(),
            status,
            bytes,
            user_agent: useragentmatch.as_str().to_owned(),
        })
    } else {
        Err(ParseError::new(line))
    }
}
