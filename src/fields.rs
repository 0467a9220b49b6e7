//! The fixed set of record fields that can be filtered, sorted and grouped.

use std::str::FromStr;

use chrono::{DateTime, FixedOffset, NaiveDate};
use rusqlite::types::{ToSql, ToSqlOutput, Type, Value, ValueRef};
use rusqlite::Row;
use serde::Serialize;

use crate::parser::TIMESTAMP_FORMAT;
use crate::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Integer,
    Date,
    Time,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Ip,
    Time,
    Date,
    Country,
    City,
    Method,
    Url,
    Refer,
    Status,
    Byte,
    Browser,
    BrowserVersion,
    Platform,
    PlatformVersion,
    Device,
    Brand,
}

pub struct FieldSpec {
    pub field: Field,
    pub name: &'static str,
    pub column: &'static str,
    pub kind: FieldKind,
    pub indexable: bool,
    pub aggregatable: bool,
}

macro_rules! registry {
    ( $( $field:ident => $name:literal, $column:literal, $kind:ident, $indexable:literal, $aggregatable:literal; )* ) => {
        pub const REGISTRY: &[FieldSpec] = &[
            $( FieldSpec {
                field: Field::$field,
                name: $name,
                column: $column,
                kind: FieldKind::$kind,
                indexable: $indexable,
                aggregatable: $aggregatable,
            }, )*
        ];
    };
}

// name => column, kind, indexable, aggregatable
registry! {
    Ip => "ip", "ip", Text, true, true;
    Time => "time", "timestamp", Time, true, false;
    Date => "date", "date", Date, true, true;
    Country => "country", "country", Text, true, true;
    City => "city", "city", Text, true, true;
    Method => "method", "method", Text, true, true;
    Url => "url", "url", Text, true, true;
    Refer => "refer", "referer", Text, true, true;
    Status => "status", "status", Integer, true, true;
    Byte => "byte", "bytes", Integer, true, true;
    Browser => "browser", "browser", Text, true, true;
    BrowserVersion => "browser_version", "browser_version", Text, true, true;
    Platform => "platform", "platform", Text, true, true;
    PlatformVersion => "platform_version", "platform_version", Text, true, true;
    Device => "device", "device", Text, true, true;
    Brand => "brand", "brand", Text, true, true;
}

impl Field {
    pub fn spec(self) -> &'static FieldSpec {
        REGISTRY
            .iter()
            .find(|spec| spec.field == self)
            .unwrap_or_else(|| unreachable!("{:?} missing from registry", self))
    }

    pub fn name(self) -> &'static str {
        self.spec().name
    }

    pub fn column(self) -> &'static str {
        self.spec().column
    }

    pub fn kind(self) -> FieldKind {
        self.spec().kind
    }

    pub fn all() -> impl Iterator<Item = Field> {
        REGISTRY.iter().map(|spec| spec.field)
    }

    pub fn aggregatable() -> impl Iterator<Item = Field> {
        REGISTRY
            .iter()
            .filter(|spec| spec.aggregatable)
            .map(|spec| spec.field)
    }

    /// Resolves a name that must be usable as a group key.
    pub fn parse_groupable(name: &str) -> Result<Field, Error> {
        let field = name.parse::<Field>()?;
        if field.spec().aggregatable {
            Ok(field)
        } else {
            Err(Error::InvalidField(name.to_owned()))
        }
    }

    /// Parses a user-supplied value according to this field's kind.
    ///
    /// Times accept RFC 3339 or the access log format.
    pub fn parse_value(self, raw: &str) -> Result<FieldValue, Error> {
        let invalid = || Error::InvalidFilter(format!("{}={}", self.name(), raw));
        match self.kind() {
            FieldKind::Text => Ok(FieldValue::Text(raw.to_owned())),
            FieldKind::Integer => raw
                .trim()
                .parse::<i64>()
                .map(FieldValue::Integer)
                .map_err(|_| invalid()),
            FieldKind::Date => NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
                .map(FieldValue::Date)
                .map_err(|_| invalid()),
            FieldKind::Time => DateTime::parse_from_rfc3339(raw.trim())
                .or_else(|_| DateTime::parse_from_str(raw.trim(), TIMESTAMP_FORMAT))
                .map(FieldValue::Time)
                .map_err(|_| invalid()),
        }
    }

    /// Reads this field's group value from column `idx` of a result row.
    ///
    /// Times are not groupable: the column holds unix seconds without the
    /// offset needed to rebuild the parsed value.
    pub(crate) fn read_value(self, row: &Row<'_>, idx: usize) -> rusqlite::Result<FieldValue> {
        let value = match (self.kind(), row.get_ref(idx)?) {
            (_, ValueRef::Null) => FieldValue::Null,
            (FieldKind::Text, _) => FieldValue::Text(row.get(idx)?),
            (FieldKind::Integer, _) => FieldValue::Integer(row.get(idx)?),
            (FieldKind::Date, _) => FieldValue::Date(row.get(idx)?),
            (FieldKind::Time, _) => {
                return Err(rusqlite::Error::InvalidColumnType(
                    idx,
                    self.column().to_owned(),
                    Type::Integer,
                ))
            }
        };
        Ok(value)
    }
}

impl FromStr for Field {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        REGISTRY
            .iter()
            .find(|spec| spec.name == s)
            .map(|spec| spec.field)
            .ok_or_else(|| Error::InvalidField(s.to_owned()))
    }
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A typed value of one registry field.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Integer(i64),
    Text(String),
    Date(NaiveDate),
    Time(DateTime<FixedOffset>),
}

impl ToSql for FieldValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            FieldValue::Null => ToSqlOutput::Owned(Value::Null),
            FieldValue::Integer(v) => ToSqlOutput::Owned(Value::Integer(*v)),
            FieldValue::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            FieldValue::Date(d) => d.to_sql()?,
            // Times are stored as unix seconds.
            FieldValue::Time(t) => ToSqlOutput::Owned(Value::Integer(t.timestamp())),
        })
    }
}
