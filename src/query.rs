//! Read-only listings and grouped aggregations over the record store.

use chrono::NaiveDate;
use rusqlite::{Row, ToSql};
use serde::Serialize;

use crate::db::{sql_count, OrderBy, RecordStore};
use crate::fields::{Field, FieldValue};
use crate::filter::Filter;
use crate::models::LogRecord;
use crate::Error;

pub const SORT_BY_BYTES: &str = "bytes";
pub const SORT_BY_COUNTS: &str = "counts";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    pub sort_by: String,
    pub desc: bool,
    /// 1-based page number
    pub start: u64,
    pub length: u64,
    pub filter: Filter,
}

impl Default for ListQuery {
    fn default() -> Self {
        ListQuery {
            sort_by: Field::Time.name().to_owned(),
            desc: true,
            start: 1,
            length: 10,
            filter: Filter::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub start: u64,
    pub length: u64,
    pub total: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupCount {
    pub group: FieldValue,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BytesQuery {
    pub by: String,
    pub with_date: bool,
    /// `bytes`, `counts` or a field name
    pub sort_by: String,
    pub desc: bool,
    pub start: u64,
    pub length: u64,
    pub filter: Filter,
}

impl BytesQuery {
    pub fn new(by: impl Into<String>) -> Self {
        BytesQuery {
            by: by.into(),
            with_date: false,
            sort_by: SORT_BY_BYTES.to_owned(),
            desc: true,
            start: 1,
            length: 10,
            filter: Filter::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BytesRow {
    pub group: FieldValue,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    pub bytes: i64,
    pub counts: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BytesPage {
    pub data: Vec<BytesRow>,
    pub start: u64,
    pub length: u64,
    /// Number of groups, not records
    pub total: u64,
    pub header: Vec<&'static str>,
}

fn page_offset(start: u64, length: u64) -> Result<u64, Error> {
    if start < 1 {
        return Err(Error::InvalidPage(start));
    }
    Ok((start - 1).saturating_mul(length))
}

pub struct QueryEngine {
    store: RecordStore,
}

impl QueryEngine {
    pub fn new(store: RecordStore) -> Self {
        QueryEngine { store }
    }

    pub fn list(&self, query: &ListQuery) -> Result<Page<LogRecord>, Error> {
        let field = query.sort_by.parse::<Field>()?;
        let offset = page_offset(query.start, query.length)?;
        let order_by = OrderBy {
            field,
            desc: query.desc,
        };

        let data = self
            .store
            .scan(&query.filter, Some(order_by), offset, Some(query.length))?;
        let total = self.store.count(&query.filter)?;

        Ok(Page {
            data,
            start: query.start,
            length: query.length,
            total,
        })
    }

    /// Number of matching records per distinct value of `by`, in value order.
    pub fn count_by(&self, by: &str, filter: &Filter) -> Result<Vec<GroupCount>, Error> {
        let field = Field::parse_groupable(by)?;
        let (where_sql, params) = filter.where_clause();
        let column = field.column();

        let conn = self.store.connection()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {col}, COUNT(*) FROM logs{where_sql} GROUP BY {col} ORDER BY {col} ASC",
            col = column,
            where_sql = where_sql,
        ))?;
        let rows = stmt.query_map(&params[..], |row| {
            Ok(GroupCount {
                group: field.read_value(row, 0)?,
                count: row.get::<_, i64>(1)? as u64,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Byte sums and record counts per group of `query.by`, optionally split
    /// by date. Grouping by `ip` also reports its country and city.
    pub fn bytes_by(&self, query: &BytesQuery) -> Result<BytesPage, Error> {
        let by = Field::parse_groupable(&query.by)?;
        let offset = page_offset(query.start, query.length)?;
        let with_geo = by == Field::Ip;

        let mut group_columns = vec![by.column()];
        if query.with_date {
            group_columns.push(Field::Date.column());
        }

        let sort_sql = match query.sort_by.as_str() {
            SORT_BY_BYTES => "SUM(bytes)".to_owned(),
            SORT_BY_COUNTS => "COUNT(*)".to_owned(),
            name => {
                let column = name.parse::<Field>()?.column();
                if group_columns.contains(&column) {
                    column.to_owned()
                } else {
                    format!("MIN({})", column)
                }
            }
        };
        let dir = if query.desc { "DESC" } else { "ASC" };
        let tie_break = group_columns
            .iter()
            .map(|c| format!("{} ASC", c))
            .collect::<Vec<_>>()
            .join(", ");
        let group_sql = group_columns.join(", ");

        let mut select = vec![by.column().to_owned()];
        let mut header = vec!["group"];
        if query.with_date {
            select.push(Field::Date.column().to_owned());
            header.push("date");
        }
        if with_geo {
            select.push("MIN(country)".to_owned());
            select.push("MIN(city)".to_owned());
            header.extend(["country", "city"]);
        }
        select.push("SUM(bytes)".to_owned());
        select.push("COUNT(*)".to_owned());
        header.extend(["bytes", "counts"]);

        let limit = sql_count(query.length);
        let offset = sql_count(offset);
        let (where_sql, mut params) = query.filter.where_clause();

        let conn = self.store.connection()?;
        let total: i64 = conn.query_row(
            &format!(
                "SELECT COUNT(*) FROM (SELECT 1 FROM logs{} GROUP BY {})",
                where_sql, group_sql
            ),
            &params[..],
            |row| row.get(0),
        )?;

        params.push(&limit as &dyn ToSql);
        params.push(&offset as &dyn ToSql);
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM logs{} GROUP BY {} ORDER BY {} {}, {} LIMIT ? OFFSET ?",
            select.join(", "),
            where_sql,
            group_sql,
            sort_sql,
            dir,
            tie_break
        ))?;
        let rows = stmt.query_map(&params[..], |row| {
            bytes_row(row, by, query.with_date, with_geo)
        })?;

        Ok(BytesPage {
            data: rows.collect::<rusqlite::Result<Vec<_>>>()?,
            start: query.start,
            length: query.length,
            total: total as u64,
            header,
        })
    }
}

fn bytes_row(row: &Row<'_>, by: Field, with_date: bool, with_geo: bool) -> rusqlite::Result<BytesRow> {
    let group = by.read_value(row, 0)?;
    let mut idx = 1;
    let date = if with_date {
        idx += 1;
        Some(row.get(idx - 1)?)
    } else {
        None
    };
    let (country, city) = if with_geo {
        idx += 2;
        (Some(row.get(idx - 2)?), Some(row.get(idx - 1)?))
    } else {
        (None, None)
    };
    Ok(BytesRow {
        group,
        date,
        country,
        city,
        bytes: row.get(idx)?,
        counts: row.get::<_, i64>(idx + 1)? as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tests::record;
    use crate::filter::Condition;

    fn engine(records: &[LogRecord]) -> QueryEngine {
        let store = RecordStore::open_in_memory().unwrap();
        store.insert_batch(records).unwrap();
        QueryEngine::new(store)
    }

    fn sample() -> Vec<LogRecord> {
        let mut records = vec![
            record("a", "1.1.1.1", "2021-01-01T10:00:00Z", 100),
            record("b", "1.1.1.1", "2021-01-01T11:00:00Z", 200),
            record("c", "1.1.1.1", "2021-01-02T12:00:00Z", 300),
            record("d", "2.2.2.2", "2021-01-02T13:00:00Z", 50),
            record("e", "3.3.3.3", "2021-01-03T14:00:00Z", 5),
        ];
        records[3].country = "Sweden".to_owned();
        records[3].city = "Stockholm".to_owned();
        records[4].url = "/other ".to_owned();
        records
    }

    #[test]
    fn byte_sum_of_one_group() {
        let engine = engine(&sample()[..3]);
        let page = engine.bytes_by(&BytesQuery::new("ip")).unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.data[0].group, FieldValue::Text("1.1.1.1".to_owned()));
        assert_eq!(page.data[0].bytes, 600);
        assert_eq!(page.data[0].counts, 3);
        assert_eq!(page.data[0].country.as_deref(), Some("Finland"));
        assert_eq!(page.data[0].city.as_deref(), Some("Helsinki"));
        assert_eq!(page.header, vec!["group", "country", "city", "bytes", "counts"]);
    }

    #[test]
    fn groups_partition_the_records() {
        let engine = engine(&sample());
        for field in Field::aggregatable() {
            let counts = engine.count_by(field.name(), &Filter::new()).unwrap();
            let sum: u64 = counts.iter().map(|g| g.count).sum();
            assert_eq!(sum, 5, "grouping by {}", field);
        }

        let counts = engine.count_by("ip", &Filter::new()).unwrap();
        assert_eq!(
            counts,
            vec![
                GroupCount {
                    group: FieldValue::Text("1.1.1.1".to_owned()),
                    count: 3
                },
                GroupCount {
                    group: FieldValue::Text("2.2.2.2".to_owned()),
                    count: 1
                },
                GroupCount {
                    group: FieldValue::Text("3.3.3.3".to_owned()),
                    count: 1
                },
            ]
        );
    }

    #[test]
    fn counts_by_response_size() {
        let mut records = sample();
        records[4].bytes = 50;
        let engine = engine(&records);
        let counts = engine.count_by("byte", &Filter::new()).unwrap();
        assert_eq!(
            counts[0],
            GroupCount {
                group: FieldValue::Integer(50),
                count: 2
            }
        );
        assert_eq!(counts.len(), 4);

        let page = engine.bytes_by(&BytesQuery::new("byte")).unwrap();
        assert_eq!(page.total, 4);
        assert_eq!(page.data[0].group, FieldValue::Integer(300));
        // equal sums fall back to the group value
        assert_eq!(page.data[2].group, FieldValue::Integer(50));
        assert_eq!((page.data[2].bytes, page.data[2].counts), (100, 2));
        assert_eq!((page.data[3].bytes, page.data[3].counts), (100, 1));
    }

    #[test]
    fn sorts_groups_by_aggregate_and_field() {
        let engine = engine(&sample());

        let mut query = BytesQuery::new("ip");
        let page = engine.bytes_by(&query).unwrap();
        let bytes = page.data.iter().map(|r| r.bytes).collect::<Vec<_>>();
        assert_eq!(bytes, vec![600, 50, 5]);
        assert_eq!(page.data[1].country.as_deref(), Some("Sweden"));

        query.sort_by = "counts".to_owned();
        query.desc = false;
        let page = engine.bytes_by(&query).unwrap();
        // ties on count fall back to the group value
        let groups = page.data.iter().map(|r| r.group.clone()).collect::<Vec<_>>();
        assert_eq!(
            groups,
            vec![
                FieldValue::Text("2.2.2.2".to_owned()),
                FieldValue::Text("3.3.3.3".to_owned()),
                FieldValue::Text("1.1.1.1".to_owned()),
            ]
        );

        query.sort_by = "time".to_owned();
        query.desc = true;
        let page = engine.bytes_by(&query).unwrap();
        assert_eq!(page.data[0].group, FieldValue::Text("3.3.3.3".to_owned()));
        assert_eq!(page.data[2].group, FieldValue::Text("1.1.1.1".to_owned()));
    }

    #[test]
    fn with_date_splits_groups() {
        let engine = engine(&sample());
        let mut query = BytesQuery::new("url");
        query.with_date = true;
        query.length = 100;

        let page = engine.bytes_by(&query).unwrap();
        assert_eq!(page.header, vec!["group", "date", "bytes", "counts"]);
        assert_eq!(page.total, 3);
        let day_one = page
            .data
            .iter()
            .find(|r| r.date == NaiveDate::from_ymd_opt(2021, 1, 1))
            .unwrap();
        assert_eq!((day_one.bytes, day_one.counts), (300, 2));
        assert!(page.data.iter().all(|r| r.country.is_none()));
        assert_eq!(page.data.iter().map(|r| r.counts).sum::<u64>(), 5);
    }

    #[test]
    fn bytes_pages_and_filters() {
        let engine = engine(&sample());
        let mut query = BytesQuery::new("ip");
        query.length = 2;
        query.start = 2;
        let page = engine.bytes_by(&query).unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.data.len(), 1);
        assert_eq!(page.data[0].bytes, 5);

        let mut query = BytesQuery::new("ip");
        query.filter = Filter::new().and("byte>=100".parse::<Condition>().unwrap());
        let page = engine.bytes_by(&query).unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.data[0].bytes, 600);
    }

    #[test]
    fn list_pages_are_contiguous() {
        let engine = engine(&sample());
        let everything = engine
            .list(&ListQuery {
                length: 100,
                ..ListQuery::default()
            })
            .unwrap();
        assert_eq!(everything.total, 5);
        let texts = everything
            .data
            .iter()
            .map(|r| r.raw_text.as_str())
            .collect::<Vec<_>>();
        assert_eq!(texts, vec!["e", "d", "c", "b", "a"]);

        let mut seen = Vec::new();
        for start in 1..=3 {
            let page = engine
                .list(&ListQuery {
                    start,
                    length: 2,
                    ..ListQuery::default()
                })
                .unwrap();
            assert_eq!(page.total, 5);
            seen.extend(page.data.into_iter().map(|r| r.raw_text));
        }
        assert_eq!(seen, texts);
    }

    #[test]
    fn list_total_counts_filtered_records() {
        let engine = engine(&sample());
        let page = engine
            .list(&ListQuery {
                filter: Filter::new().and("ip=1.1.1.1".parse::<Condition>().unwrap()),
                ..ListQuery::default()
            })
            .unwrap();
        assert_eq!(page.total, 3);
        assert!(page.data.iter().all(|r| r.ip == "1.1.1.1"));
    }

    #[test]
    fn rejects_unknown_fields_and_pages() {
        let engine = engine(&sample());
        let query = ListQuery {
            sort_by: "nonexistent".to_owned(),
            ..ListQuery::default()
        };
        assert!(matches!(engine.list(&query), Err(Error::InvalidField(_))));
        assert!(matches!(
            engine.count_by("time", &Filter::new()),
            Err(Error::InvalidField(_))
        ));

        let mut bytes = BytesQuery::new("ip");
        bytes.sort_by = "nonexistent".to_owned();
        assert!(matches!(engine.bytes_by(&bytes), Err(Error::InvalidField(_))));

        let query = ListQuery {
            start: 0,
            ..ListQuery::default()
        };
        assert!(matches!(engine.list(&query), Err(Error::InvalidPage(0))));
    }

    #[test]
    fn pages_past_the_end_are_empty() {
        let engine = engine(&sample());
        let page = engine
            .list(&ListQuery {
                start: u64::MAX,
                ..ListQuery::default()
            })
            .unwrap();
        assert!(page.data.is_empty());
        assert_eq!(page.total, 5);

        let page = engine
            .list(&ListQuery {
                start: 2,
                length: u64::MAX,
                ..ListQuery::default()
            })
            .unwrap();
        assert!(page.data.is_empty());

        let mut query = BytesQuery::new("ip");
        query.start = 4;
        let page = engine.bytes_by(&query).unwrap();
        assert!(page.data.is_empty());
        assert_eq!(page.total, 3);

        query.start = 2;
        query.length = u64::MAX;
        assert!(engine.bytes_by(&query).unwrap().data.is_empty());
        query.start = 1;
        assert_eq!(engine.bytes_by(&query).unwrap().data.len(), 3);
    }
}
