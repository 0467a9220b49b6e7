use proptest::prelude::*;

use logtally::enrichment::{EnrichedFields, GeoInfo, UserAgentInfo};
use logtally::models::LogRecord;
use logtally::parser;
use logtally::query::BytesQuery;
use logtally::{Field, Filter, QueryEngine, RecordStore};

const IPS: [&str; 4] = ["10.0.0.1", "10.0.0.2", "172.16.0.9", "192.168.1.1"];
const URLS: [&str; 3] = ["/", "/index.html", "/api/v1/items"];
const METHODS: [&str; 2] = ["GET", "POST"];
const STATUSES: [u16; 4] = [200, 301, 404, 500];

#[derive(Debug, Clone)]
struct Entry {
    ip: usize,
    url: usize,
    method: usize,
    status: usize,
    day: u32,
    bytes: u32,
}

fn entry_strategy() -> impl Strategy<Value = Entry> {
    (0..IPS.len(), 0..URLS.len(), 0..METHODS.len(), 0..STATUSES.len(), 1u32..5, 0u32..100_000)
        .prop_map(|(ip, url, method, status, day, bytes)| Entry {
            ip,
            url,
            method,
            status,
            day,
            bytes,
        })
}

fn to_record(i: usize, entry: &Entry) -> LogRecord {
    let raw = format!(
        r#"{} - - [{:02}/Mar/2021:10:{:02}:{:02} +0000] "{} {} HTTP/1.1" {} {} "-" "agent-{}""#,
        IPS[entry.ip],
        entry.day,
        (i / 60) % 60,
        i % 60,
        METHODS[entry.method],
        URLS[entry.url],
        STATUSES[entry.status],
        entry.bytes,
        i
    );
    let parsed = parser::parse(&raw).unwrap();
    let enriched = EnrichedFields {
        geo: GeoInfo::default(),
        ua: UserAgentInfo {
            browser_family: format!("agent-{}", i % 3),
            ..UserAgentInfo::default()
        },
    };
    LogRecord::new(raw, parsed, enriched)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn groups_partition_every_record(entries in prop::collection::vec(entry_strategy(), 1..60)) {
        let store = RecordStore::open_in_memory().unwrap();
        let records = entries.iter().enumerate().map(|(i, e)| to_record(i, e)).collect::<Vec<_>>();
        prop_assert_eq!(store.insert_batch(&records).unwrap(), records.len());

        let engine = QueryEngine::new(store);
        let total = records.len() as u64;
        let byte_total: i64 = records.iter().map(|r| r.bytes).sum();

        for field in Field::aggregatable() {
            let counts = engine.count_by(field.name(), &Filter::new()).unwrap();
            prop_assert_eq!(counts.iter().map(|g| g.count).sum::<u64>(), total);

            let mut query = BytesQuery::new(field.name());
            query.with_date = true;
            query.length = 1_000;
            let page = engine.bytes_by(&query).unwrap();
            prop_assert_eq!(page.total as usize, page.data.len());
            prop_assert_eq!(page.data.iter().map(|r| r.counts).sum::<u64>(), total);
            prop_assert_eq!(page.data.iter().map(|r| r.bytes).sum::<i64>(), byte_total);
        }
    }
}
