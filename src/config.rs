use std::path::Path;

use anyhow::{anyhow, Result};
use config::Config;
use serde::Deserialize;
use tracing::info;

use crate::db::{RecordStore, DEFAULT_BATCH_SIZE};
use crate::enrichment::{build_ua_engine, Enricher, MaxMindGeoLookup, NullGeoLookup, UaEngineKind};
use crate::ingest::{IngestionPipeline, DEFAULT_READ_CHUNK_LINES};

const DEFAULT_CONFIG_FILE: &str = "logtally.toml";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LogtallyConfig {
    /// SQLite database file
    pub db_path: String,

    /// Log ingested by `update` when no path is given
    pub access_log: String,

    /// MaxMind City database; without it every address gets an empty
    /// country and the unknown city
    pub geoip_db: Option<String>,

    pub ua_engine: UaEngineKind,

    /// ua-parser `regexes.yaml`, required by the `uaparser` engine
    pub ua_regexes: Option<String>,

    /// Records per insert transaction
    pub batch_size: usize,

    /// Lines read per ingestion round
    pub read_chunk_lines: usize,
}

impl Default for LogtallyConfig {
    fn default() -> Self {
        LogtallyConfig {
            db_path: "logtally.db".to_owned(),
            access_log: "access.log".to_owned(),
            geoip_db: None,
            ua_engine: UaEngineKind::default(),
            ua_regexes: None,
            batch_size: DEFAULT_BATCH_SIZE,
            read_chunk_lines: DEFAULT_READ_CHUNK_LINES,
        }
    }
}

impl LogtallyConfig {
    /// Loads `path` (or `./logtally.toml` when it exists) overlaid with
    /// `LOGTALLY_*` environment variables.
    pub fn new(path: Option<&str>) -> Result<LogtallyConfig> {
        let _ = dotenvy::dotenv();

        let mut builder = Config::builder();
        match path {
            Some(p) => {
                if !Path::new(p).exists() {
                    return Err(anyhow!("Config file {} does not exist", p));
                }
                builder = builder.add_source(config::File::with_name(p));
            }
            None => {
                if Path::new(DEFAULT_CONFIG_FILE).exists() {
                    builder = builder.add_source(config::File::with_name(DEFAULT_CONFIG_FILE));
                }
            }
        }

        // E.g. `LOGTALLY_DB_PATH=/tmp/logs.db logtally update`
        builder = builder.add_source(config::Environment::with_prefix("LOGTALLY").try_parsing(true));

        builder
            .build()
            .map_err(|e| anyhow!("Failed to build configuration: {}", e))?
            .try_deserialize::<LogtallyConfig>()
            .map_err(|e| anyhow!("Failed to deserialize configuration: {}", e))
    }

    pub fn open_store(&self) -> Result<RecordStore> {
        let store = RecordStore::open(&self.db_path)
            .map_err(|e| anyhow!("Unable to open database {}: {}", self.db_path, e))?;
        Ok(store.with_batch_size(self.batch_size))
    }

    pub fn build_enricher(&self) -> Result<Enricher> {
        let ua = build_ua_engine(self.ua_engine, self.ua_regexes.as_deref())?;
        let enricher = match &self.geoip_db {
            Some(path) => {
                info!("using GeoIP database {}", path);
                Enricher::new(MaxMindGeoLookup::open(path)?, ua)
            }
            None => {
                info!("no GeoIP database configured, locations are left unknown");
                Enricher::new(NullGeoLookup, ua)
            }
        };
        Ok(enricher)
    }

    pub fn pipeline(&self) -> Result<IngestionPipeline> {
        Ok(
            IngestionPipeline::new(self.open_store()?, self.build_enricher()?)
                .with_read_chunk_lines(self.read_chunk_lines),
        )
    }
}
