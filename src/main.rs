use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use logtally::config::LogtallyConfig;
use logtally::filter::Condition;
use logtally::query::{BytesQuery, ListQuery, SORT_BY_BYTES};
use logtally::{Field, Filter, QueryEngine};

#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
#[clap(propagate_version = true)]
struct Cli {
    /// configuration file path, by default ./logtally.toml is used when present
    #[clap(short, long)]
    config: Option<String>,

    /// Print debug information
    #[clap(long)]
    debug: bool,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct Paging {
    /// 1-based page number
    #[clap(long, default_value_t = 1)]
    start: u64,

    /// Page size
    #[clap(long, default_value_t = 10)]
    length: u64,

    /// Sort ascending instead of descending
    #[clap(long)]
    asc: bool,
}

#[derive(Args, Debug)]
struct Filters {
    /// Condition of the form field<op>value, op one of = != < <= > >=; repeatable
    #[clap(short, long = "filter")]
    filters: Vec<Condition>,
}

impl Filters {
    fn into_filter(self) -> Filter {
        self.filters.into_iter().collect()
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest an access log
    Update {
        /// Log file, by default the configured access_log
        path: Option<String>,
    },

    /// List field names
    Fields {
        /// Only fields that can be grouped by
        #[clap(long)]
        group_by: bool,
    },

    /// List records
    Query {
        #[clap(long, default_value = "time")]
        sort_by: String,

        #[clap(flatten)]
        paging: Paging,

        #[clap(flatten)]
        filters: Filters,
    },

    /// Count records per distinct value of a field
    Count {
        #[clap(long)]
        by: String,

        #[clap(flatten)]
        filters: Filters,
    },

    /// Sum bytes and count records per group
    Bytes {
        #[clap(long)]
        by: String,

        /// Also group by date
        #[clap(long)]
        with_date: bool,

        /// bytes, counts or a field name
        #[clap(long, default_value = SORT_BY_BYTES)]
        sort_by: String,

        #[clap(flatten)]
        paging: Paging,

        #[clap(flatten)]
        filters: Filters,
    },
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = LogtallyConfig::new(cli.config.as_deref())?;

    match cli.command {
        Commands::Update { path } => {
            let pipeline = config.pipeline()?;
            let path = path.unwrap_or_else(|| config.access_log.clone());
            let result = pipeline.ingest(&path)?;
            print_json(&result)?;
        }
        Commands::Fields { group_by } => {
            let fields = if group_by {
                Field::aggregatable().map(Field::name).collect::<Vec<_>>()
            } else {
                Field::all().map(Field::name).collect::<Vec<_>>()
            };
            print_json(&fields)?;
        }
        Commands::Query {
            sort_by,
            paging,
            filters,
        } => {
            let engine = QueryEngine::new(config.open_store()?);
            let page = engine.list(&ListQuery {
                sort_by,
                desc: !paging.asc,
                start: paging.start,
                length: paging.length,
                filter: filters.into_filter(),
            })?;
            print_json(&page)?;
        }
        Commands::Count { by, filters } => {
            let engine = QueryEngine::new(config.open_store()?);
            let counts = engine.count_by(&by, &filters.into_filter())?;
            print_json(&counts)?;
        }
        Commands::Bytes {
            by,
            with_date,
            sort_by,
            paging,
            filters,
        } => {
            let engine = QueryEngine::new(config.open_store()?);
            let page = engine.bytes_by(&BytesQuery {
                by,
                with_date,
                sort_by,
                desc: !paging.asc,
                start: paging.start,
                length: paging.length,
                filter: filters.into_filter(),
            })?;
            print_json(&page)?;
        }
    }

    Ok(())
}
