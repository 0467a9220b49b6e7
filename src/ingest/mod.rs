//! Reads an access log and stores every new, parseable, resolvable line.

mod dedup;

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use crossbeam_channel::Sender;
use derive_more::{Display, From};
use itertools::Itertools;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

pub use dedup::{Admission, DedupGate};

use crate::enrichment::{Enricher, EnrichmentError};
use crate::models::LogRecord;
use crate::parser::{self, ParseError};
use crate::utils::ParallelSendErrorsExt;
use crate::{Error, RecordStore};

/// Lines read before each dedup / enrich / store round.
pub const DEFAULT_READ_CHUNK_LINES: usize = 10_000;

/// Why a single line was not stored. Never fatal to a run.
#[derive(Debug, Display, From)]
pub enum LineSkip {
    #[display(fmt = "{}", _0)]
    NoMatch(ParseError),
    #[display(fmt = "{}", _0)]
    Enrichment(EnrichmentError),
}

/// Outcomes reported while a run is in progress.
#[derive(Debug)]
pub enum Msg {
    Stored(usize),
    Duplicate(usize),
    /// A skipped line and how many identical copies shared its fate
    Skipped(LineSkip, usize),
}

impl From<(LineSkip, usize)> for Msg {
    fn from((skip, copies): (LineSkip, usize)) -> Self {
        Msg::Skipped(skip, copies)
    }
}

/// Per-run summary; every non-blank line lands in exactly one counter.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IngestionResult {
    pub accepted: u64,
    pub skipped_duplicate: u64,
    pub skipped_no_match: u64,
    pub skipped_enrichment_error: u64,
}

impl IngestionResult {
    pub fn lines(&self) -> u64 {
        self.accepted
            + self.skipped_duplicate
            + self.skipped_no_match
            + self.skipped_enrichment_error
    }
}

impl Extend<Msg> for IngestionResult {
    fn extend<T: IntoIterator<Item = Msg>>(&mut self, iter: T) {
        for msg in iter {
            match msg {
                Msg::Stored(n) => self.accepted += n as u64,
                Msg::Duplicate(n) => self.skipped_duplicate += n as u64,
                Msg::Skipped(LineSkip::NoMatch(e), n) => {
                    debug!("skipped: {}", e);
                    self.skipped_no_match += n as u64;
                }
                Msg::Skipped(LineSkip::Enrichment(e), n) => {
                    warn!("skipped: {}", e);
                    self.skipped_enrichment_error += n as u64;
                }
            }
        }
    }
}

pub struct IngestionPipeline {
    store: RecordStore,
    enricher: Enricher,
    read_chunk_lines: usize,
}

impl IngestionPipeline {
    pub fn new(store: RecordStore, enricher: Enricher) -> Self {
        IngestionPipeline {
            store,
            enricher,
            read_chunk_lines: DEFAULT_READ_CHUNK_LINES,
        }
    }

    pub fn with_read_chunk_lines(mut self, lines: usize) -> Self {
        self.read_chunk_lines = lines.max(1);
        self
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    /// Ingests a whole log file. Only failing to read the file or to write
    /// the store aborts the run.
    pub fn ingest(&self, path: impl AsRef<Path>) -> Result<IngestionResult, Error> {
        let path = path.as_ref();
        let source = path.display().to_string();
        let file = File::open(path).map_err(|e| Error::FileAccess {
            path: source.clone(),
            source: e,
        })?;

        info!("ingesting {}", source);
        let result = self.ingest_lines(&source, BufReader::new(file))?;
        info!(
            accepted = result.accepted,
            duplicate = result.skipped_duplicate,
            no_match = result.skipped_no_match,
            enrichment_error = result.skipped_enrichment_error,
            "finished {}",
            source
        );
        Ok(result)
    }

    pub fn ingest_reader(&self, reader: impl BufRead) -> Result<IngestionResult, Error> {
        self.ingest_lines("<reader>", reader)
    }

    fn ingest_lines(&self, source: &str, reader: impl BufRead) -> Result<IngestionResult, Error> {
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut result = IngestionResult::default();

        for chunk in &reader.lines().chunks(self.read_chunk_lines) {
            let mut lines = Vec::with_capacity(self.read_chunk_lines);
            for line in chunk {
                match line {
                    Ok(line) => {
                        let trimmed = line.trim();
                        if !trimmed.is_empty() {
                            lines.push(trimmed.to_owned());
                        }
                    }
                    Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                        let skip = LineSkip::NoMatch(ParseError::new("<invalid UTF-8>"));
                        let _ = tx.send(Msg::Skipped(skip, 1));
                    }
                    Err(e) => {
                        return Err(Error::FileAccess {
                            path: source.to_owned(),
                            source: e,
                        })
                    }
                }
            }

            self.ingest_chunk(lines, &tx)?;
            result.extend(rx.try_iter());
            info!("{} lines processed from {}", result.lines(), source);
        }

        Ok(result)
    }

    fn ingest_chunk(&self, lines: Vec<String>, tx: &Sender<Msg>) -> Result<(), Error> {
        if lines.is_empty() {
            return Ok(());
        }

        let Admission { fresh, duplicates } = DedupGate::new(&self.store).admit(lines)?;

        let built = fresh
            .into_par_iter()
            .map(|(line, copies)| {
                self.build_record(line)
                    .map(|record| (record, copies))
                    .map_err(|skip| (skip, copies))
            })
            .send_errors(tx)
            .collect::<Vec<_>>();
        // Copies of a line that produced a record are duplicates of it.
        let repeats = built.iter().map(|(_, copies)| copies - 1).sum::<usize>();
        let records = built.into_iter().map(|(record, _)| record).collect::<Vec<_>>();

        let stored = self.store.insert_batch(&records)?;
        // Records can still collide with a concurrent writer at insert time.
        let _ = tx.send(Msg::Duplicate(duplicates + repeats + records.len() - stored));
        let _ = tx.send(Msg::Stored(stored));
        Ok(())
    }

    fn build_record(&self, line: String) -> Result<LogRecord, LineSkip> {
        let parsed = parser::parse(&line)?;
        let enriched = self.enricher.enrich(&parsed.ip, &parsed.user_agent)?;
        Ok(LogRecord::new(line, parsed, enriched))
    }
}
