//! Chunked reading of one RIF table restricted to a bene_id range.
//!
//! # Usage
//!
//! ```ignore
//! use cms_ingest::{ChunkReader, ReadOptions};
//!
//! let options = ReadOptions::default().with_chunk_size(50_000).with_bene_qty(Some(1200));
//! let reader = ChunkReader::open(&store, table, "bene_id", range, options)?;
//! for chunk in reader {
//!     let chunk = chunk?;
//!     println!("{}", chunk.progress.message());
//! }
//! ```

use std::collections::HashSet;

use polars::prelude::DataFrame;
use tracing::debug;

use cms_common::any_to_string;
use cms_model::{BeneRange, DEFAULT_CHUNK_SIZE, SourceColumn};
use cms_store::{QualifiedTable, RangeScan, SourceStore};

use crate::error::{IngestError, Result};
use crate::progress::ChunkProgress;

/// Options for chunked reads.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadOptions {
    /// Maximum rows per chunk.
    /// Defaults to 100000.
    pub chunk_size: usize,

    /// Log the store's query plan before the first chunk.
    pub log_plan: bool,

    /// Expected distinct bene_ids, for the progress percentage.
    pub bene_qty: Option<u64>,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            log_plan: false,
            bene_qty: None,
        }
    }
}

impl ReadOptions {
    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size.max(1);
        self
    }

    pub fn with_log_plan(mut self, enabled: bool) -> Self {
        self.log_plan = enabled;
        self
    }

    pub fn with_bene_qty(mut self, qty: Option<u64>) -> Self {
        self.bene_qty = qty;
        self
    }
}

/// One chunk of source rows and the read statistics after it.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub data: DataFrame,
    /// Rows read before this chunk; the job-wide index of its first row.
    pub row_offset: usize,
    pub progress: ChunkProgress,
}

/// Lazy, forward-only sequence of chunks.
///
/// Yields `None` once the range is exhausted, and nothing more after an
/// error.
pub struct ChunkReader<'s, S: SourceStore + ?Sized> {
    store: &'s S,
    scan: RangeScan,
    columns: Vec<SourceColumn>,
    bene_id_column: String,
    options: ReadOptions,
    rows_read: usize,
    bene_seen: HashSet<String>,
    planned: bool,
    done: bool,
}

impl<'s, S: SourceStore + ?Sized> ChunkReader<'s, S> {
    /// Reads the table's columns and prepares a scan of `range`.
    pub fn open(
        store: &'s S,
        table: QualifiedTable,
        bene_id_column: &str,
        range: BeneRange,
        options: ReadOptions,
    ) -> Result<Self> {
        let columns = store.table_columns(&table)?;
        let bene_id_column = columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(bene_id_column))
            .map(|c| c.name.clone())
            .ok_or_else(|| IngestError::MissingColumn {
                table: table.to_string(),
                column: bene_id_column.to_string(),
            })?;
        Ok(Self {
            store,
            scan: RangeScan::new(table, bene_id_column.clone(), range),
            columns,
            bene_id_column,
            options,
            rows_read: 0,
            bene_seen: HashSet::new(),
            planned: false,
            done: false,
        })
    }

    /// Source columns in table order.
    pub fn columns(&self) -> &[SourceColumn] {
        &self.columns
    }

    pub fn table(&self) -> &QualifiedTable {
        &self.scan.table
    }

    pub fn rows_read(&self) -> usize {
        self.rows_read
    }

    fn log_plan(&mut self) -> Result<()> {
        self.planned = true;
        if !self.options.log_plan {
            return Ok(());
        }
        for line in self.store.explain_scan(&self.scan, &self.columns)? {
            debug!(table = %self.scan.table, plan = %line, "query plan");
        }
        Ok(())
    }

    fn read_next(&mut self) -> Result<Option<Chunk>> {
        if !self.planned {
            self.log_plan()?;
        }
        let Some(data) =
            self.store
                .next_chunk(&mut self.scan, &self.columns, self.options.chunk_size)?
        else {
            return Ok(None);
        };

        let bene_ids = data.column(&self.bene_id_column)?;
        for row in 0..bene_ids.len() {
            let Some(bene_id) = any_to_string(bene_ids.get(row)?) else {
                continue;
            };
            let bene_id = bene_id.trim();
            if !bene_id.is_empty() && !self.bene_seen.contains(bene_id) {
                self.bene_seen.insert(bene_id.to_string());
            }
        }

        let row_offset = self.rows_read;
        self.rows_read += data.height();
        let progress = ChunkProgress {
            rows_in: data.height(),
            subtot_in: self.rows_read,
            bene_subtot: self.bene_seen.len(),
            bene_qty: self.options.bene_qty,
        };
        Ok(Some(Chunk {
            data,
            row_offset,
            progress,
        }))
    }
}

impl<S: SourceStore + ?Sized> Iterator for ChunkReader<'_, S> {
    type Item = Result<Chunk>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.read_next() {
            Ok(Some(chunk)) => Some(Ok(chunk)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}
