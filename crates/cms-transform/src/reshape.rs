//! Wide-to-long reshaping of one chunk.

use polars::prelude::DataFrame;
use tracing::{debug, warn};

use cms_model::{AdminColumns, ColumnDescriptor};

use crate::buffer::FactBuffer;
use crate::diagnosis::DiagnosisStacker;
use crate::error::Result;
use crate::keys::row_keys;
use crate::pivot::ValuePivoter;

/// Label of the diagnosis pass in a [`FactBuffer`].
pub const DX_PASS: &str = "diagnoses";

/// Stacker and pivoter configured once per job.
#[derive(Debug, Clone)]
pub struct ChunkReshaper {
    admin: AdminColumns,
    stacker: DiagnosisStacker,
    pivoter: ValuePivoter,
}

impl ChunkReshaper {
    pub fn new(
        descriptors: &[ColumnDescriptor],
        table_name: &str,
        admin: AdminColumns,
    ) -> Result<Self> {
        Ok(Self {
            admin,
            stacker: DiagnosisStacker::new(descriptors, table_name)?,
            pivoter: ValuePivoter::new(descriptors, table_name),
        })
    }

    pub fn stacker(&self) -> &DiagnosisStacker {
        &self.stacker
    }

    pub fn pivoter(&self) -> &ValuePivoter {
        &self.pivoter
    }

    /// Stacks diagnoses, then pivots each present value kind.
    ///
    /// Facts left without a start date are dropped and counted in the buffer.
    ///
    /// `row_offset` is the number of rows the job consumed before this chunk.
    pub fn reshape(&self, chunk: &DataFrame, row_offset: usize) -> Result<FactBuffer> {
        let keys = row_keys(chunk, &self.admin)?;
        let mut buffer = FactBuffer::new();

        buffer.push_pass(DX_PASS, self.stacker.stack(chunk, &keys, row_offset)?);
        for kind in self.pivoter.kinds() {
            buffer.push_pass(kind.as_str(), self.pivoter.pivot(kind, chunk, &keys, row_offset)?);
        }
        if buffer.undated() > 0 {
            warn!(
                undated = buffer.undated(),
                sample_bene_id = buffer.undated_sample().unwrap_or_default(),
                start_date_column = %self.admin.start_date,
                "facts dropped for rows with no start date"
            );
        }
        debug!(rows = chunk.height(), facts = buffer.len(), "reshaped chunk");
        Ok(buffer)
    }
}
