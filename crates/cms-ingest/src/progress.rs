//! Per-chunk read statistics.

use serde::Serialize;

/// Running totals after one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ChunkProgress {
    /// Rows in this chunk.
    pub rows_in: usize,
    /// Rows read so far, this chunk included.
    pub subtot_in: usize,
    /// Distinct bene_ids seen so far.
    pub bene_subtot: usize,
    /// Expected distinct bene_ids in the range, when surveyed.
    pub bene_qty: Option<u64>,
}

impl ChunkProgress {
    /// Percentage of the expected bene_ids seen so far, rounded to 2 places.
    pub fn bene_pct(&self) -> Option<f64> {
        match self.bene_qty {
            Some(qty) if qty > 0 => {
                let pct = 100.0 * self.bene_subtot as f64 / qty as f64;
                Some((pct * 100.0).round() / 100.0)
            }
            _ => None,
        }
    }

    /// Suffix appended to the select step message, e.g.
    /// ` + 2 rows = 5 for 3 (75.00%) of 4 bene_ids`.
    pub fn message(&self) -> String {
        match (self.bene_qty, self.bene_pct()) {
            (Some(qty), Some(pct)) => format!(
                " + {} rows = {} for {} ({pct:.2}%) of {qty} bene_ids",
                self.rows_in, self.subtot_in, self.bene_subtot
            ),
            _ => format!(
                " + {} rows = {} for {} bene_ids",
                self.rows_in, self.subtot_in, self.bene_subtot
            ),
        }
    }
}
