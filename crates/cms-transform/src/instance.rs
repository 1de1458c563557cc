//! Instance numbers.
//!
//! Every fact from one source row gets `row * 10^SPARE_DIGITS + pass`, where
//! `pass` is the diagnosis group index (the pivoter always uses pass 0). Rows
//! are numbered across the whole job, not per chunk.

use crate::error::{Result, TransformError};

/// Source tables have fewer than 10^3 columns.
pub const SPARE_DIGITS: u32 = 3;

/// Exclusive upper bound on passes per row.
pub const PASS_LIMIT: i64 = 10_i64.pow(SPARE_DIGITS);

pub fn instance_num(row: usize, pass: usize) -> i64 {
    row as i64 * PASS_LIMIT + pass as i64
}

/// Rejects layouts whose pass count would spill into the row digits.
pub fn check_passes(passes: usize) -> Result<()> {
    if passes as i64 >= PASS_LIMIT {
        return Err(TransformError::TooManyPasses {
            passes,
            limit: PASS_LIMIT,
        });
    }
    Ok(())
}
