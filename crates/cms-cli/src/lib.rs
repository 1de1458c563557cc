//! Library side of the `cms-etl` binary: logging setup and report rendering.

pub mod logging;
pub mod report;
