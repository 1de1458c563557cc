//! Shared utilities for the CMS ETL crates.
//!
//! Polars cell conversions and the date renderings every crate agrees on.

pub mod polars;

pub use self::polars::{
    any_to_date, any_to_datetime, any_to_f64, any_to_string, date_from_epoch_days, epoch_days,
    epoch_millis, format_date, format_numeric, parse_date, parse_datetime, parse_f64,
};
