use polars::prelude::PolarsError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("invalid column pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("{passes} reshape passes per row exceed the instance number limit of {limit}")]
    TooManyPasses { passes: usize, limit: i64 },

    #[error("source chunk has no column {0}")]
    MissingColumn(String),

    #[error("fact frame does not fit the fact table template: {column}: {message}")]
    SchemaMismatch { column: String, message: String },

    #[error("polars error: {0}")]
    Polars(#[from] PolarsError),
}

pub type Result<T> = std::result::Result<T, TransformError>;
