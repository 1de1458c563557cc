use cms_store::StoreError;
use polars::prelude::PolarsError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("polars error: {0}")]
    Polars(#[from] PolarsError),

    #[error("source table {table} has no column {column}")]
    MissingColumn { table: String, column: String },
}

pub type Result<T> = std::result::Result<T, IngestError>;
