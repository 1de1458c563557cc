use cms_model::ModelError;
use polars::prelude::PolarsError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("polars error: {0}")]
    Polars(#[from] PolarsError),

    #[error("table not found: {0}")]
    MissingTable(String),

    #[error("schema mismatch for {table}: {message}")]
    SchemaMismatch { table: String, message: String },

    #[error("invalid value in column {column}: {value}")]
    InvalidValue { column: String, value: String },

    #[error(transparent)]
    Model(#[from] ModelError),
}

impl StoreError {
    pub(crate) fn invalid(column: &str, value: impl Into<String>) -> Self {
        Self::InvalidValue {
            column: column.to_string(),
            value: value.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
