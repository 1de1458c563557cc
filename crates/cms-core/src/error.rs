use std::path::PathBuf;

use cms_ingest::IngestError;
use cms_map::MapError;
use cms_model::UploadStatus;
use cms_store::StoreError;
use cms_transform::TransformError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse TOML config {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid config: {message}")]
    Invalid { message: String },
}

impl ConfigError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }
}

/// Errors of one upload job.
///
/// Schema mismatches are lifted out of the lower crates' errors so callers
/// can tell a bad template from an I/O failure.
#[derive(Debug, Error)]
pub enum EtlError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("table {0} is not configured")]
    UnknownTable(String),

    #[error("schema mismatch for {target}: {message}")]
    SchemaMismatch { target: String, message: String },

    #[error("upload {upload_id} cannot go from {from} to {to}")]
    InvalidTransition {
        upload_id: i64,
        from: UploadStatus,
        to: UploadStatus,
    },

    #[error(transparent)]
    Store(StoreError),

    #[error(transparent)]
    Transform(TransformError),

    #[error(transparent)]
    Ingest(IngestError),
}

impl From<StoreError> for EtlError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::SchemaMismatch { table, message } => Self::SchemaMismatch {
                target: table,
                message,
            },
            other => Self::Store(other),
        }
    }
}

impl From<TransformError> for EtlError {
    fn from(err: TransformError) -> Self {
        match err {
            TransformError::SchemaMismatch { column, message } => Self::SchemaMismatch {
                target: format!("fact table template column {column}"),
                message,
            },
            other => Self::Transform(other),
        }
    }
}

impl From<IngestError> for EtlError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::Store(store) => store.into(),
            other => Self::Ingest(other),
        }
    }
}

impl From<MapError> for EtlError {
    fn from(err: MapError) -> Self {
        match err {
            MapError::Store(store) => store.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, EtlError>;
