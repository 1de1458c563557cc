//! Data model for the CMS RIF to i2b2 observation fact ETL.

pub mod column;
pub mod config;
pub mod error;
pub mod fact;
pub mod upload;

pub use column::{ColumnDescriptor, DeclaredType, SourceColumn, ValueKind};
pub use config::{
    AdminColumns, DEFAULT_CHUNK_SIZE, DEFAULT_CODE_MAX_LEN, EtlSettings, ProjectConfig,
    SourceSettings, StarSettings, TableSpec,
};
pub use error::{ModelError, Result};
pub use fact::{
    AdminStamp, FactTableTemplate, MappedFact, NO_PROVIDER, Observation, SourceFact, SqlType,
    TemplateColumn,
};
pub use upload::{BeneRange, JobGroup, NewUpload, UploadRecord, UploadStatus};
