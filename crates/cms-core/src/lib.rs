//! Upload jobs for the CMS RIF to i2b2 fact ETL.
//!
//! [`CmsRifUpload`] drives one table and bene_id range through the reader,
//! reshaper, mapper and store while [`UploadTracker`] keeps the upload
//! status row in step with what has been committed.

pub mod config;
pub mod error;
pub mod pipeline;
pub mod step;
pub mod tracker;

pub use config::{load_config, validate_config};
pub use error::{ConfigError, EtlError, Result};
pub use pipeline::{CmsRifUpload, UploadOutcome, describe_columns, open_store};
pub use step::{EventLog, Step, StepOutcome, StepRecord};
pub use tracker::UploadTracker;
