//! Upload job identity and status records.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::{ModelError, Result};

/// Inclusive bene_id range assigned to one job by the partitioner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeneRange {
    pub first: i64,
    pub last: i64,
}

impl BeneRange {
    pub fn new(first: i64, last: i64) -> Result<Self> {
        if first > last {
            return Err(ModelError::InvalidRange { first, last });
        }
        Ok(Self { first, last })
    }

    pub fn contains(&self, bene_id: i64) -> bool {
        (self.first..=self.last).contains(&bene_id)
    }
}

/// Where a job sits among its siblings; informational only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct JobGroup {
    /// Expected distinct bene_ids in the range, if surveyed.
    pub bene_qty: Option<u64>,
    pub group_num: Option<u32>,
    pub group_qty: Option<u32>,
}

/// Lifecycle of an upload job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Created,
    Running,
    Completed,
    Failed,
}

impl UploadStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UploadStatus {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "created" => Ok(Self::Created),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(ModelError::UnknownStatus(other.to_string())),
        }
    }
}

/// Fields supplied when an upload status row is inserted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUpload {
    pub upload_label: String,
    pub user_id: String,
    pub source_cd: String,
    pub transform_name: String,
}

/// One row of the upload status table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadRecord {
    pub upload_id: i64,
    pub upload_label: String,
    pub user_id: String,
    pub source_cd: String,
    pub load_date: Option<NaiveDateTime>,
    pub transform_name: String,
    pub loaded_record: Option<i64>,
    pub message: Option<String>,
    pub load_status: UploadStatus,
}
