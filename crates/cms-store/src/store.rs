//! Store contracts used by the ETL.
//!
//! Every method takes `&self`: one job owns one connection and calls into it
//! strictly sequentially, so a scan position can stay alive across appends
//! without a mutable borrow of the store.

use std::fmt;

use chrono::NaiveDateTime;
use polars::prelude::DataFrame;

use cms_model::{
    BeneRange, FactTableTemplate, NewUpload, SourceColumn, UploadRecord, UploadStatus,
};

use crate::error::Result;

/// A schema-qualified table name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QualifiedTable {
    pub schema: String,
    pub name: String,
}

impl QualifiedTable {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for QualifiedTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

/// Position of a bene_id range scan over one source table.
///
/// Scans only move forward; once `exhausted` is set the scan yields nothing.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeScan {
    pub table: QualifiedTable,
    pub bene_id_column: String,
    pub range: BeneRange,
    /// Store-specific resume key of the last row returned.
    pub position: Option<i64>,
    pub exhausted: bool,
}

impl RangeScan {
    pub fn new(table: QualifiedTable, bene_id_column: impl Into<String>, range: BeneRange) -> Self {
        Self {
            table,
            bene_id_column: bene_id_column.into(),
            range,
            position: None,
            exhausted: false,
        }
    }
}

/// One `(source id, warehouse id)` pair from a mapping table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityRow {
    pub source_id: String,
    pub warehouse_id: i64,
}

/// Read side of the source (RIF) schema.
pub trait SourceStore {
    /// Column names and declared types, in table order.
    fn table_columns(&self, table: &QualifiedTable) -> Result<Vec<SourceColumn>>;

    /// Human-readable plan of the scan query, one line per plan step.
    fn explain_scan(&self, scan: &RangeScan, columns: &[SourceColumn]) -> Result<Vec<String>>;

    /// Next batch of at most `limit` rows, or `None` when the scan is done.
    fn next_chunk(
        &self,
        scan: &mut RangeScan,
        columns: &[SourceColumn],
        limit: usize,
    ) -> Result<Option<DataFrame>>;
}

/// Range-bounded lookups against the identity mapping tables.
///
/// Bounds are compared with the store's ordering of the text identifiers.
pub trait IdentityStore {
    fn patient_mapping(
        &self,
        ide_source: &str,
        bene_id_first: &str,
        bene_id_last: &str,
    ) -> Result<Vec<IdentityRow>>;

    fn encounter_mapping(
        &self,
        ide_source: &str,
        bene_id_first: &str,
        bene_id_last: &str,
    ) -> Result<Vec<IdentityRow>>;
}

/// Write side of the per-upload fact tables.
pub trait FactStore {
    /// The store's clock, so facts are stamped consistently with the store.
    fn current_timestamp(&self) -> Result<NaiveDateTime>;

    fn create_fact_table(&self, table: &QualifiedTable, template: &FactTableTemplate)
    -> Result<()>;

    /// Appends every row of `frame` in one transaction; returns the row count.
    fn append_frame(&self, table: &QualifiedTable, frame: &DataFrame) -> Result<usize>;

    fn row_count(&self, table: &QualifiedTable) -> Result<usize>;
}

/// The upload status table.
pub trait StatusStore {
    /// Inserts a `created` row and returns the store-assigned upload id.
    fn insert_upload(&self, upload: &NewUpload) -> Result<i64>;

    /// Overwrites the loaded record count and message.
    fn update_progress(&self, upload_id: i64, loaded_record: i64, message: &str) -> Result<()>;

    fn set_status(
        &self,
        upload_id: i64,
        status: UploadStatus,
        message: Option<&str>,
    ) -> Result<()>;

    fn upload(&self, upload_id: i64) -> Result<Option<UploadRecord>>;
}

/// Everything one upload job needs from its connection.
pub trait Store: SourceStore + IdentityStore + FactStore + StatusStore {}

impl<T> Store for T where T: SourceStore + IdentityStore + FactStore + StatusStore {}
