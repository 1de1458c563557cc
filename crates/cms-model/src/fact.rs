//! Long-format observation facts and the fact table template.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::column::ValueKind;

/// Placeholder `provider_id` for facts with no known provider.
pub const NO_PROVIDER: &str = "@";

/// One observation before identity mapping and administrative tagging.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub concept_cd: String,
    pub modifier_cd: String,
    pub instance_num: i64,
    pub valtype: ValueKind,
    pub nval_num: Option<f64>,
    pub tval_char: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub update_date: Option<NaiveDate>,
    pub provider_id: String,
}

/// An observation still keyed by source identifiers.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceFact {
    pub bene_id: String,
    pub medpar_id: Option<String>,
    pub obs: Observation,
}

/// An observation keyed by warehouse identifiers.
#[derive(Debug, Clone, PartialEq)]
pub struct MappedFact {
    pub patient_num: i64,
    pub encounter_num: i64,
    pub obs: Observation,
}

/// Administrative columns shared by every fact of one chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct AdminStamp {
    pub sourcesystem_cd: String,
    pub download_date: Option<NaiveDate>,
    pub upload_id: i64,
    pub import_date: NaiveDateTime,
}

/// Storage type of a fact table column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SqlType {
    Integer,
    Float,
    Text,
    Date,
    Timestamp,
    Blob,
}

impl SqlType {
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Integer => "INTEGER",
            Self::Float => "NUMERIC",
            Self::Text => "VARCHAR",
            Self::Date => "DATE",
            Self::Timestamp => "TIMESTAMP",
            Self::Blob => "BLOB",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateColumn {
    pub name: String,
    pub sql_type: SqlType,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
}

fn default_nullable() -> bool {
    true
}

impl TemplateColumn {
    fn new(name: &str, sql_type: SqlType, nullable: bool) -> Self {
        Self {
            name: name.to_string(),
            sql_type,
            nullable,
        }
    }
}

/// Column set cloned into every per-upload fact table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactTableTemplate {
    pub columns: Vec<TemplateColumn>,
}

impl Default for FactTableTemplate {
    fn default() -> Self {
        Self::i2b2()
    }
}

impl FactTableTemplate {
    /// The i2b2 `observation_fact` columns.
    pub fn i2b2() -> Self {
        use SqlType::{Blob, Date, Float, Integer, Text, Timestamp};
        Self {
            columns: vec![
                TemplateColumn::new("encounter_num", Integer, false),
                TemplateColumn::new("patient_num", Integer, false),
                TemplateColumn::new("concept_cd", Text, false),
                TemplateColumn::new("provider_id", Text, false),
                TemplateColumn::new("start_date", Date, false),
                TemplateColumn::new("modifier_cd", Text, false),
                TemplateColumn::new("instance_num", Integer, false),
                TemplateColumn::new("valtype_cd", Text, true),
                TemplateColumn::new("tval_char", Text, true),
                TemplateColumn::new("nval_num", Float, true),
                TemplateColumn::new("valueflag_cd", Text, true),
                TemplateColumn::new("quantity_num", Float, true),
                TemplateColumn::new("units_cd", Text, true),
                TemplateColumn::new("end_date", Date, true),
                TemplateColumn::new("location_cd", Text, true),
                TemplateColumn::new("observation_blob", Blob, true),
                TemplateColumn::new("confidence_num", Float, true),
                TemplateColumn::new("update_date", Date, true),
                TemplateColumn::new("download_date", Date, true),
                TemplateColumn::new("import_date", Timestamp, true),
                TemplateColumn::new("sourcesystem_cd", Text, true),
                TemplateColumn::new("upload_id", Integer, true),
                TemplateColumn::new("text_search_index", Integer, true),
            ],
        }
    }

    pub fn column(&self, name: &str) -> Option<&TemplateColumn> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Name of the fact table owned by one upload.
    pub fn table_name(upload_id: i64) -> String {
        format!("observation_fact_{upload_id}")
    }
}
