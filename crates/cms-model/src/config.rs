//! Project configuration types.
//!
//! Loading and validation live in `cms-core`; these are plain serde types so
//! every crate can take the parts it needs without pulling in I/O.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::fact::FactTableTemplate;

/// Default number of source rows per chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 100_000;

/// Strings longer than this are text; shorter ones are codes.
pub const DEFAULT_CODE_MAX_LEN: usize = 7;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Path of the SQLite database holding the star schema.
    pub database: PathBuf,
    /// Additional databases to `ATTACH`, keyed by schema alias.
    #[serde(default)]
    pub attach: BTreeMap<String, PathBuf>,
    pub source: SourceSettings,
    #[serde(default)]
    pub star: StarSettings,
    #[serde(default)]
    pub etl: EtlSettings,
    #[serde(default)]
    pub fact_template: FactTableTemplate,
    #[serde(default)]
    pub tables: Vec<TableSpec>,
}

impl ProjectConfig {
    pub fn table(&self, name: &str) -> Option<&TableSpec> {
        self.tables.iter().find(|t| t.name.eq_ignore_ascii_case(name))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSettings {
    /// Schema holding the RIF tables.
    #[serde(default = "default_schema")]
    pub schema: String,
    /// `sourcesystem_cd` stamped on every fact, e.g. `ccwdata.org`.
    pub source_cd: String,
    pub download_date: Option<NaiveDate>,
}

impl SourceSettings {
    /// Source tag for patient or encounter mapping rows, e.g. `ccwdata.org(BENE_ID)`.
    pub fn ide_source(&self, key_cols: &str) -> String {
        format!("{}{key_cols}", self.source_cd)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StarSettings {
    #[serde(default = "default_schema")]
    pub schema: String,
    #[serde(default = "default_upload_table")]
    pub upload_table: String,
    #[serde(default = "default_patient_mapping")]
    pub patient_mapping: String,
    #[serde(default = "default_encounter_mapping")]
    pub encounter_mapping: String,
}

impl Default for StarSettings {
    fn default() -> Self {
        Self {
            schema: default_schema(),
            upload_table: default_upload_table(),
            patient_mapping: default_patient_mapping(),
            encounter_mapping: default_encounter_mapping(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EtlSettings {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_code_max_len")]
    pub code_max_len: usize,
    #[serde(default = "default_dx_pattern")]
    pub dx_pattern: String,
    #[serde(default = "default_px_pattern")]
    pub px_pattern: String,
    /// Log the source query plan before the first chunk.
    #[serde(default)]
    pub log_plan: bool,
}

impl Default for EtlSettings {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            code_max_len: default_code_max_len(),
            dx_pattern: default_dx_pattern(),
            px_pattern: default_px_pattern(),
            log_plan: false,
        }
    }
}

/// Source columns that feed the identity and date channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminColumns {
    #[serde(default = "default_bene_id")]
    pub bene_id: String,
    #[serde(default = "default_start_date")]
    pub start_date: String,
    #[serde(default = "default_end_date")]
    pub end_date: String,
    #[serde(default = "default_update_date")]
    pub update_date: String,
    /// Claim column carrying the encounter identifier, when the table has one.
    #[serde(default)]
    pub encounter: Option<String>,
    #[serde(default)]
    pub provider: Option<String>,
}

impl Default for AdminColumns {
    fn default() -> Self {
        Self {
            bene_id: default_bene_id(),
            start_date: default_start_date(),
            end_date: default_end_date(),
            update_date: default_update_date(),
            encounter: None,
            provider: None,
        }
    }
}

impl AdminColumns {
    /// Columns excluded from value classification.
    pub fn is_mapped(&self, column: &str) -> bool {
        [
            &self.bene_id,
            &self.start_date,
            &self.end_date,
            &self.update_date,
        ]
        .iter()
        .any(|c| c.eq_ignore_ascii_case(column))
    }
}

/// One RIF table the ETL knows how to load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSpec {
    pub name: String,
    pub transform_name: String,
    #[serde(flatten)]
    pub admin: AdminColumns,
}

fn default_schema() -> String {
    "main".to_string()
}

fn default_upload_table() -> String {
    "upload_status".to_string()
}

fn default_patient_mapping() -> String {
    "patient_mapping".to_string()
}

fn default_encounter_mapping() -> String {
    "encounter_mapping".to_string()
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_code_max_len() -> usize {
    DEFAULT_CODE_MAX_LEN
}

fn default_dx_pattern() -> String {
    "(_dgns_|rsn_visit)".to_string()
}

fn default_px_pattern() -> String {
    "prcdr_".to_string()
}

fn default_bene_id() -> String {
    "bene_id".to_string()
}

fn default_start_date() -> String {
    "clm_from_dt".to_string()
}

fn default_end_date() -> String {
    "clm_thru_dt".to_string()
}

fn default_update_date() -> String {
    "nch_wkly_proc_dt".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_fills_defaults() {
        let text = r#"
            database = "etl.db"

            [source]
            source_cd = "ccwdata.org"

            [[tables]]
            name = "outpatient_base_claims"
            transform_name = "OutpatientClaimUpload"
            provider = "at_physn_npi"
        "#;
        let config: ProjectConfig = toml::from_str(text).expect("parse config");
        assert_eq!(config.etl.chunk_size, DEFAULT_CHUNK_SIZE);
        assert_eq!(config.source.schema, "main");
        assert_eq!(config.fact_template, FactTableTemplate::i2b2());

        let table = config.table("OUTPATIENT_BASE_CLAIMS").expect("table");
        assert_eq!(table.admin.bene_id, "bene_id");
        assert_eq!(table.admin.provider.as_deref(), Some("at_physn_npi"));
        assert!(table.admin.is_mapped("CLM_FROM_DT"));
        assert!(!table.admin.is_mapped("at_physn_npi"));
    }

    #[test]
    fn ide_source_appends_key_columns() {
        let source = SourceSettings {
            schema: "main".to_string(),
            source_cd: "ccwdata.org".to_string(),
            download_date: None,
        };
        assert_eq!(source.ide_source("(BENE_ID)"), "ccwdata.org(BENE_ID)");
    }
}
