//! Diagnosis stacking.
//!
//! Diagnosis columns come in groups of a code column optionally followed by
//! its version column (`icd_dgns_cd1`, `icd_dgns_vrsn_cd1`, ...). Each group
//! becomes one pass over the chunk, yielding one coded fact per non-null code.

use polars::prelude::DataFrame;

use cms_model::{ColumnDescriptor, Observation, SourceFact, ValueKind};

use crate::error::{Result, TransformError};
use crate::instance::{check_passes, instance_num};
use crate::keys::{RowKeys, find_column, text_at};

/// Modifier of the first diagnosis group (PCORnet primary diagnosis).
pub const PRIMARY_DX_MODIFIER: &str = "1";

/// Version assumed when a code has no version value.
pub const DEFAULT_DX_VERSION: &str = "9";

const DECIMAL_POS: usize = 3;

/// Modifier for facts attributed to a RIF table, e.g. `CMS_RIF:BCARRIER_CLAIMS`.
pub fn rif_modifier(table_name: &str) -> String {
    format!("CMS_RIF:{}", table_name.to_uppercase())
}

/// Formats an ICD concept code.
///
/// ```
/// use cms_transform::diagnosis::fmt_dx_code;
///
/// assert_eq!(fmt_dx_code(Some("9"), "25000"), "ICD9:250.00");
/// assert_eq!(fmt_dx_code(None, "V5789"), "ICD9:V57.89");
/// assert_eq!(fmt_dx_code(Some("10"), "A09"), "ICD10:A09");
/// ```
pub fn fmt_dx_code(version: Option<&str>, code: &str) -> String {
    let version = version.unwrap_or(DEFAULT_DX_VERSION);
    match code.char_indices().nth(DECIMAL_POS) {
        Some((split, _)) => format!("ICD{version}:{}.{}", &code[..split], &code[split..]),
        None => format!("ICD{version}:{code}"),
    }
}

/// A diagnosis code column and its version column, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DxGroup {
    pub code: String,
    pub version: Option<String>,
}

/// Pairs diagnosis-flagged columns into groups, in declared order.
///
/// A column whose name contains `vrsn` attaches to the preceding code column;
/// an orphan version column is ignored.
pub fn dx_groups(columns: &[ColumnDescriptor]) -> Vec<DxGroup> {
    let mut groups: Vec<DxGroup> = Vec::new();
    for column in columns.iter().filter(|c| c.is_dx) {
        if column.name.to_lowercase().contains("vrsn") {
            if let Some(last) = groups.last_mut().filter(|g| g.version.is_none()) {
                last.version = Some(column.name.clone());
            }
        } else {
            groups.push(DxGroup {
                code: column.name.clone(),
                version: None,
            });
        }
    }
    groups
}

#[derive(Debug, Clone)]
pub struct DiagnosisStacker {
    groups: Vec<DxGroup>,
    modifier: String,
}

impl DiagnosisStacker {
    pub fn new(columns: &[ColumnDescriptor], table_name: &str) -> Result<Self> {
        let groups = dx_groups(columns);
        check_passes(groups.len())?;
        Ok(Self {
            groups,
            modifier: rif_modifier(table_name),
        })
    }

    pub fn groups(&self) -> &[DxGroup] {
        &self.groups
    }

    /// Stacks every group of `chunk`; `row_offset` is the job-wide position
    /// of the chunk's first row.
    pub fn stack(
        &self,
        chunk: &DataFrame,
        keys: &[RowKeys],
        row_offset: usize,
    ) -> Result<Vec<SourceFact>> {
        let mut facts = Vec::new();
        for (pass, group) in self.groups.iter().enumerate() {
            let code_col = find_column(chunk, &group.code)
                .ok_or_else(|| TransformError::MissingColumn(group.code.clone()))?;
            let version_col = match &group.version {
                Some(name) => Some(
                    find_column(chunk, name)
                        .ok_or_else(|| TransformError::MissingColumn(name.clone()))?,
                ),
                None => None,
            };
            let modifier = if pass == 0 {
                PRIMARY_DX_MODIFIER
            } else {
                self.modifier.as_str()
            };

            for (row, key) in keys.iter().enumerate() {
                let Some(bene_id) = &key.bene_id else {
                    continue;
                };
                let Some(code) = text_at(Some(code_col), row)? else {
                    continue;
                };
                let version = text_at(version_col, row)?;
                facts.push(SourceFact {
                    bene_id: bene_id.clone(),
                    medpar_id: key.medpar_id.clone(),
                    obs: Observation {
                        concept_cd: fmt_dx_code(version.as_deref(), &code),
                        modifier_cd: modifier.to_string(),
                        instance_num: instance_num(row_offset + row, pass),
                        valtype: ValueKind::Coded,
                        nval_num: None,
                        tval_char: None,
                        start_date: key.start_date,
                        end_date: key.end_date,
                        update_date: key.update_date,
                        provider_id: key.provider_id.clone(),
                    },
                });
            }
        }
        Ok(facts)
    }
}
