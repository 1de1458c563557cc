//! Value pivoting.
//!
//! Each non-diagnosis column of one value kind becomes one fact per row with
//! a value. All facts of a row share the instance number `row * 10^3`; the
//! concept code carries the column name, so they stay distinct.

use polars::prelude::DataFrame;

use cms_common::{any_to_date, any_to_f64, format_date};
use cms_model::{ColumnDescriptor, Observation, SourceFact, ValueKind};

use crate::diagnosis::rif_modifier;
use crate::error::{Result, TransformError};
use crate::instance::instance_num;
use crate::keys::{RowKeys, find_column, text_at};

#[derive(Debug, Clone)]
pub struct ValuePivoter {
    columns: Vec<(ValueKind, String)>,
    modifier: String,
}

impl ValuePivoter {
    pub fn new(columns: &[ColumnDescriptor], table_name: &str) -> Self {
        Self {
            columns: columns
                .iter()
                .filter(|c| c.is_pivoted(c.value_kind))
                .map(|c| (c.value_kind, c.name.clone()))
                .collect(),
            modifier: rif_modifier(table_name),
        }
    }

    /// Kinds with at least one pivoted column, in pivot order.
    pub fn kinds(&self) -> Vec<ValueKind> {
        ValueKind::PIVOTED
            .into_iter()
            .filter(|kind| self.columns.iter().any(|(k, _)| k == kind))
            .collect()
    }

    pub fn columns(&self, kind: ValueKind) -> impl Iterator<Item = &str> {
        self.columns
            .iter()
            .filter(move |(k, _)| *k == kind)
            .map(|(_, name)| name.as_str())
    }

    pub fn pivot(
        &self,
        kind: ValueKind,
        chunk: &DataFrame,
        keys: &[RowKeys],
        row_offset: usize,
    ) -> Result<Vec<SourceFact>> {
        let mut facts = Vec::new();
        for name in self.columns(kind) {
            let column = find_column(chunk, name)
                .ok_or_else(|| TransformError::MissingColumn(name.to_string()))?;
            let prefix = format!("{}:", name.to_uppercase());

            for (row, key) in keys.iter().enumerate() {
                let Some(bene_id) = &key.bene_id else {
                    continue;
                };
                let mut obs = Observation {
                    concept_cd: prefix.clone(),
                    modifier_cd: self.modifier.clone(),
                    instance_num: instance_num(row_offset + row, 0),
                    valtype: kind,
                    nval_num: None,
                    tval_char: None,
                    start_date: key.start_date,
                    end_date: key.end_date,
                    update_date: key.update_date,
                    provider_id: key.provider_id.clone(),
                };
                match kind {
                    ValueKind::Coded => {
                        let Some(value) = text_at(Some(column), row)? else {
                            continue;
                        };
                        obs.concept_cd.push_str(&value);
                    }
                    ValueKind::Text => {
                        let Some(value) = text_at(Some(column), row)? else {
                            continue;
                        };
                        obs.tval_char = Some(value);
                    }
                    ValueKind::Numeric => {
                        let Some(value) = any_to_f64(column.get(row)?) else {
                            continue;
                        };
                        obs.nval_num = Some(value);
                    }
                    ValueKind::Date => {
                        let Some(value) = any_to_date(column.get(row)?) else {
                            continue;
                        };
                        obs.tval_char = Some(format_date(value));
                        obs.start_date = Some(value);
                        obs.end_date = Some(value);
                    }
                    ValueKind::Untyped => continue,
                }
                facts.push(SourceFact {
                    bene_id: bene_id.clone(),
                    medpar_id: key.medpar_id.clone(),
                    obs,
                });
            }
        }
        Ok(facts)
    }
}
