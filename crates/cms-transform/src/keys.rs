//! Per-row identity and date channel.
//!
//! The administrative columns are read once per chunk into [`RowKeys`] and
//! shared by the stacker and the pivoter.

use chrono::NaiveDate;
use polars::prelude::{Column, DataFrame};

use cms_common::{any_to_date, any_to_string};
use cms_model::{AdminColumns, NO_PROVIDER};

use crate::error::{Result, TransformError};

#[derive(Debug, Clone, PartialEq)]
pub struct RowKeys {
    /// `None` only for malformed rows, which produce no facts.
    pub bene_id: Option<String>,
    pub medpar_id: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub update_date: Option<NaiveDate>,
    pub provider_id: String,
}

/// Case-insensitive column lookup.
pub fn find_column<'a>(chunk: &'a DataFrame, name: &str) -> Option<&'a Column> {
    chunk
        .get_columns()
        .iter()
        .find(|c| c.name().as_str().eq_ignore_ascii_case(name))
}

pub fn row_keys(chunk: &DataFrame, admin: &AdminColumns) -> Result<Vec<RowKeys>> {
    let bene = find_column(chunk, &admin.bene_id)
        .ok_or_else(|| TransformError::MissingColumn(admin.bene_id.clone()))?;
    let encounter = admin
        .encounter
        .as_deref()
        .and_then(|name| find_column(chunk, name));
    let provider = admin
        .provider
        .as_deref()
        .and_then(|name| find_column(chunk, name));
    let start = find_column(chunk, &admin.start_date);
    let end = find_column(chunk, &admin.end_date);
    let update = find_column(chunk, &admin.update_date);

    let mut keys = Vec::with_capacity(chunk.height());
    for row in 0..chunk.height() {
        keys.push(RowKeys {
            bene_id: text_at(Some(bene), row)?,
            medpar_id: text_at(encounter, row)?,
            start_date: date_at(start, row)?,
            end_date: date_at(end, row)?,
            update_date: date_at(update, row)?,
            provider_id: text_at(provider, row)?.unwrap_or_else(|| NO_PROVIDER.to_string()),
        });
    }
    Ok(keys)
}

/// Trimmed text of a cell; blanks read as null.
pub(crate) fn text_at(column: Option<&Column>, row: usize) -> Result<Option<String>> {
    let Some(column) = column else {
        return Ok(None);
    };
    Ok(any_to_string(column.get(row)?)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty()))
}

fn date_at(column: Option<&Column>, row: usize) -> Result<Option<NaiveDate>> {
    match column {
        Some(column) => Ok(any_to_date(column.get(row)?)),
        None => Ok(None),
    }
}
