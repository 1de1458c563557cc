//! Fact frame assembly.
//!
//! Mapped facts plus the chunk's administrative stamp become one Polars
//! frame whose columns follow the fact table template order.

use polars::prelude::{Column, DataFrame, DataType, NamedFrom, Series, TimeUnit};

use cms_common::{epoch_days, epoch_millis};
use cms_model::{AdminStamp, FactTableTemplate, MappedFact};

use crate::error::{Result, TransformError};

/// Columns the ETL fills, in no particular order.
pub const PRODUCED_COLUMNS: [&str; 16] = [
    "encounter_num",
    "patient_num",
    "concept_cd",
    "provider_id",
    "start_date",
    "modifier_cd",
    "instance_num",
    "valtype_cd",
    "tval_char",
    "nval_num",
    "end_date",
    "update_date",
    "download_date",
    "import_date",
    "sourcesystem_cd",
    "upload_id",
];

/// Checks that the template holds every produced column and that every
/// required template column is produced.
pub fn check_template(template: &FactTableTemplate) -> Result<()> {
    for name in PRODUCED_COLUMNS {
        if template.column(name).is_none() {
            return Err(TransformError::SchemaMismatch {
                column: name.to_string(),
                message: "not in the fact table template".to_string(),
            });
        }
    }
    for column in &template.columns {
        if !column.nullable && !PRODUCED_COLUMNS.contains(&column.name.as_str()) {
            return Err(TransformError::SchemaMismatch {
                column: column.name.clone(),
                message: "required by the template but never produced".to_string(),
            });
        }
    }
    Ok(())
}

pub fn build_fact_frame(
    facts: &[MappedFact],
    stamp: &AdminStamp,
    template: &FactTableTemplate,
) -> Result<DataFrame> {
    check_template(template)?;

    let len = facts.len();
    let mut columns = Vec::with_capacity(PRODUCED_COLUMNS.len());
    for column in &template.columns {
        let name = column.name.as_str();
        let series = match name {
            "encounter_num" => int_series(name, facts.iter().map(|f| f.encounter_num)),
            "patient_num" => int_series(name, facts.iter().map(|f| f.patient_num)),
            "instance_num" => int_series(name, facts.iter().map(|f| f.obs.instance_num)),
            "concept_cd" => text_series(name, facts.iter().map(|f| Some(f.obs.concept_cd.as_str()))),
            "provider_id" => text_series(name, facts.iter().map(|f| Some(f.obs.provider_id.as_str()))),
            "modifier_cd" => text_series(name, facts.iter().map(|f| Some(f.obs.modifier_cd.as_str()))),
            "valtype_cd" => text_series(name, facts.iter().map(|f| f.obs.valtype.valtype_cd())),
            "tval_char" => text_series(name, facts.iter().map(|f| f.obs.tval_char.as_deref())),
            "nval_num" => Series::new(
                name.into(),
                facts.iter().map(|f| f.obs.nval_num).collect::<Vec<_>>(),
            ),
            "start_date" => date_series(name, facts.iter().map(|f| f.obs.start_date))?,
            "end_date" => date_series(name, facts.iter().map(|f| f.obs.end_date))?,
            "update_date" => date_series(name, facts.iter().map(|f| f.obs.update_date))?,
            "download_date" => date_series(name, std::iter::repeat_n(stamp.download_date, len))?,
            "import_date" => Series::new(
                name.into(),
                vec![epoch_millis(stamp.import_date); len],
            )
            .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))?,
            "sourcesystem_cd" => text_series(
                name,
                std::iter::repeat_n(Some(stamp.sourcesystem_cd.as_str()), len),
            ),
            "upload_id" => Series::new(name.into(), vec![stamp.upload_id; len]),
            _ => continue,
        };
        columns.push(Column::from(series));
    }
    Ok(DataFrame::new(columns)?)
}

fn int_series(name: &str, values: impl Iterator<Item = i64>) -> Series {
    Series::new(name.into(), values.collect::<Vec<_>>())
}

fn text_series<'a>(name: &str, values: impl Iterator<Item = Option<&'a str>>) -> Series {
    Series::new(name.into(), values.collect::<Vec<_>>())
}

fn date_series(
    name: &str,
    values: impl Iterator<Item = Option<chrono::NaiveDate>>,
) -> Result<Series> {
    let days: Vec<Option<i32>> = values.map(|d| d.map(epoch_days)).collect();
    Ok(Series::new(name.into(), days).cast(&DataType::Date)?)
}
