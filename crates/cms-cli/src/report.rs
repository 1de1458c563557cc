//! Terminal rendering of upload outcomes and column reports.

use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL_CONDENSED;
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};
use serde::Serialize;

use cms_core::UploadOutcome;
use cms_model::{ColumnDescriptor, DeclaredType, UploadStatus};

/// One line of the column report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnRow {
    pub column: String,
    pub declared: String,
    pub kind: &'static str,
    pub valtype_cd: Option<&'static str>,
    pub dx: bool,
    pub px: bool,
    pub pivoted: bool,
}

impl From<&ColumnDescriptor> for ColumnRow {
    fn from(descriptor: &ColumnDescriptor) -> Self {
        Self {
            column: descriptor.name.clone(),
            declared: declared_label(&descriptor.declared_type),
            kind: descriptor.value_kind.as_str(),
            valtype_cd: descriptor.value_kind.valtype_cd(),
            dx: descriptor.is_dx,
            px: descriptor.is_px,
            pivoted: descriptor.is_pivoted(descriptor.value_kind),
        }
    }
}

pub fn column_rows(descriptors: &[ColumnDescriptor]) -> Vec<ColumnRow> {
    descriptors.iter().map(ColumnRow::from).collect()
}

fn declared_label(declared: &DeclaredType) -> String {
    match declared {
        DeclaredType::Numeric => "numeric".to_string(),
        DeclaredType::Date => "date".to_string(),
        DeclaredType::Timestamp => "timestamp".to_string(),
        DeclaredType::String { length: Some(n) } => format!("string({n})"),
        DeclaredType::String { length: None } => "string".to_string(),
        DeclaredType::Other(name) => name.clone(),
    }
}

pub fn column_table(rows: &[ColumnRow]) -> Table {
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Column"),
        header_cell("Declared"),
        header_cell("Kind"),
        header_cell("Valtype"),
        header_cell("Dx"),
        header_cell("Px"),
        header_cell("Pivoted"),
    ]);
    apply_table_style(&mut table);
    for index in 4..7 {
        align_column(&mut table, index, CellAlignment::Center);
    }
    for row in rows {
        table.add_row(vec![
            Cell::new(&row.column).add_attribute(Attribute::Bold),
            Cell::new(&row.declared),
            Cell::new(row.kind),
            Cell::new(row.valtype_cd.unwrap_or("-")),
            flag_cell(row.dx),
            flag_cell(row.px),
            flag_cell(row.pivoted),
        ]);
    }
    table
}

pub fn outcome_table(outcome: &UploadOutcome) -> Table {
    let mut table = Table::new();
    table.set_header(vec![header_cell("Upload"), header_cell("")]);
    apply_table_style(&mut table);
    align_column(&mut table, 1, CellAlignment::Right);
    let rows: [(&str, Cell); 11] = [
        ("upload_id", Cell::new(outcome.upload_id)),
        ("label", Cell::new(&outcome.upload_label)),
        ("status", status_cell(outcome.status)),
        ("fact table", Cell::new(&outcome.fact_table)),
        ("loaded records", Cell::new(outcome.loaded_record)),
        ("chunks", Cell::new(outcome.chunks)),
        ("rows read", Cell::new(outcome.rows_read)),
        ("facts reshaped", Cell::new(outcome.facts_reshaped)),
        ("patient misses", miss_cell(outcome.patient_misses)),
        ("undated facts", miss_cell(outcome.undated_facts)),
        (
            "elapsed",
            Cell::new(format!("{:.1}s", outcome.elapsed_ms as f64 / 1000.0)),
        ),
    ];
    for (label, value) in rows {
        table.add_row(vec![Cell::new(label), value]);
    }
    table
}

fn apply_table_style(table: &mut Table) {
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_width(120);
}

fn align_column(table: &mut Table, index: usize, alignment: CellAlignment) {
    if let Some(column) = table.column_mut(index) {
        column.set_cell_alignment(alignment);
    }
}

fn header_cell(label: &str) -> Cell {
    Cell::new(label)
        .fg(Color::Cyan)
        .add_attribute(Attribute::Bold)
}

fn flag_cell(flag: bool) -> Cell {
    if flag {
        Cell::new("yes").fg(Color::Green)
    } else {
        Cell::new("-").fg(Color::DarkGrey)
    }
}

fn status_cell(status: UploadStatus) -> Cell {
    let color = match status {
        UploadStatus::Completed => Color::Green,
        UploadStatus::Failed => Color::Red,
        UploadStatus::Created | UploadStatus::Running => Color::Yellow,
    };
    Cell::new(status.as_str())
        .fg(color)
        .add_attribute(Attribute::Bold)
}

fn miss_cell(misses: usize) -> Cell {
    if misses > 0 {
        Cell::new(misses).fg(Color::Yellow)
    } else {
        Cell::new(misses)
    }
}
