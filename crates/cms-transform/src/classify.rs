//! Column classification.
//!
//! The measurement level of every source column is **inferred** from its
//! declared type and name, never listed per table:
//!
//! - numeric declared types are `numeric`
//! - dates and timestamps are `date`
//! - strings longer than `code_max_len` (or of unknown length) are `text`
//! - everything else is `coded`
//! - the administrative columns (bene_id and the claim dates) are `untyped`
//!
//! Name patterns flag diagnosis and procedure columns on top of the kind.

use regex::Regex;

use cms_model::{AdminColumns, ColumnDescriptor, DeclaredType, EtlSettings, SourceColumn, ValueKind};

use crate::error::Result;

/// Value kind of a declared type, ignoring the administrative channel.
///
/// # Examples
///
/// ```
/// use cms_model::{DeclaredType, ValueKind};
/// use cms_transform::classify::value_kind;
///
/// assert_eq!(value_kind(&DeclaredType::Numeric, 7), ValueKind::Numeric);
/// assert_eq!(value_kind(&DeclaredType::String { length: Some(1) }, 7), ValueKind::Coded);
/// assert_eq!(value_kind(&DeclaredType::String { length: Some(50) }, 7), ValueKind::Text);
/// ```
pub fn value_kind(declared: &DeclaredType, code_max_len: usize) -> ValueKind {
    match declared {
        DeclaredType::Numeric => ValueKind::Numeric,
        DeclaredType::Date | DeclaredType::Timestamp => ValueKind::Date,
        DeclaredType::String { length: Some(n) } if *n <= code_max_len => ValueKind::Coded,
        DeclaredType::String { .. } => ValueKind::Text,
        DeclaredType::Other(_) => ValueKind::Coded,
    }
}

/// Derives [`ColumnDescriptor`]s from store column metadata.
#[derive(Debug, Clone)]
pub struct ColumnClassifier {
    code_max_len: usize,
    dx_pattern: Regex,
    px_pattern: Regex,
}

impl ColumnClassifier {
    pub fn new(settings: &EtlSettings) -> Result<Self> {
        Ok(Self {
            code_max_len: settings.code_max_len,
            dx_pattern: Regex::new(&settings.dx_pattern)?,
            px_pattern: Regex::new(&settings.px_pattern)?,
        })
    }

    pub fn classify(&self, column: &SourceColumn, admin: &AdminColumns) -> ColumnDescriptor {
        let value_kind = if admin.is_mapped(&column.name) {
            ValueKind::Untyped
        } else {
            value_kind(&column.declared_type, self.code_max_len)
        };
        let lower = column.name.to_lowercase();
        ColumnDescriptor {
            name: column.name.clone(),
            declared_type: column.declared_type.clone(),
            value_kind,
            is_dx: self.dx_pattern.is_match(&lower),
            is_px: self.px_pattern.is_match(&lower),
        }
    }

    /// Classifies every column, keeping the declared order.
    pub fn classify_all(
        &self,
        columns: &[SourceColumn],
        admin: &AdminColumns,
    ) -> Vec<ColumnDescriptor> {
        columns.iter().map(|c| self.classify(c, admin)).collect()
    }
}
