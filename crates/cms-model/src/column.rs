//! Source column metadata and value kinds.
//!
//! A [`ColumnDescriptor`] is derived once per job from the store's column
//! metadata and then shared read-only by every chunk of that job.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Column type as declared by the source store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeclaredType {
    Numeric,
    Date,
    Timestamp,
    /// Character data; `length` is the declared maximum when the store knows it.
    String { length: Option<usize> },
    Other(String),
}

impl DeclaredType {
    /// Parse a SQL type name such as `VARCHAR2(15)`, `NUMBER(12,2)` or `DATE`.
    ///
    /// Unrecognized names are kept verbatim in [`DeclaredType::Other`].
    pub fn from_sql(type_name: &str) -> Self {
        let upper = type_name.trim().to_uppercase();
        let base = upper.split('(').next().unwrap_or("").trim();

        if base.contains("CHAR") || base.contains("TEXT") || base.contains("CLOB") {
            return Self::String {
                length: declared_length(&upper),
            };
        }
        if base.contains("TIMESTAMP") || base.contains("DATETIME") {
            return Self::Timestamp;
        }
        if base == "DATE" {
            return Self::Date;
        }
        if base.contains("INT")
            || base.contains("NUM")
            || base.contains("DEC")
            || base.contains("REAL")
            || base.contains("FLOA")
            || base.contains("DOUB")
        {
            return Self::Numeric;
        }
        Self::Other(type_name.trim().to_string())
    }
}

fn declared_length(upper: &str) -> Option<usize> {
    let start = upper.find('(')?;
    let end = upper[start..].find(')')? + start;
    upper[start + 1..end]
        .split(',')
        .next()
        .and_then(|n| n.trim().parse().ok())
}

/// Column name and declared type as reported by the schema provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceColumn {
    pub name: String,
    pub declared_type: DeclaredType,
}

impl SourceColumn {
    pub fn new(name: impl Into<String>, declared_type: DeclaredType) -> Self {
        Self {
            name: name.into(),
            declared_type,
        }
    }
}

/// Measurement level of a source column.
///
/// Each kind other than [`ValueKind::Untyped`] maps to an i2b2 `valtype_cd`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ValueKind {
    Coded,
    Text,
    Date,
    Numeric,
    /// Administrative columns consumed by the identity/date channel.
    Untyped,
}

impl ValueKind {
    /// Kinds that produce facts, in pivot order.
    pub const PIVOTED: [ValueKind; 4] = [
        ValueKind::Coded,
        ValueKind::Text,
        ValueKind::Date,
        ValueKind::Numeric,
    ];

    /// The i2b2 `valtype_cd`, or `None` for untyped columns.
    pub fn valtype_cd(self) -> Option<&'static str> {
        match self {
            Self::Coded => Some("@"),
            Self::Text => Some("t"),
            Self::Date => Some("d"),
            Self::Numeric => Some("n"),
            Self::Untyped => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Coded => "coded",
            Self::Text => "text",
            Self::Date => "date",
            Self::Numeric => "numeric",
            Self::Untyped => "untyped",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ValueKind {
    type Err = ModelError;

    /// Parses a `valtype_cd`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "@" => Ok(Self::Coded),
            "t" => Ok(Self::Text),
            "d" => Ok(Self::Date),
            "n" => Ok(Self::Numeric),
            other => Err(ModelError::UnknownValtype(other.to_string())),
        }
    }
}

/// A classified source column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    pub declared_type: DeclaredType,
    pub value_kind: ValueKind,
    pub is_dx: bool,
    pub is_px: bool,
}

impl ColumnDescriptor {
    /// Whether the pivoter should emit facts for this column.
    pub fn is_pivoted(&self, kind: ValueKind) -> bool {
        self.value_kind == kind && kind != ValueKind::Untyped && !self.is_dx
    }
}
