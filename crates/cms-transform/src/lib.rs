//! Reshaping of wide CMS RIF chunks into long observation facts.
//!
//! Column classification is metadata driven: value kinds and diagnosis
//! roles come from declared types and name patterns, so the same code
//! handles every RIF table.

pub mod buffer;
pub mod classify;
pub mod diagnosis;
pub mod error;
pub mod frame;
pub mod instance;
pub mod keys;
pub mod pivot;
pub mod reshape;

pub use buffer::FactBuffer;
pub use classify::{ColumnClassifier, value_kind};
pub use diagnosis::{DiagnosisStacker, DxGroup, fmt_dx_code, rif_modifier};
pub use error::{Result, TransformError};
pub use frame::{build_fact_frame, check_template};
pub use instance::{PASS_LIMIT, SPARE_DIGITS, instance_num};
pub use keys::{RowKeys, row_keys};
pub use pivot::ValuePivoter;
pub use reshape::{ChunkReshaper, DX_PASS};
