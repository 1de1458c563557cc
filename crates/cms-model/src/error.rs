use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("unknown upload status: {0}")]
    UnknownStatus(String),
    #[error("unknown value type code: {0}")]
    UnknownValtype(String),
    #[error("invalid bene_id range: first {first} is after last {last}")]
    InvalidRange { first: i64, last: i64 },
}

pub type Result<T> = std::result::Result<T, ModelError>;
