use cms_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MapError {
    #[error("identity lookup failed: {0}")]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, MapError>;
