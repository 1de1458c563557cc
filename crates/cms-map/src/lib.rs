//! Resolution of CMS beneficiary and claim ids to i2b2 patient and
//! encounter numbers.

pub mod error;
pub mod mapper;
pub mod surrogate;

pub use error::{MapError, Result};
pub use mapper::{
    ENCOUNTER_KEY_COLS, IdentityMapper, MappingStats, PATIENT_KEY_COLS, bene_bounds,
};
pub use surrogate::{SURROGATE_SCHEME, patient_day, surrogate_encounter_num};
