//! Surrogate encounter numbers for facts with no encounter mapping.

use chrono::NaiveDate;
use sha2::Digest;

use cms_common::format_date;

/// Identifies the hash layout below; bump it if the key text or digest changes.
pub const SURROGATE_SCHEME: &str = "sha256-v1";

/// `"YYYY-MM-DD bene_id"`; an unknown date leaves the date part empty.
pub fn patient_day(start_date: Option<NaiveDate>, bene_id: &str) -> String {
    let day = start_date.map(format_date).unwrap_or_default();
    format!("{day} {bene_id}")
}

/// A negative encounter number derived from the patient day.
///
/// `-(h >> 1) - 1` for the first 8 digest bytes `h` (big-endian): always
/// negative, so it never collides with mapped encounter numbers.
pub fn surrogate_encounter_num(start_date: Option<NaiveDate>, bene_id: &str) -> i64 {
    let digest = sha2::Sha256::digest(patient_day(start_date, bene_id).as_bytes());
    let mut head = [0_u8; 8];
    head.copy_from_slice(&digest[..8]);
    let h = u64::from_be_bytes(head);
    -((h >> 1) as i64) - 1
}
