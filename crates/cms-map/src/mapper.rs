//! Identity mapping of source facts.
//!
//! Each fragment costs at most two range-bounded lookups, bounded by the
//! smallest and largest bene_id present. Patients are inner-joined, so facts
//! for unmapped beneficiaries are dropped; encounters are left-joined and
//! fall back to a surrogate number.

use std::collections::HashMap;

use serde::Serialize;
use tracing::{debug, warn};

use cms_model::{MappedFact, SourceFact, SourceSettings};
use cms_store::IdentityStore;

use crate::error::Result;
use crate::surrogate::surrogate_encounter_num;

/// Key columns appended to the source code to form the mapping source tags.
pub const PATIENT_KEY_COLS: &str = "(BENE_ID)";
pub const ENCOUNTER_KEY_COLS: &str = "(MEDPAR_ID)";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MappingStats {
    pub facts_in: usize,
    pub facts_out: usize,
    /// Rows returned by the patient lookup.
    pub pmap_len: usize,
    /// Rows returned by the encounter lookup; `None` when it was skipped.
    pub emap_len: Option<usize>,
    /// Facts dropped because their bene_id has no patient mapping.
    pub patient_misses: usize,
    /// Facts given a surrogate encounter number.
    pub surrogates: usize,
}

impl MappingStats {
    /// Suffix for the mapping step message, e.g. ` pmap: 3 emap: 2`.
    pub fn message(&self) -> String {
        match self.emap_len {
            Some(emap) => format!(" pmap: {} emap: {emap}", self.pmap_len),
            None => format!(" pmap: {}", self.pmap_len),
        }
    }
}

#[derive(Debug, Clone)]
pub struct IdentityMapper {
    patient_source: String,
    encounter_source: String,
}

impl IdentityMapper {
    pub fn new(source: &SourceSettings) -> Self {
        Self {
            patient_source: source.ide_source(PATIENT_KEY_COLS),
            encounter_source: source.ide_source(ENCOUNTER_KEY_COLS),
        }
    }

    pub fn patient_source(&self) -> &str {
        &self.patient_source
    }

    pub fn encounter_source(&self) -> &str {
        &self.encounter_source
    }

    pub fn map<S: IdentityStore + ?Sized>(
        &self,
        store: &S,
        facts: Vec<SourceFact>,
    ) -> Result<(Vec<MappedFact>, MappingStats)> {
        let mut stats = MappingStats {
            facts_in: facts.len(),
            ..MappingStats::default()
        };
        let Some((first, last)) = bene_bounds(&facts) else {
            return Ok((Vec::new(), stats));
        };

        let pmap: HashMap<String, i64> = store
            .patient_mapping(&self.patient_source, &first, &last)?
            .into_iter()
            .map(|row| (row.source_id, row.warehouse_id))
            .collect();
        stats.pmap_len = pmap.len();

        let emap: HashMap<String, i64> = if facts.iter().any(|f| f.medpar_id.is_some()) {
            let rows = store.encounter_mapping(&self.encounter_source, &first, &last)?;
            stats.emap_len = Some(rows.len());
            rows.into_iter()
                .map(|row| (row.source_id, row.warehouse_id))
                .collect()
        } else {
            HashMap::new()
        };

        let mut missed_sample: Option<String> = None;
        let mut mapped = Vec::with_capacity(facts.len());
        for fact in facts {
            let Some(&patient_num) = pmap.get(&fact.bene_id) else {
                stats.patient_misses += 1;
                missed_sample.get_or_insert_with(|| fact.bene_id.clone());
                continue;
            };
            let encounter_num = match fact.medpar_id.as_ref().and_then(|id| emap.get(id)) {
                Some(&num) => num,
                None => {
                    stats.surrogates += 1;
                    surrogate_encounter_num(fact.obs.start_date, &fact.bene_id)
                }
            };
            mapped.push(MappedFact {
                patient_num,
                encounter_num,
                obs: fact.obs,
            });
        }
        stats.facts_out = mapped.len();

        if stats.patient_misses > 0 {
            warn!(
                misses = stats.patient_misses,
                sample_bene_id = missed_sample.as_deref().unwrap_or_default(),
                patient_ide_source = %self.patient_source,
                "facts dropped for bene_ids with no patient mapping"
            );
        }
        debug!(
            first = %first,
            last = %last,
            pmap = stats.pmap_len,
            surrogates = stats.surrogates,
            "mapped fragment"
        );
        Ok((mapped, stats))
    }
}

/// Smallest and largest bene_id in text order.
pub fn bene_bounds(facts: &[SourceFact]) -> Option<(String, String)> {
    let first = facts.iter().map(|f| f.bene_id.as_str()).min()?;
    let last = facts.iter().map(|f| f.bene_id.as_str()).max()?;
    Some((first.to_string(), last.to_string()))
}
