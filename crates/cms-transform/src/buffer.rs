//! Growable fact accumulator.

use cms_model::SourceFact;

/// Facts of one chunk in pass order, with the size of each pass.
///
/// Facts without a start date cannot be loaded (`start_date` is part of the
/// fact key), so they are counted and left out.
#[derive(Debug, Default, Clone)]
pub struct FactBuffer {
    facts: Vec<SourceFact>,
    passes: Vec<(String, usize)>,
    undated: usize,
    undated_sample: Option<String>,
}

impl FactBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends the output of one pass after everything already buffered.
    pub fn push_pass(&mut self, label: impl Into<String>, facts: Vec<SourceFact>) {
        let before = self.facts.len();
        for fact in facts {
            if fact.obs.start_date.is_some() {
                self.facts.push(fact);
            } else {
                self.undated += 1;
                self.undated_sample.get_or_insert(fact.bene_id);
            }
        }
        self.passes.push((label.into(), self.facts.len() - before));
    }

    /// Facts dropped for lack of a start date.
    pub fn undated(&self) -> usize {
        self.undated
    }

    /// bene_id of the first undated fact, for diagnostics.
    pub fn undated_sample(&self) -> Option<&str> {
        self.undated_sample.as_deref()
    }

    pub fn len(&self) -> usize {
        self.facts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }

    pub fn facts(&self) -> &[SourceFact] {
        &self.facts
    }

    /// `(label, fact count)` per pass, in the order the passes ran.
    pub fn passes(&self) -> &[(String, usize)] {
        &self.passes
    }

    pub fn pass_len(&self, label: &str) -> usize {
        self.passes
            .iter()
            .filter(|(l, _)| l == label)
            .map(|(_, n)| n)
            .sum()
    }

    pub fn into_facts(self) -> Vec<SourceFact> {
        self.facts
    }
}
