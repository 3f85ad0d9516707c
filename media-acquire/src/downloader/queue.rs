//! Candidate queue: drop already-failed candidates, keep ranking, bound the window.

use crate::domain::{AcquisitionItem, Candidate};

/// Default number of candidates considered per acquisition cycle.
pub const DEFAULT_CANDIDATE_WINDOW: usize = 10;

#[derive(Debug, Clone, Copy)]
pub struct CandidateQueue {
    window: usize,
}

impl Default for CandidateQueue {
    fn default() -> Self {
        Self::new(DEFAULT_CANDIDATE_WINDOW)
    }
}

impl CandidateQueue {
    pub fn new(window: usize) -> Self {
        Self { window }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// Ranked candidates for `item`, failed ones removed, at most `window` long.
    ///
    /// Duplicate ids in the input keep their first occurrence only.
    pub fn build(&self, ranked: &[Candidate], item: &AcquisitionItem) -> Vec<Candidate> {
        let mut seen = std::collections::HashSet::new();
        ranked
            .iter()
            .filter(|c| !item.has_failed(&c.id))
            .filter(|c| seen.insert(c.id.as_str()))
            .take(self.window)
            .cloned()
            .collect()
    }
}
