//! Acquisition record embedded in every tracked media item.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::state::AcquisitionState;
use crate::Result;
use crate::domain::candidate::Candidate;

/// Per-item acquisition progress.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionItem {
    pub state: AcquisitionState,
    pub current_candidate: Option<Candidate>,
    pub backend_transfer_id: Option<String>,
    /// Candidates already tried for this item, keyed by candidate id.
    pub failed_candidates: BTreeMap<String, Candidate>,
    /// Cached ranked list for the current attempt.
    pub candidate_list: Vec<Candidate>,
    pub abort_requested: bool,
    pub torrents_not_found: bool,
    /// Advisory only.
    pub last_error: Option<String>,
}

impl AcquisitionItem {
    /// Move to `target`, rejecting transitions the state machine forbids.
    pub fn transition(&mut self, target: AcquisitionState) -> Result<()> {
        self.state = self.state.transition_to(target)?;
        Ok(())
    }

    pub fn has_failed(&self, candidate_id: &str) -> bool {
        self.failed_candidates.contains_key(candidate_id)
    }

    pub fn failure_count(&self) -> usize {
        self.failed_candidates.len()
    }

    /// Record `candidate` as failed and detach it from the item.
    pub fn record_failure(&mut self, candidate: &Candidate) {
        self.failed_candidates
            .insert(candidate.id.clone(), candidate.clone());
        self.current_candidate = None;
        self.backend_transfer_id = None;
    }

    /// Attach a freshly submitted transfer.
    pub fn attach_transfer(&mut self, candidate: Candidate, transfer_id: String) {
        self.current_candidate = Some(candidate);
        self.backend_transfer_id = Some(transfer_id);
        self.torrents_not_found = false;
    }

    /// Clear the in-flight portion once the transfer has completed or the
    /// item has been given up on. Failure history is kept.
    pub fn clear_in_flight(&mut self) {
        self.current_candidate = None;
        self.backend_transfer_id = None;
        self.candidate_list.clear();
        self.abort_requested = false;
    }

    /// Clear everything an abort discards, failure history included.
    pub fn clear_for_abort(&mut self) {
        self.clear_in_flight();
        self.failed_candidates.clear();
        self.torrents_not_found = false;
    }

    /// `Failed` because the attempt limit was exceeded. Such items only
    /// re-engage through an explicit retry.
    pub fn is_permanently_failed(&self) -> bool {
        self.state == AcquisitionState::Failed && !self.torrents_not_found
    }

    /// Whether the poll loop should consider this item.
    pub fn is_eligible_for_poll(&self) -> bool {
        match self.state {
            AcquisitionState::Idle => true,
            AcquisitionState::Failed => self.torrents_not_found,
            _ => false,
        }
    }
}
