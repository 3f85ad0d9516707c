//! Acquisition state machine.

use serde::{Deserialize, Serialize};

use crate::Error;

/// Acquisition states of a tracked media item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AcquisitionState {
    /// Tracked, nothing in flight. Eligible for the next acquisition cycle.
    #[default]
    Idle,
    /// An acquisition request was accepted and candidates are being resolved.
    Pending,
    /// A supervision task owns the item and a transfer is submitted.
    Downloading,
    /// The transfer completed. Publishing may still have failed (see `last_error`).
    Downloaded,
    /// Discovery found nothing, or the failed-candidate limit was exceeded.
    Failed,
    /// Cancelled by an operator.
    Aborted,
}

impl AcquisitionState {
    /// All states, in declaration order.
    pub const ALL: [AcquisitionState; 6] = [
        Self::Idle,
        Self::Pending,
        Self::Downloading,
        Self::Downloaded,
        Self::Failed,
        Self::Aborted,
    ];

    /// Convert to database string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::Pending => "PENDING",
            Self::Downloading => "DOWNLOADING",
            Self::Downloaded => "DOWNLOADED",
            Self::Failed => "FAILED",
            Self::Aborted => "ABORTED",
        }
    }

    /// Parse from database string representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "IDLE" => Some(Self::Idle),
            "PENDING" => Some(Self::Pending),
            "DOWNLOADING" => Some(Self::Downloading),
            "DOWNLOADED" => Some(Self::Downloaded),
            "FAILED" => Some(Self::Failed),
            "ABORTED" => Some(Self::Aborted),
            _ => None,
        }
    }

    /// Terminal states see no further automatic transition.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Downloaded | Self::Failed | Self::Aborted)
    }

    /// States in which an acquisition is in flight.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::Downloading)
    }

    /// Validate a state transition.
    pub fn can_transition_to(&self, target: AcquisitionState) -> bool {
        use AcquisitionState::*;

        match (self, target) {
            (from, to) if *from == to => true,

            (Idle, Pending) => true,

            // Discovery error and startup reset return to Idle
            (Pending, Idle | Downloading | Failed | Aborted) => true,

            // Exhausted below the limit, or reset by recovery
            (Downloading, Idle | Downloaded | Failed | Aborted) => true,

            (Downloaded, Aborted) => true,

            // Not-found failures are retried straight from Failed
            (Failed, Pending | Idle) => true,

            (Aborted, Pending | Idle) => true,

            _ => false,
        }
    }

    /// Attempt to transition to a new state.
    pub fn transition_to(&self, target: AcquisitionState) -> Result<AcquisitionState, Error> {
        if self.can_transition_to(target) {
            Ok(target)
        } else {
            Err(Error::InvalidStateTransition {
                from: self.as_str().to_string(),
                to: target.as_str().to_string(),
            })
        }
    }
}

impl std::fmt::Display for AcquisitionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
