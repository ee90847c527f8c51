//! Per-record delivery state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// State of one recipient record during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordState {
    /// Waiting its turn.
    Pending,
    /// Asking the rate limiter for admission.
    RateCheck,
    /// Looking the recipient up in the channel.
    Resolving,
    /// Recipient located; conversation open.
    Resolved,
    /// Recipient could not be located.
    NotFound,
    /// Composing and committing the message.
    Sending,
    /// Message committed.
    Sent,
    /// Message could not be committed.
    SendFailed,
}

impl RecordState {
    /// Check if this state allows transitioning to another state.
    pub fn can_transition_to(&self, target: RecordState) -> bool {
        use RecordState::*;

        matches!(
            (self, target),
            (Pending, RateCheck)
                | (RateCheck, Resolving)
                | (Resolving, Resolved)
                | (Resolving, NotFound)
                | (Resolved, Sending)
                | (Sending, Sent)
                | (Sending, SendFailed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::NotFound | Self::Sent | Self::SendFailed)
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::NotFound | Self::SendFailed)
    }
}

impl std::fmt::Display for RecordState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::RateCheck => "rate_check",
            Self::Resolving => "resolving",
            Self::Resolved => "resolved",
            Self::NotFound => "not_found",
            Self::Sending => "sending",
            Self::Sent => "sent",
            Self::SendFailed => "send_failed",
        };
        write!(f, "{s}")
    }
}

/// A state transition event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub from: RecordState,
    pub to: RecordState,
    pub timestamp: DateTime<Utc>,
}

/// Tracks one record through the machine.
#[derive(Debug, Clone, Serialize)]
pub struct RecordProgress {
    pub row_index: usize,
    pub state: RecordState,
    pub transitions: Vec<StateTransition>,
}

impl RecordProgress {
    pub fn new(row_index: usize) -> Self {
        Self {
            row_index,
            state: RecordState::Pending,
            transitions: Vec::new(),
        }
    }

    /// Move to `next`, rejecting transitions the machine does not allow.
    pub fn advance(&mut self, next: RecordState, at: DateTime<Utc>) -> Result<(), Error> {
        if !self.state.can_transition_to(next) {
            return Err(Error::InvalidTransition {
                row: self.row_index + 1,
                from: self.state.to_string(),
                to: next.to_string(),
            });
        }
        self.transitions.push(StateTransition {
            from: self.state,
            to: next,
            timestamp: at,
        });
        self.state = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_transitions() {
        let mut progress = RecordProgress::new(0);
        let now = Utc::now();
        for next in [
            RecordState::RateCheck,
            RecordState::Resolving,
            RecordState::Resolved,
            RecordState::Sending,
            RecordState::Sent,
        ] {
            progress.advance(next, now).unwrap();
        }
        assert!(progress.state.is_terminal());
        assert_eq!(progress.transitions.len(), 5);
    }

    #[test]
    fn not_found_never_sends() {
        assert!(RecordState::Resolving.can_transition_to(RecordState::NotFound));
        assert!(!RecordState::NotFound.can_transition_to(RecordState::Sending));
        assert!(!RecordState::Resolving.can_transition_to(RecordState::Sending));
        assert!(RecordState::NotFound.is_failure());
    }

    #[test]
    fn terminal_states_are_final() {
        let mut progress = RecordProgress::new(4);
        let now = Utc::now();
        progress.advance(RecordState::RateCheck, now).unwrap();
        progress.advance(RecordState::Resolving, now).unwrap();
        progress.advance(RecordState::NotFound, now).unwrap();

        let err = progress.advance(RecordState::Resolving, now).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid record transition for row 5: not_found -> resolving"
        );
    }

    #[test]
    fn skipping_rate_check_is_rejected() {
        assert!(!RecordState::Pending.can_transition_to(RecordState::Resolving));
        assert!(!RecordState::Sent.is_failure());
    }
}
