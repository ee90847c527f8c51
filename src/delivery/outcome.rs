//! Terminal per-record outcomes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::dataset::{RecipientRecord, SkippedRow};
use crate::error::{DispatchError, ResolveError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Success,
    NotFound,
    SendFailed,
    Skipped,
}

impl OutcomeKind {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::NotFound | Self::SendFailed)
    }
}

impl std::fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Success => "success",
            Self::NotFound => "not_found",
            Self::SendFailed => "send_failed",
            Self::Skipped => "skipped",
        };
        write!(f, "{s}")
    }
}

/// What happened to one record. Produced exactly once per record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryOutcome {
    pub kind: OutcomeKind,
    pub record: RecipientRecord,
    pub diagnostic: Option<String>,
    pub at: DateTime<Utc>,
}

impl DeliveryOutcome {
    pub fn success(record: RecipientRecord, at: DateTime<Utc>) -> Self {
        Self {
            kind: OutcomeKind::Success,
            record,
            diagnostic: None,
            at,
        }
    }

    pub fn not_found(record: RecipientRecord, err: &ResolveError, at: DateTime<Utc>) -> Self {
        Self {
            kind: OutcomeKind::NotFound,
            record,
            diagnostic: Some(err.reason.clone()),
            at,
        }
    }

    pub fn send_failed(record: RecipientRecord, err: &DispatchError, at: DateTime<Utc>) -> Self {
        Self {
            kind: OutcomeKind::SendFailed,
            record,
            diagnostic: Some(format!("{}: {}", err.kind.tag(), err.source)),
            at,
        }
    }

    pub fn skipped(row: &SkippedRow, at: DateTime<Utc>) -> Self {
        Self {
            kind: OutcomeKind::Skipped,
            record: row.record.clone(),
            diagnostic: Some(row.reason.clone()),
            at,
        }
    }
}
