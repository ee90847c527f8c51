//! Campaign and session statistics.
//!
//! Counters are purely additive. Every processed record bumps `total` and
//! exactly one of `sent`, `failed` or `skipped`, so
//! `total == sent + failed + skipped` holds at every snapshot.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::delivery::outcome::{DeliveryOutcome, OutcomeKind};

/// One failed recipient, for post-hoc reconstruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureEntry {
    pub identifier: String,
    pub row_index: usize,
    pub kind: OutcomeKind,
    pub diagnostic: Option<String>,
    pub at: DateTime<Utc>,
}

/// Running totals for one campaign.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignStats {
    pub run_id: Uuid,
    pub sent: usize,
    pub failed: usize,
    pub skipped: usize,
    pub total: usize,
    pub failures: Vec<FailureEntry>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl CampaignStats {
    /// Records that reached the channel (skipped rows excluded).
    pub fn processed(&self) -> usize {
        self.sent + self.failed
    }

    pub fn success_rate(&self) -> f64 {
        self.sent as f64 / self.processed().max(1) as f64
    }

    /// Time from start to finish, or to `now` while still running.
    pub fn elapsed(&self, now: DateTime<Utc>) -> Duration {
        let end = self.finished_at.unwrap_or(now);
        end.signed_duration_since(self.started_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    pub fn failed_identifiers(&self) -> Vec<String> {
        self.failures.iter().map(|f| f.identifier.clone()).collect()
    }
}

/// Owns the campaign counters; the orchestrator feeds it one outcome per record.
#[derive(Debug, Clone)]
pub struct StatisticsAggregator {
    stats: CampaignStats,
}

impl StatisticsAggregator {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            stats: CampaignStats {
                run_id: Uuid::new_v4(),
                sent: 0,
                failed: 0,
                skipped: 0,
                total: 0,
                failures: Vec::new(),
                started_at,
                finished_at: None,
            },
        }
    }

    pub fn record(&mut self, outcome: &DeliveryOutcome) {
        let stats = &mut self.stats;
        stats.total += 1;
        match outcome.kind {
            OutcomeKind::Success => stats.sent += 1,
            OutcomeKind::Skipped => stats.skipped += 1,
            OutcomeKind::NotFound | OutcomeKind::SendFailed => {
                stats.failed += 1;
                stats.failures.push(FailureEntry {
                    identifier: outcome.record.identifier.clone(),
                    row_index: outcome.record.row_index,
                    kind: outcome.kind,
                    diagnostic: outcome.diagnostic.clone(),
                    at: outcome.at,
                });
            }
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.stats.run_id
    }

    pub fn finish(&mut self, at: DateTime<Utc>) {
        if self.stats.finished_at.is_none() {
            self.stats.finished_at = Some(at);
        }
    }

    pub fn snapshot(&self) -> CampaignStats {
        self.stats.clone()
    }
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Cancelled,
    Aborted,
    DryRun,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Aborted => "aborted",
            Self::DryRun => "dry_run",
        };
        write!(f, "{s}")
    }
}

/// Per-run report handed to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub status: RunStatus,
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub skipped: usize,
    pub failed_identifiers: Vec<String>,
    pub processing_time_seconds: f64,
    pub success_rate: f64,
    /// Records never attempted because the run stopped early.
    pub unprocessed: usize,
    pub abort_reason: Option<String>,
}

impl RunReport {
    pub fn from_stats(
        stats: &CampaignStats,
        status: RunStatus,
        unprocessed: usize,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            run_id: stats.run_id,
            status,
            total: stats.total,
            successful: stats.sent,
            failed: stats.failed,
            skipped: stats.skipped,
            failed_identifiers: stats.failed_identifiers(),
            processing_time_seconds: stats.elapsed(now).as_secs_f64(),
            success_rate: stats.success_rate(),
            unprocessed,
            abort_reason: None,
        }
    }

    pub fn with_abort_reason(mut self, reason: impl Into<String>) -> Self {
        self.abort_reason = Some(reason.into());
        self
    }
}

/// Totals across every campaign run in this process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    pub started_at: DateTime<Utc>,
    pub messages_sent: usize,
    pub messages_failed: usize,
    pub contacts_processed: usize,
    pub campaigns: usize,
}

/// Derived view of [`SessionStats`] at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub duration_seconds: f64,
    pub messages_sent: usize,
    pub messages_failed: usize,
    pub contacts_processed: usize,
    pub campaigns: usize,
    pub success_rate: f64,
    pub average_time_per_message: f64,
}

impl SessionStats {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            messages_sent: 0,
            messages_failed: 0,
            contacts_processed: 0,
            campaigns: 0,
        }
    }

    pub fn absorb(&mut self, report: &RunReport) {
        self.messages_sent += report.successful;
        self.messages_failed += report.failed;
        self.contacts_processed += report.successful + report.failed;
        self.campaigns += 1;
    }

    pub fn snapshot(&self, now: DateTime<Utc>) -> SessionSnapshot {
        let duration = now
            .signed_duration_since(self.started_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
            .as_secs_f64();
        SessionSnapshot {
            duration_seconds: duration,
            messages_sent: self.messages_sent,
            messages_failed: self.messages_failed,
            contacts_processed: self.contacts_processed,
            campaigns: self.campaigns,
            success_rate: self.messages_sent as f64 / self.contacts_processed.max(1) as f64,
            average_time_per_message: duration / self.messages_sent.max(1) as f64,
        }
    }
}
