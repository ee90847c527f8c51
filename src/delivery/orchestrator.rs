//! Sequential delivery loop.
//!
//! One channel session, one recipient at a time. For every record the
//! orchestrator waits for rate admission, resolves the contact, dispatches the
//! body, and feeds the outcome to the statistics aggregator. Cancellation is
//! honoured only between records, never while a record is in flight.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, error, info, warn};

use crate::channels::Channel;
use crate::config::{CampaignConfig, ChannelSelectors};
use crate::dataset::{RecipientRecord, ValidatedDataset};
use crate::delivery::clock::{CancelSignal, Clock, MonotonicClock};
use crate::delivery::dispatcher::MessageDispatcher;
use crate::delivery::outcome::DeliveryOutcome;
use crate::delivery::rate_limit::{Admission, RateLimiter};
use crate::delivery::resolver::ContactResolver;
use crate::delivery::state::{RecordProgress, RecordState};
use crate::error::Error;
use crate::stats::{RunReport, RunStatus, StatisticsAggregator};

/// A run that stopped on a fatal error. The report holds everything
/// accumulated before the stop.
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct RunFailure {
    #[source]
    pub error: Error,
    pub report: RunReport,
}

enum AdmissionWait {
    Admitted,
    Cancelled,
}

pub struct DeliveryOrchestrator<C: Channel> {
    channel: C,
    resolver: ContactResolver,
    dispatcher: MessageDispatcher,
    limiter: RateLimiter,
    config: CampaignConfig,
    clock: Arc<dyn Clock>,
    cancel: CancelSignal,
    rng: StdRng,
}

impl<C: Channel> DeliveryOrchestrator<C> {
    pub fn new(channel: C, config: CampaignConfig, selectors: ChannelSelectors) -> Self {
        Self {
            resolver: ContactResolver::new(config.resolver.clone(), selectors.clone()),
            dispatcher: MessageDispatcher::new(config.dispatch.clone(), selectors.compose_box),
            limiter: RateLimiter::new(&config.rate_limits),
            channel,
            config,
            clock: Arc::new(MonotonicClock::new()),
            cancel: CancelSignal::new(),
            rng: StdRng::from_entropy(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_cancel_signal(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }

    /// Fix the inter-record delay sequence.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn cancel_signal(&self) -> CancelSignal {
        self.cancel.clone()
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn config(&self) -> &CampaignConfig {
        &self.config
    }

    /// Shut the channel down and hand it back.
    pub async fn into_channel(self) -> C {
        if let Err(e) = self.channel.shutdown().await {
            warn!(channel = self.channel.name(), error = %e, "Channel shutdown failed");
        }
        self.channel
    }

    /// Deliver every record of `dataset` in order.
    ///
    /// Rate-limit state carries over between runs on the same orchestrator.
    pub async fn run(&mut self, dataset: &ValidatedDataset) -> Result<RunReport, RunFailure> {
        let started = self.clock.now();
        let mut stats = StatisticsAggregator::new(started);
        let pending = dataset.records.len();

        if self.config.dry_run {
            info!(
                records = pending,
                skipped = dataset.skipped.len(),
                "Dry run: nothing will be sent"
            );
            return Ok(self.report(&mut stats, RunStatus::DryRun, pending));
        }

        info!(
            run_id = %stats.run_id(),
            channel = self.channel.name(),
            records = pending,
            skipped = dataset.skipped.len(),
            "Starting delivery run"
        );

        for row in &dataset.skipped {
            debug!(row = row.record.row_number(), reason = %row.reason, "Row skipped");
            stats.record(&DeliveryOutcome::skipped(row, started));
        }

        for (i, record) in dataset.records.iter().enumerate() {
            let unprocessed = pending - i;
            if self.cancel.is_cancelled() {
                return Ok(self.cancelled(&mut stats, unprocessed));
            }

            let mut progress = RecordProgress::new(record.row_index);
            if let Err(error) = self.advance(&mut progress, RecordState::RateCheck) {
                return Err(self.failure(&mut stats, error, unprocessed));
            }

            match self.await_admission(record).await {
                Ok(AdmissionWait::Admitted) => {}
                Ok(AdmissionWait::Cancelled) => {
                    return Ok(self.cancelled(&mut stats, unprocessed));
                }
                Err(error) => return Err(self.failure(&mut stats, error, unprocessed)),
            }

            let outcome = match self.deliver(record, &mut progress).await {
                Ok(outcome) => outcome,
                Err(error) => return Err(self.failure(&mut stats, error, unprocessed)),
            };
            stats.record(&outcome);

            if i + 1 < pending {
                let delay = self.next_delay();
                if !delay.is_zero() {
                    debug!(delay_secs = delay.as_secs_f64(), "Waiting before next record");
                    // An interrupted delay is picked up by the check at the top.
                    self.cancel.sleep(delay).await;
                }
            }
        }

        let report = self.report(&mut stats, RunStatus::Completed, 0);
        info!(
            run_id = %report.run_id,
            total = report.total,
            successful = report.successful,
            failed = report.failed,
            skipped = report.skipped,
            seconds = report.processing_time_seconds,
            "Delivery run completed"
        );
        Ok(report)
    }

    async fn await_admission(&mut self, record: &RecipientRecord) -> Result<AdmissionWait, Error> {
        let mut denials = 0u32;
        loop {
            match self.limiter.admit(self.clock.now()) {
                Admission::Allow => return Ok(AdmissionWait::Admitted),
                Admission::Deny {
                    retry_after,
                    reason,
                } => {
                    denials += 1;
                    if denials >= self.config.max_consecutive_denials {
                        error!(
                            identifier = %record.identifier,
                            row = record.row_number(),
                            denials,
                            "Rate limit exhausted; aborting run"
                        );
                        return Err(Error::RateLimitExhausted {
                            denials,
                            last_retry_after: retry_after,
                        });
                    }
                    info!(
                        identifier = %record.identifier,
                        %reason,
                        retry_after_secs = retry_after.as_secs_f64(),
                        denials,
                        "Send not admitted; backing off"
                    );
                    if !self.cancel.sleep(retry_after).await {
                        return Ok(AdmissionWait::Cancelled);
                    }
                }
            }
        }
    }

    async fn deliver(
        &mut self,
        record: &RecipientRecord,
        progress: &mut RecordProgress,
    ) -> Result<DeliveryOutcome, Error> {
        self.advance(progress, RecordState::Resolving)?;
        let handle = match self.resolver.resolve(&self.channel, &record.identifier).await {
            Ok(handle) => {
                self.advance(progress, RecordState::Resolved)?;
                handle
            }
            Err(e) => {
                self.advance(progress, RecordState::NotFound)?;
                let at = self.clock.now();
                warn!(
                    identifier = %record.identifier,
                    row = record.row_number(),
                    kind = "not_found",
                    %at,
                    reason = %e.reason,
                    "Recipient not found"
                );
                return Ok(DeliveryOutcome::not_found(record.clone(), &e, at));
            }
        };

        self.advance(progress, RecordState::Sending)?;
        match self
            .dispatcher
            .dispatch(&self.channel, &handle, &record.message_body)
            .await
        {
            Ok(_) => {
                let at = self.clock.now();
                self.limiter.record(at);
                self.advance(progress, RecordState::Sent)?;
                info!(
                    identifier = %record.identifier,
                    row = record.row_number(),
                    strategy = ?handle.strategy,
                    "Message sent"
                );
                Ok(DeliveryOutcome::success(record.clone(), at))
            }
            Err(e) => {
                self.advance(progress, RecordState::SendFailed)?;
                let at = self.clock.now();
                warn!(
                    identifier = %record.identifier,
                    row = record.row_number(),
                    kind = %e.kind,
                    %at,
                    error = %e.source,
                    "Message not sent"
                );
                Ok(DeliveryOutcome::send_failed(record.clone(), &e, at))
            }
        }
    }

    fn advance(&self, progress: &mut RecordProgress, next: RecordState) -> Result<(), Error> {
        progress.advance(next, self.clock.now())
    }

    fn next_delay(&mut self) -> Duration {
        let range = &self.config.delay;
        if range.is_zero() {
            return Duration::ZERO;
        }
        let min = range.min.as_millis() as u64;
        let max = range.max.as_millis() as u64;
        Duration::from_millis(self.rng.gen_range(min..=max))
    }

    fn report(
        &self,
        stats: &mut StatisticsAggregator,
        status: RunStatus,
        unprocessed: usize,
    ) -> RunReport {
        let now: DateTime<Utc> = self.clock.now();
        stats.finish(now);
        RunReport::from_stats(&stats.snapshot(), status, unprocessed, now)
    }

    fn cancelled(&self, stats: &mut StatisticsAggregator, unprocessed: usize) -> RunReport {
        let report = self.report(stats, RunStatus::Cancelled, unprocessed);
        warn!(
            run_id = %report.run_id,
            successful = report.successful,
            failed = report.failed,
            unprocessed,
            "Delivery run cancelled"
        );
        report
    }

    fn failure(
        &self,
        stats: &mut StatisticsAggregator,
        error: Error,
        unprocessed: usize,
    ) -> RunFailure {
        let report = self
            .report(stats, RunStatus::Aborted, unprocessed)
            .with_abort_reason(error.to_string());
        error!(run_id = %report.run_id, error = %error, unprocessed, "Delivery run aborted");
        RunFailure { error, report }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::simulated::SimulatedChannel;
    use crate::config::DelayRange;
    use crate::dataset::{RawDataset, validate};

    fn dataset(rows: &[&[&str]]) -> ValidatedDataset {
        validate(
            &RawDataset::from_records(&["contact", "message"], rows),
            "contact",
            "message",
        )
        .unwrap()
    }

    fn quick_config() -> CampaignConfig {
        CampaignConfig {
            delay: DelayRange::none(),
            ..CampaignConfig::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn delay_is_drawn_within_range() {
        let config = CampaignConfig {
            delay: DelayRange::from_secs(3, 8).unwrap(),
            ..CampaignConfig::default()
        };
        let selectors = ChannelSelectors::default();
        let mut orch = DeliveryOrchestrator::new(SimulatedChannel::new(selectors.clone()), config, selectors)
            .with_seed(7);
        for _ in 0..50 {
            let d = orch.next_delay();
            assert!(d >= Duration::from_secs(3) && d <= Duration::from_secs(8));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn skipped_rows_are_counted_without_channel_calls() {
        let selectors = ChannelSelectors::default();
        let channel = SimulatedChannel::new(selectors.clone()).with_contact("A");
        let mut orch = DeliveryOrchestrator::new(channel, quick_config(), selectors);

        let report = orch
            .run(&dataset(&[&["A", "hi"], &["", "hi"], &["B", ""]]))
            .await
            .unwrap();
        assert_eq!(report.status, RunStatus::Completed);
        assert_eq!((report.successful, report.failed, report.skipped), (1, 0, 2));
        assert_eq!(report.total, 3);
        assert_eq!(orch.channel().sent().await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_before_start_reports_everything_unprocessed() {
        let selectors = ChannelSelectors::default();
        let channel = SimulatedChannel::accepting_all(selectors.clone());
        let mut orch = DeliveryOrchestrator::new(channel, quick_config(), selectors);
        orch.cancel_signal().cancel();

        let report = orch.run(&dataset(&[&["A", "hi"], &["B", "yo"]])).await.unwrap();
        assert_eq!(report.status, RunStatus::Cancelled);
        assert_eq!(report.unprocessed, 2);
        assert_eq!(orch.channel().commit_count().await, 0);
    }
}
