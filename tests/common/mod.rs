//! Shared helpers for delivery integration tests.

#![allow(dead_code)]

use std::time::Duration;

use bulk_courier::channels::SimulatedChannel;
use bulk_courier::config::{CampaignConfig, ChannelSelectors, DelayRange};
use bulk_courier::dataset::{RawDataset, ValidatedDataset, validate};
use bulk_courier::delivery::DeliveryOrchestrator;

/// Default config without inter-record delays.
pub fn fast_config() -> CampaignConfig {
    CampaignConfig {
        delay: DelayRange::none(),
        ..CampaignConfig::default()
    }
}

pub fn config_with_limits(per_minute: u32, per_hour: u32, cooldown_secs: u64) -> CampaignConfig {
    let mut config = fast_config();
    config.rate_limits.per_minute = per_minute;
    config.rate_limits.per_hour = per_hour;
    config.rate_limits.cooldown = Duration::from_secs(cooldown_secs);
    config
}

/// Validate `(contact, message)` rows with the default column names.
pub fn dataset(rows: &[&[&str]]) -> ValidatedDataset {
    let raw = RawDataset::from_records(&["contact", "message"], rows);
    validate(&raw, "contact", "message").expect("dataset should validate")
}

pub fn channel_with(contacts: &[&str]) -> SimulatedChannel {
    contacts
        .iter()
        .fold(SimulatedChannel::new(ChannelSelectors::default()), |ch, name| {
            ch.with_contact(*name)
        })
}

pub fn orchestrator(
    channel: SimulatedChannel,
    config: CampaignConfig,
) -> DeliveryOrchestrator<SimulatedChannel> {
    DeliveryOrchestrator::new(channel, config, ChannelSelectors::default()).with_seed(42)
}
