//! Contact resolution: exact title match first, then best-effort first result.
//!
//! The best-effort confirmation only checks that *a* compose surface appeared
//! after clicking the first search result. It does not check that the opened
//! conversation belongs to the intended recipient, so a fuzzy search hit can
//! be reported as resolved for the wrong person. This is a known false-positive
//! risk of the best-effort strategy and is reported through
//! [`MatchStrategy::BestEffort`] so callers can tell the two apart.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::channels::Channel;
use crate::config::{ChannelSelectors, ResolverConfig};
use crate::error::{ChannelError, ResolveError};

/// How a recipient was located.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStrategy {
    /// A search entry titled exactly like the identifier.
    Exact,
    /// The first search result, confirmed only by a compose surface appearing.
    BestEffort,
}

/// A recipient whose conversation is open in the channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedHandle {
    pub identifier: String,
    pub strategy: MatchStrategy,
}

pub struct ContactResolver {
    config: ResolverConfig,
    selectors: ChannelSelectors,
}

impl ContactResolver {
    pub fn new(config: ResolverConfig, selectors: ChannelSelectors) -> Self {
        Self { config, selectors }
    }

    /// Locate `identifier` and leave the channel on its conversation.
    ///
    /// On failure the channel may be left anywhere; the next call starts by
    /// re-focusing the search box.
    pub async fn resolve<C: Channel>(
        &self,
        channel: &C,
        identifier: &str,
    ) -> Result<ResolvedHandle, ResolveError> {
        self.search(channel, identifier)
            .await
            .map_err(|e| not_found(identifier, format!("search box unavailable: {e}")))?;

        match self.exact_match(channel, identifier).await {
            Ok(()) => {
                debug!(identifier, "Resolved by exact title");
                return Ok(ResolvedHandle {
                    identifier: identifier.to_string(),
                    strategy: MatchStrategy::Exact,
                });
            }
            Err(e) => debug!(identifier, error = %e, "No exact title match; trying first result"),
        }

        match self.best_effort(channel).await {
            Ok(()) => {
                info!(
                    identifier,
                    "Resolved by first search result (conversation not verified against recipient)"
                );
                Ok(ResolvedHandle {
                    identifier: identifier.to_string(),
                    strategy: MatchStrategy::BestEffort,
                })
            }
            Err(reason) => {
                warn!(identifier, %reason, "Contact not found");
                Err(not_found(identifier, reason))
            }
        }
    }

    async fn search<C: Channel>(&self, channel: &C, identifier: &str) -> Result<(), ChannelError> {
        let search_box = channel
            .wait_for(&self.selectors.search_box, self.config.resolution_timeout)
            .await?;
        channel.click(&search_box).await?;
        channel.clear(&search_box).await?;
        channel.type_text(&search_box, identifier).await?;
        tokio::time::sleep(self.config.search_settle).await;
        Ok(())
    }

    async fn exact_match<C: Channel>(
        &self,
        channel: &C,
        identifier: &str,
    ) -> Result<(), ChannelError> {
        let title = self.selectors.contact_title(identifier);
        let entry = channel
            .wait_for(&title, self.config.resolution_timeout)
            .await?;
        channel.click(&entry).await
    }

    async fn best_effort<C: Channel>(&self, channel: &C) -> Result<(), String> {
        let first = channel
            .wait_for(&self.selectors.first_result, self.config.fallback_timeout)
            .await
            .map_err(|e| format!("no search results: {e}"))?;
        channel
            .click(&first)
            .await
            .map_err(|e| format!("could not open first result: {e}"))?;

        tokio::time::sleep(self.config.confirmation_settle).await;
        channel
            .wait_for(&self.selectors.compose_box, self.config.confirmation_timeout)
            .await
            .map_err(|_| "first result did not open a conversation".to_string())?;
        Ok(())
    }
}

fn not_found(identifier: &str, reason: impl Into<String>) -> ResolveError {
    ResolveError {
        identifier: identifier.to_string(),
        reason: reason.into(),
    }
}
