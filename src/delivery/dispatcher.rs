//! Message composition and commit on an already-open conversation.

use tracing::{debug, warn};

use crate::channels::{Channel, Selector};
use crate::config::DispatchConfig;
use crate::delivery::resolver::ResolvedHandle;
use crate::error::{ChannelError, DispatchError};

/// Confirmation that the commit action went through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sent {
    pub identifier: String,
    pub chars: usize,
}

/// Types a body into the compose surface and commits it. Never retries.
pub struct MessageDispatcher {
    config: DispatchConfig,
    compose_box: Selector,
}

impl MessageDispatcher {
    pub fn new(config: DispatchConfig, compose_box: Selector) -> Self {
        Self {
            config,
            compose_box,
        }
    }

    pub async fn dispatch<C: Channel>(
        &self,
        channel: &C,
        handle: &ResolvedHandle,
        body: &str,
    ) -> Result<Sent, DispatchError> {
        match self.compose_and_commit(channel, body).await {
            Ok(()) => {
                debug!(identifier = %handle.identifier, chars = body.chars().count(), "Message committed");
                Ok(Sent {
                    identifier: handle.identifier.clone(),
                    chars: body.chars().count(),
                })
            }
            Err(source) => {
                let err = DispatchError::classify(handle.identifier.clone(), source);
                warn!(identifier = %handle.identifier, kind = %err.kind, error = %err.source, "Dispatch failed");
                Err(err)
            }
        }
    }

    async fn compose_and_commit<C: Channel>(
        &self,
        channel: &C,
        body: &str,
    ) -> Result<(), ChannelError> {
        let compose = channel
            .wait_for(&self.compose_box, self.config.compose_timeout)
            .await?;
        channel.click(&compose).await?;
        channel.clear(&compose).await?;
        channel.type_text(&compose, body).await?;
        tokio::time::sleep(self.config.settle_before_commit).await;
        channel.commit(&compose).await?;
        tokio::time::sleep(self.config.settle_after_commit).await;
        Ok(())
    }
}
