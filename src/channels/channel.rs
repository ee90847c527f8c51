//! Channel capability trait.
//!
//! The delivery core drives the target application only through these
//! operations. How selectors are interpreted is up to the implementation.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ChannelError;

/// Address of a UI element inside the channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Selector {
    XPath(String),
    Css(String),
}

impl Selector {
    pub fn xpath(expr: impl Into<String>) -> Self {
        Self::XPath(expr.into())
    }

    pub fn css(expr: impl Into<String>) -> Self {
        Self::Css(expr.into())
    }

    pub fn expr(&self) -> &str {
        match self {
            Self::XPath(e) | Self::Css(e) => e,
        }
    }
}

impl std::fmt::Display for Selector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::XPath(e) => write!(f, "xpath:{e}"),
            Self::Css(e) => write!(f, "css:{e}"),
        }
    }
}

/// Automation surface of the target application.
///
/// One channel is one stateful UI session; callers must not use it
/// concurrently.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Element handle produced by `locate`/`wait_for`.
    type Handle: Send + Sync;

    /// Get the name of this channel.
    fn name(&self) -> &str;

    /// Find an element that is present right now.
    async fn locate(&self, selector: &Selector) -> Result<Self::Handle, ChannelError>;

    /// Wait up to `timeout` for an element to become interactable.
    async fn wait_for(
        &self,
        selector: &Selector,
        timeout: Duration,
    ) -> Result<Self::Handle, ChannelError>;

    async fn click(&self, handle: &Self::Handle) -> Result<(), ChannelError>;

    async fn clear(&self, handle: &Self::Handle) -> Result<(), ChannelError>;

    async fn type_text(&self, handle: &Self::Handle, text: &str) -> Result<(), ChannelError>;

    /// Submit the element's content (the Enter key).
    async fn commit(&self, handle: &Self::Handle) -> Result<(), ChannelError>;

    /// Release the underlying session.
    async fn shutdown(&self) -> Result<(), ChannelError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selector_display_and_serde() {
        let sel = Selector::xpath("//span[@title='A']");
        assert_eq!(sel.to_string(), "xpath://span[@title='A']");
        assert_eq!(sel.expr(), "//span[@title='A']");

        let json = serde_json::to_string(&Selector::css("#compose")).unwrap();
        assert_eq!(json, r##"{"kind":"css","value":"#compose"}"##);
        let parsed: Selector = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, Selector::css("#compose"));
    }
}
