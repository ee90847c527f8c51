//! WebDriver channel: drives the web application through thirtyfour.
//!
//! Session bootstrap: connect, open the application with
//! a persistent profile, and wait (bounded) until the search box shows up,
//! which means the user finished logging in.

use std::time::Duration;

use async_trait::async_trait;
use thirtyfour::error::WebDriverErrorInner;
use thirtyfour::prelude::*;
use tracing::{info, warn};

use crate::channels::{Channel, Selector};
use crate::config::WebDriverConfig;
use crate::error::ChannelError;

const CHANNEL_NAME: &str = "webdriver";

/// Polling interval for element waits.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// A located element together with the selector that found it.
#[derive(Clone)]
pub struct DriverElement {
    element: WebElement,
    selector: String,
}

/// Channel backed by a live WebDriver session.
pub struct WebDriverChannel {
    driver: WebDriver,
    config: WebDriverConfig,
}

impl WebDriverChannel {
    /// Start a browser, open the application and wait for an authenticated UI.
    pub async fn connect(config: WebDriverConfig) -> Result<Self, ChannelError> {
        info!(
            url = %config.webdriver_url,
            profile = %config.profile_dir,
            headless = config.headless,
            "Starting WebDriver session"
        );

        let caps = build_capabilities(&config)?;
        let driver = WebDriver::new(&config.webdriver_url, caps)
            .await
            .map_err(|e| startup_failed(format!("failed to start browser: {e}")))?;

        driver
            .goto(config.app_url.as_str())
            .await
            .map_err(|e| startup_failed(format!("failed to open {}: {e}", config.app_url)))?;

        let channel = Self { driver, config };

        info!(
            timeout_secs = channel.config.login_timeout.as_secs(),
            "Waiting for the application to finish logging in"
        );
        let search_box = channel.config.selectors.search_box.clone();
        if let Err(e) = channel
            .wait_for(&search_box, channel.config.login_timeout)
            .await
        {
            warn!(error = %e, "Login was not completed in time");
            let _ = channel.shutdown().await;
            return Err(startup_failed(
                "login not completed; scan the QR code in the browser window and retry",
            ));
        }

        info!("Application ready");
        Ok(channel)
    }

    pub fn config(&self) -> &WebDriverConfig {
        &self.config
    }
}

fn startup_failed(reason: impl Into<String>) -> ChannelError {
    ChannelError::StartupFailed {
        name: CHANNEL_NAME.to_string(),
        reason: reason.into(),
    }
}

fn build_capabilities(config: &WebDriverConfig) -> Result<Capabilities, ChannelError> {
    let mut caps = DesiredCapabilities::chrome();
    let mut args = vec![
        format!("--user-data-dir={}", config.profile_dir),
        "--disable-blink-features=AutomationControlled".to_string(),
        "--no-sandbox".to_string(),
        "--disable-dev-shm-usage".to_string(),
    ];
    if config.headless {
        args.push("--headless=new".to_string());
        args.push("--window-size=1920,1080".to_string());
    }
    for arg in &args {
        caps.add_arg(arg)
            .map_err(|e| startup_failed(format!("failed to add arg '{arg}': {e}")))?;
    }
    Ok(caps.into())
}

fn by(selector: &Selector) -> By {
    match selector {
        Selector::XPath(expr) => By::XPath(expr.as_str()),
        Selector::Css(expr) => By::Css(expr.as_str()),
    }
}

/// Map a driver failure on an element action to the channel taxonomy.
fn action_error(selector: &str, err: WebDriverError) -> ChannelError {
    match err.as_inner() {
        WebDriverErrorInner::ElementClickIntercepted(_) => ChannelError::Intercepted {
            selector: selector.to_string(),
        },
        _ => ChannelError::Operation(format!("{selector}: {err}")),
    }
}

/// Map a failed element lookup. Only a missing element counts as absent
/// (or timed out, for bounded waits); session and transport failures stay
/// generic.
fn lookup_error(selector: &Selector, timeout: Option<Duration>, err: WebDriverError) -> ChannelError {
    match (err.as_inner(), timeout) {
        (
            WebDriverErrorInner::NoSuchElement(_)
            | WebDriverErrorInner::Timeout(_)
            | WebDriverErrorInner::WebDriverTimeout(_),
            Some(timeout),
        ) => ChannelError::ElementTimeout {
            selector: selector.to_string(),
            timeout,
        },
        (WebDriverErrorInner::NoSuchElement(_), None) => ChannelError::NotPresent {
            selector: selector.to_string(),
        },
        _ => action_error(&selector.to_string(), err),
    }
}

#[async_trait]
impl Channel for WebDriverChannel {
    type Handle = DriverElement;

    fn name(&self) -> &str {
        CHANNEL_NAME
    }

    async fn locate(&self, selector: &Selector) -> Result<DriverElement, ChannelError> {
        let element = self
            .driver
            .find(by(selector))
            .await
            .map_err(|e| lookup_error(selector, None, e))?;
        Ok(DriverElement {
            element,
            selector: selector.to_string(),
        })
    }

    async fn wait_for(
        &self,
        selector: &Selector,
        timeout: Duration,
    ) -> Result<DriverElement, ChannelError> {
        let element = self
            .driver
            .query(by(selector))
            .wait(timeout, POLL_INTERVAL)
            .and_clickable()
            .first()
            .await
            .map_err(|e| lookup_error(selector, Some(timeout), e))?;
        Ok(DriverElement {
            element,
            selector: selector.to_string(),
        })
    }

    async fn click(&self, handle: &DriverElement) -> Result<(), ChannelError> {
        handle
            .element
            .click()
            .await
            .map_err(|e| action_error(&handle.selector, e))
    }

    async fn clear(&self, handle: &DriverElement) -> Result<(), ChannelError> {
        handle
            .element
            .clear()
            .await
            .map_err(|e| action_error(&handle.selector, e))
    }

    async fn type_text(&self, handle: &DriverElement, text: &str) -> Result<(), ChannelError> {
        handle
            .element
            .send_keys(text)
            .await
            .map_err(|e| action_error(&handle.selector, e))
    }

    async fn commit(&self, handle: &DriverElement) -> Result<(), ChannelError> {
        handle
            .element
            .send_keys("\n")
            .await
            .map_err(|e| action_error(&handle.selector, e))
    }

    async fn shutdown(&self) -> Result<(), ChannelError> {
        self.driver
            .clone()
            .quit()
            .await
            .map_err(|e| ChannelError::Disconnected {
                name: CHANNEL_NAME.to_string(),
                reason: e.to_string(),
            })
    }
}
