//! Configuration types.
//!
//! Values start from [`Default`], are overlaid with `COURIER_*` environment
//! variables by [`CampaignConfig::from_env`], and finally with CLI flags.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::channels::Selector;
use crate::error::ConfigError;

/// Per-window send ceilings plus the cooldown applied after a denial.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimits {
    pub per_minute: u32,
    pub per_hour: u32,
    pub per_day: u32,
    /// Minimum backoff after a denial. Zero backs off only until the denying
    /// window has room.
    pub cooldown: Duration,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            per_minute: 10,
            per_hour: 50,
            per_day: 200,
            cooldown: Duration::from_secs(5 * 60),
        }
    }
}

/// Timing used by the contact resolver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Upper bound for the search box and the exact-title match.
    pub resolution_timeout: Duration,
    /// Upper bound for the first search result to appear.
    pub fallback_timeout: Duration,
    /// Pause after typing the search query so results can render.
    pub search_settle: Duration,
    /// Pause after clicking the first result before verifying.
    pub confirmation_settle: Duration,
    /// How long the compose surface has to appear after a best-effort click.
    pub confirmation_timeout: Duration,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            resolution_timeout: Duration::from_secs(20),
            fallback_timeout: Duration::from_secs(20),
            search_settle: Duration::from_secs(2),
            confirmation_settle: Duration::from_secs(1),
            confirmation_timeout: Duration::from_secs(2),
        }
    }
}

/// Timing used by the message dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchConfig {
    pub compose_timeout: Duration,
    pub settle_before_commit: Duration,
    pub settle_after_commit: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            compose_timeout: Duration::from_secs(20),
            settle_before_commit: Duration::from_secs(1),
            settle_after_commit: Duration::from_secs(1),
        }
    }
}

/// Uniform range for the randomized pause between records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayRange {
    pub min: Duration,
    pub max: Duration,
}

impl DelayRange {
    pub fn new(min: Duration, max: Duration) -> Result<Self, ConfigError> {
        if min > max {
            return Err(ConfigError::InvalidValue {
                key: "delay range".to_string(),
                message: format!("minimum {min:?} exceeds maximum {max:?}"),
            });
        }
        Ok(Self { min, max })
    }

    pub fn from_secs(min: u64, max: u64) -> Result<Self, ConfigError> {
        Self::new(Duration::from_secs(min), Duration::from_secs(max))
    }

    /// Range used for full campaigns launched from the CLI.
    pub fn campaign() -> Self {
        Self {
            min: Duration::from_secs(5),
            max: Duration::from_secs(10),
        }
    }

    pub fn none() -> Self {
        Self {
            min: Duration::ZERO,
            max: Duration::ZERO,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.max.is_zero()
    }
}

impl Default for DelayRange {
    fn default() -> Self {
        Self {
            min: Duration::from_secs(3),
            max: Duration::from_secs(8),
        }
    }
}

/// Names of the required dataset columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnNames {
    pub contact: String,
    pub message: String,
}

impl Default for ColumnNames {
    fn default() -> Self {
        Self {
            contact: "contact".to_string(),
            message: "message".to_string(),
        }
    }
}

/// Full campaign configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignConfig {
    pub rate_limits: RateLimits,
    pub resolver: ResolverConfig,
    pub dispatch: DispatchConfig,
    pub delay: DelayRange,
    pub columns: ColumnNames,
    /// Validate and preview only; never touch the channel.
    pub dry_run: bool,
    /// Consecutive rate-limit denials tolerated for one record before the run aborts.
    pub max_consecutive_denials: u32,
}

impl Default for CampaignConfig {
    fn default() -> Self {
        Self {
            rate_limits: RateLimits::default(),
            resolver: ResolverConfig::default(),
            dispatch: DispatchConfig::default(),
            delay: DelayRange::default(),
            columns: ColumnNames::default(),
            dry_run: false,
            max_consecutive_denials: 12,
        }
    }
}

impl CampaignConfig {
    /// Build config from defaults overlaid with `COURIER_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from defaults overlaid with values from `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let limits = &mut config.rate_limits;

        if let Some(v) = parse_var::<u32, _>(&lookup, "COURIER_MAX_PER_MINUTE")? {
            limits.per_minute = v;
        }
        if let Some(v) = parse_var::<u32, _>(&lookup, "COURIER_MAX_PER_HOUR")? {
            limits.per_hour = v;
        }
        if let Some(v) = parse_var::<u32, _>(&lookup, "COURIER_MAX_PER_DAY")? {
            limits.per_day = v;
        }
        if let Some(v) = parse_var::<u64, _>(&lookup, "COURIER_COOLDOWN_SECS")? {
            limits.cooldown = Duration::from_secs(v);
        }
        if let Some(v) = parse_var::<u64, _>(&lookup, "COURIER_RESOLUTION_TIMEOUT_SECS")? {
            config.resolver.resolution_timeout = Duration::from_secs(v);
            config.resolver.fallback_timeout = Duration::from_secs(v);
            config.dispatch.compose_timeout = Duration::from_secs(v);
        }
        if let Some(v) = parse_var::<u64, _>(&lookup, "COURIER_SEND_SETTLE_MS")? {
            config.dispatch.settle_before_commit = Duration::from_millis(v);
            config.dispatch.settle_after_commit = Duration::from_millis(v);
        }

        let delay_min = parse_var::<u64, _>(&lookup, "COURIER_DELAY_MIN_SECS")?;
        let delay_max = parse_var::<u64, _>(&lookup, "COURIER_DELAY_MAX_SECS")?;
        if delay_min.is_some() || delay_max.is_some() {
            let min = delay_min.map(Duration::from_secs).unwrap_or(config.delay.min);
            let max = delay_max.map(Duration::from_secs).unwrap_or(config.delay.max);
            config.delay = DelayRange::new(min, max)?;
        }

        if let Some(v) = lookup("COURIER_CONTACT_COLUMN") {
            config.columns.contact = v;
        }
        if let Some(v) = lookup("COURIER_MESSAGE_COLUMN") {
            config.columns.message = v;
        }
        if let Some(v) = parse_var::<bool, _>(&lookup, "COURIER_DRY_RUN")? {
            config.dry_run = v;
        }
        if let Some(v) = parse_var::<u32, _>(&lookup, "COURIER_MAX_DENIALS")? {
            config.max_consecutive_denials = v;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make the run meaningless.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let limits = &self.rate_limits;
        for (key, value) in [
            ("per-minute ceiling", limits.per_minute),
            ("per-hour ceiling", limits.per_hour),
            ("per-day ceiling", limits.per_day),
            ("max consecutive denials", self.max_consecutive_denials),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: "must be greater than zero".to_string(),
                });
            }
        }
        if self.delay.min > self.delay.max {
            return Err(ConfigError::InvalidValue {
                key: "delay range".to_string(),
                message: format!(
                    "minimum {:?} exceeds maximum {:?}",
                    self.delay.min, self.delay.max
                ),
            });
        }
        if self.columns.contact.trim().is_empty() || self.columns.message.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "columns".to_string(),
                message: "column names must not be blank".to_string(),
            });
        }
        Ok(())
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("{raw:?}: {e}"),
            }),
    }
}

/// UI selectors for the target web application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSelectors {
    pub search_box: Selector,
    pub compose_box: Selector,
    /// XPath template for a search entry whose title equals the query; `{}` is
    /// replaced with an XPath string literal.
    pub contact_title_template: String,
    pub first_result: Selector,
}

impl Default for ChannelSelectors {
    fn default() -> Self {
        Self {
            search_box: Selector::xpath("//div[@contenteditable='true'][@data-tab='3']"),
            compose_box: Selector::xpath("//div[@contenteditable='true'][@data-tab='6']"),
            contact_title_template: "//span[@title={}]".to_string(),
            first_result: Selector::xpath("//div[@data-testid='cell-frame-container'][1]"),
        }
    }
}

impl ChannelSelectors {
    /// Selector for a search entry titled exactly `identifier` (case-sensitive).
    pub fn contact_title(&self, identifier: &str) -> Selector {
        Selector::xpath(
            self.contact_title_template
                .replace("{}", &xpath_literal(identifier)),
        )
    }
}

/// Quote `value` as an XPath 1.0 string literal.
fn xpath_literal(value: &str) -> String {
    if !value.contains('\'') {
        return format!("'{value}'");
    }
    if !value.contains('"') {
        return format!("\"{value}\"");
    }
    let parts: Vec<String> = value
        .split('\'')
        .map(|part| format!("'{part}'"))
        .collect();
    format!("concat({})", parts.join(", \"'\", "))
}

/// WebDriver session settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebDriverConfig {
    pub webdriver_url: String,
    pub app_url: String,
    /// Chrome profile directory; keeps the login across runs.
    pub profile_dir: String,
    pub headless: bool,
    /// How long to wait for the user to finish authenticating.
    pub login_timeout: Duration,
    pub selectors: ChannelSelectors,
}

impl Default for WebDriverConfig {
    fn default() -> Self {
        Self {
            webdriver_url: "http://localhost:9515".to_string(),
            app_url: "https://web.whatsapp.com".to_string(),
            profile_dir: "./courier_profile".to_string(),
            headless: false,
            login_timeout: Duration::from_secs(60),
            selectors: ChannelSelectors::default(),
        }
    }
}
