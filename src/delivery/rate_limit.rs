//! Sliding-window send admission with cooldown backoff.
//!
//! Three rolling windows (minute, hour, day) count recorded sends. A send is
//! admitted only while every window is under its ceiling and no cooldown is
//! active. Any window denial starts a cooldown during which everything is
//! denied, so retries don't oscillate right at the window edge. The cooldown
//! always lasts at least until the denying window has room again; a zero
//! configured cooldown means exactly that long.

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::RateLimits;

/// Which constraint produced a denial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    Minute,
    Hour,
    Day,
    Cooldown,
}

impl std::fmt::Display for DenyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Minute => "per-minute limit",
            Self::Hour => "per-hour limit",
            Self::Day => "per-day limit",
            Self::Cooldown => "cooldown",
        };
        f.write_str(s)
    }
}

/// Admission decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allow,
    Deny {
        retry_after: Duration,
        reason: DenyReason,
    },
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

#[derive(Debug, Clone)]
struct Window {
    span: chrono::Duration,
    ceiling: u32,
    sends: VecDeque<DateTime<Utc>>,
}

impl Window {
    fn new(span_secs: i64, ceiling: u32) -> Self {
        Self {
            span: chrono::Duration::seconds(span_secs),
            ceiling,
            sends: VecDeque::new(),
        }
    }

    /// Drop sends that fell out of the trailing window ending at `now`.
    fn prune(&mut self, now: DateTime<Utc>) {
        while let Some(oldest) = self.sends.front() {
            if now.signed_duration_since(*oldest) >= self.span {
                self.sends.pop_front();
            } else {
                break;
            }
        }
    }

    fn is_full(&self) -> bool {
        self.sends.len() >= self.ceiling as usize
    }

    /// Time until enough sends expire for one more to fit. Call after `prune`.
    fn time_until_room(&self, now: DateTime<Utc>) -> Duration {
        let excess = (self.sends.len() + 1).saturating_sub(self.ceiling as usize);
        let Some(blocking) = excess.checked_sub(1).and_then(|i| self.sends.get(i)) else {
            return Duration::ZERO;
        };
        (*blocking + self.span)
            .signed_duration_since(now)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }
}

/// Counts per window at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowUsage {
    pub minute: usize,
    pub hour: usize,
    pub day: usize,
    pub cooldown_until: Option<DateTime<Utc>>,
}

/// Multi-window rate limiter. Owned by the orchestrator; not shared.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    minute: Window,
    hour: Window,
    day: Window,
    cooldown: Duration,
    cooldown_until: Option<DateTime<Utc>>,
}

impl RateLimiter {
    pub fn new(limits: &RateLimits) -> Self {
        Self {
            minute: Window::new(60, limits.per_minute),
            hour: Window::new(3_600, limits.per_hour),
            day: Window::new(86_400, limits.per_day),
            cooldown: limits.cooldown,
            cooldown_until: None,
        }
    }

    /// Decide whether a send may happen at `now`.
    pub fn admit(&mut self, now: DateTime<Utc>) -> Admission {
        self.minute.prune(now);
        self.hour.prune(now);
        self.day.prune(now);

        if let Some(until) = self.cooldown_until {
            if now < until {
                let retry_after = until
                    .signed_duration_since(now)
                    .to_std()
                    .unwrap_or(Duration::ZERO);
                debug!(retry_after_secs = retry_after.as_secs_f64(), "Denied: cooldown active");
                return Admission::Deny {
                    retry_after,
                    reason: DenyReason::Cooldown,
                };
            }
            self.cooldown_until = None;
        }

        let denying = [
            (&self.minute, DenyReason::Minute),
            (&self.hour, DenyReason::Hour),
            (&self.day, DenyReason::Day),
        ]
        .into_iter()
        .find(|(window, _)| window.is_full())
        .map(|(window, reason)| (reason, window.time_until_room(now)));

        match denying {
            None => Admission::Allow,
            Some((reason, room_in)) => {
                let retry_after = self.cooldown.max(room_in);
                let until = chrono::Duration::from_std(retry_after)
                    .ok()
                    .and_then(|d| now.checked_add_signed(d))
                    .unwrap_or(DateTime::<Utc>::MAX_UTC);
                self.cooldown_until = Some(until);
                warn!(
                    %reason,
                    retry_after_secs = retry_after.as_secs(),
                    minute = self.minute.sends.len(),
                    hour = self.hour.sends.len(),
                    day = self.day.sends.len(),
                    "Send rate ceiling reached; entering cooldown"
                );
                Admission::Deny {
                    retry_after,
                    reason,
                }
            }
        }
    }

    /// Count one admitted send. Call exactly once per message that went out.
    pub fn record(&mut self, at: DateTime<Utc>) {
        self.minute.sends.push_back(at);
        self.hour.sends.push_back(at);
        self.day.sends.push_back(at);
    }

    pub fn usage(&self) -> WindowUsage {
        WindowUsage {
            minute: self.minute.sends.len(),
            hour: self.hour.sends.len(),
            day: self.day.sends.len(),
            cooldown_until: self.cooldown_until,
        }
    }
}
