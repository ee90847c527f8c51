//! Daily campaign scheduling.

use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Local, TimeZone};
use tracing::{info, warn};

use crate::delivery::CancelSignal;
use crate::error::ScheduleError;

/// Fires once a day at a fixed local wall-clock time.
#[derive(Debug, Clone)]
pub struct DailySchedule {
    pub hour: u32,
    pub minute: u32,
    expression: String,
    schedule: cron::Schedule,
}

impl DailySchedule {
    /// Parse `HH:MM` (24-hour).
    pub fn parse(input: &str) -> Result<Self, ScheduleError> {
        let invalid = || ScheduleError::InvalidTime {
            input: input.to_string(),
        };
        let (h, m) = input.trim().split_once(':').ok_or_else(invalid)?;
        if h.is_empty() || h.len() > 2 || m.len() != 2 {
            return Err(invalid());
        }
        let hour: u32 = h.parse().map_err(|_| invalid())?;
        let minute: u32 = m.parse().map_err(|_| invalid())?;
        if hour > 23 || minute > 59 {
            return Err(invalid());
        }

        let expression = format!("0 {minute} {hour} * * *");
        let schedule =
            cron::Schedule::from_str(&expression).map_err(|e| ScheduleError::InvalidCron {
                expression: expression.clone(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            hour,
            minute,
            expression,
            schedule,
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// First fire time strictly after `after`.
    pub fn next_after<Tz: TimeZone>(&self, after: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        self.schedule.after(after).next()
    }
}

impl std::fmt::Display for DailySchedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

/// Run `job` at every fire time until `cancel` fires. Returns the number of
/// completed runs.
///
/// The job runs to completion even if cancellation arrives meanwhile; the
/// loop stops before the next wait.
pub async fn run_daily<F, Fut>(
    schedule: &DailySchedule,
    cancel: &CancelSignal,
    mut job: F,
) -> Result<usize, ScheduleError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    let mut runs = 0;
    while !cancel.is_cancelled() {
        let now = Local::now();
        let next = schedule
            .next_after(&now)
            .ok_or_else(|| ScheduleError::Exhausted {
                expression: schedule.expression.clone(),
            })?;
        let wait = next
            .signed_duration_since(now)
            .to_std()
            .unwrap_or(Duration::ZERO);
        info!(next_run = %next.format("%Y-%m-%d %H:%M"), wait_secs = wait.as_secs(), "Waiting for scheduled run");

        if !cancel.sleep(wait).await {
            break;
        }
        info!(at = %schedule, "Executing scheduled campaign");
        job().await;
        runs += 1;
    }
    if runs == 0 {
        warn!("Schedule stopped before the first run");
    }
    Ok(runs)
}
