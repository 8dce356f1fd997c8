//! Schedule runner
//!
//! Fires the export job on a fixed interval, optionally restricted to a
//! daily time window on selected weekdays.

use std::future::Future;
use std::time::Duration;

use chrono::{Datelike, Local, NaiveTime, Weekday};
use tracing::{debug, info};

/// Schedule configuration
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleConfig {
    /// Keep running on a timer (false = one run, then exit)
    pub enabled: bool,
    /// Minutes between runs
    pub interval_minutes: u64,
    /// Window start time (HH:MM format)
    pub start_time: String,
    /// Window end time (HH:MM format)
    pub end_time: String,
    /// Days of the week to run (0 = Monday, 6 = Sunday)
    pub days: Vec<u8>,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_minutes: 15,
            start_time: "00:00".to_string(),
            end_time: "23:59".to_string(),
            days: vec![0, 1, 2, 3, 4, 5, 6],
        }
    }
}

impl ScheduleConfig {
    /// Check if current time is within the scheduled window
    pub fn is_within_schedule(&self) -> bool {
        if !self.enabled {
            return true; // If scheduling disabled, always allow
        }

        let now = Local::now();

        // Check day of week
        let today = match now.weekday() {
            Weekday::Mon => 0,
            Weekday::Tue => 1,
            Weekday::Wed => 2,
            Weekday::Thu => 3,
            Weekday::Fri => 4,
            Weekday::Sat => 5,
            Weekday::Sun => 6,
        };

        if !self.days.contains(&today) {
            debug!("Today ({}) not in scheduled days: {:?}", today, self.days);
            return false;
        }

        // Parse start and end times
        let start = match NaiveTime::parse_from_str(&self.start_time, "%H:%M") {
            Ok(t) => t,
            Err(_) => {
                debug!("Invalid start time format: {}", self.start_time);
                return true;
            }
        };

        let end = match NaiveTime::parse_from_str(&self.end_time, "%H:%M") {
            Ok(t) => t,
            Err(_) => {
                debug!("Invalid end time format: {}", self.end_time);
                return true;
            }
        };

        let current_time = now.time();

        // Handle overnight schedules (e.g., 22:00 - 06:00)
        if start > end {
            return current_time >= start || current_time <= end;
        }

        current_time >= start && current_time <= end
    }

    /// Interval between runs, floored at one minute
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_minutes.max(1) * 60)
    }
}

/// Periodic trigger for the export job
pub struct Scheduler {
    config: ScheduleConfig,
}

impl Scheduler {
    /// Create a scheduler with the given config
    pub fn new(config: ScheduleConfig) -> Self {
        Self { config }
    }

    /// Run `job` on the configured interval, skipping ticks that fall
    /// outside the daily window. Never returns.
    pub async fn run<F, Fut>(&self, mut job: F)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ()>,
    {
        let interval = self.config.interval();
        info!(
            "Scheduler started (every {} min, window {}-{})",
            self.config.interval_minutes, self.config.start_time, self.config.end_time
        );

        loop {
            if self.config.is_within_schedule() {
                job().await;
            } else {
                debug!("Outside schedule window, skipping run");
            }

            tokio::time::sleep(interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schedule_config_default() {
        let config = ScheduleConfig::default();
        assert!(!config.enabled);
        assert_eq!(config.interval_minutes, 15);
        assert_eq!(config.start_time, "00:00");
        assert_eq!(config.end_time, "23:59");
        assert_eq!(config.days, vec![0, 1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_disabled_schedule_always_allows() {
        let config = ScheduleConfig {
            enabled: false,
            days: vec![],
            ..Default::default()
        };
        assert!(config.is_within_schedule());
    }

    #[test]
    fn test_enabled_schedule_respects_day_mask() {
        let config = ScheduleConfig {
            enabled: true,
            days: vec![], // no day allowed
            ..Default::default()
        };
        assert!(!config.is_within_schedule());
    }

    #[test]
    fn test_interval_floor() {
        let config = ScheduleConfig {
            interval_minutes: 0,
            ..Default::default()
        };
        assert_eq!(config.interval(), Duration::from_secs(60));
    }
}
