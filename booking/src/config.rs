//! Configuration management for tablebook.
//!
//! Loads configuration from environment variables with sensible defaults.
//! `Default` for every section equals what `from_env` yields with no
//! variables set.

use crate::notify::DeliveryMode;
use crate::types::TableType;
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;
use tablebook_runtime::RetryPolicy;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Sweep cadence, reminder thresholds and retry policy
    pub scheduler: SchedulerConfig,
    /// Notification delivery settings
    pub notification: NotificationConfig,
    /// Price multipliers and party size limit
    pub pricing: PricingConfig,
}

/// Reminder scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between sweeps
    pub sweep_interval_secs: u64,
    /// Reminder lead times in minutes before start
    pub reminder_thresholds: Vec<u32>,
    /// Dispatch attempts per reminder, the first one included
    pub retry_max_attempts: u32,
    /// Seconds before the first reminder retry
    pub retry_delay_secs: u64,
    /// Growth factor of the retry delay; `1.0` keeps retries evenly spaced
    pub retry_multiplier: f64,
    /// Upper bound on the retry delay, seconds
    pub retry_max_delay_secs: u64,
    /// Seconds a reservation may stay pending before it is canceled
    pub payment_timeout_secs: u64,
    /// Seconds to wait for timers and follow-ups on shutdown
    pub shutdown_timeout_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: 300,
            reminder_thresholds: vec![30],
            retry_max_attempts: 3,
            retry_delay_secs: 300,
            retry_multiplier: 1.0,
            retry_max_delay_secs: 3600,
            payment_timeout_secs: 900,
            shutdown_timeout_secs: 10,
        }
    }
}

impl SchedulerConfig {
    /// Time between sweeps, at least one second
    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }

    /// Time before the first reminder retry
    #[must_use]
    pub const fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    /// Retry policy for failed reminder rounds.
    ///
    /// A multiplier that is not a finite number of at least `1.0` falls back
    /// to even spacing.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        let multiplier = if self.retry_multiplier.is_finite() && self.retry_multiplier >= 1.0 {
            self.retry_multiplier
        } else {
            1.0
        };
        RetryPolicy::builder()
            .max_attempts(self.retry_max_attempts)
            .delay(self.retry_delay())
            .max_delay(Duration::from_secs(self.retry_max_delay_secs.max(self.retry_delay_secs)))
            .multiplier(multiplier)
            .build()
    }

    /// How long a reservation may wait for payment
    #[must_use]
    pub fn payment_timeout(&self) -> chrono::Duration {
        chrono::Duration::seconds(i64::try_from(self.payment_timeout_secs).unwrap_or(i64::MAX))
    }

    /// Graceful shutdown budget
    #[must_use]
    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

/// Notification configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Whether email is sent alongside push or only instead of it
    pub delivery_mode: DeliveryMode,
    /// Check-in page linked from follow-up messages
    pub check_in_base_url: String,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            delivery_mode: DeliveryMode::Redundant,
            check_in_base_url: "http://localhost:4000/reservation-arrived".to_string(),
        }
    }
}

/// Pricing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingConfig {
    /// Regular table multiplier, percent
    pub regular_percent: u32,
    /// Outdoor table multiplier, percent
    pub outdoor_percent: u32,
    /// VIP table multiplier, percent
    pub vip_percent: u32,
    /// Largest party accepted
    pub max_party_size: u32,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            regular_percent: 100,
            outdoor_percent: 150,
            vip_percent: 250,
            max_party_size: 12,
        }
    }
}

impl PricingConfig {
    /// Multiplier for a table type, percent
    #[must_use]
    pub const fn percent_for(&self, table_type: TableType) -> u32 {
        match table_type {
            TableType::Regular => self.regular_percent,
            TableType::Outdoor => self.outdoor_percent,
            TableType::Vip => self.vip_percent,
        }
    }
}

fn parsed<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

/// Parse a comma-separated list of minutes, ignoring blanks and zeros.
fn parse_thresholds(raw: &str) -> Vec<u32> {
    let mut minutes: Vec<u32> = raw
        .split(',')
        .filter_map(|part| part.trim().parse().ok())
        .filter(|m| *m > 0)
        .collect();
    minutes.sort_unstable();
    minutes.dedup();
    minutes
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Unset or unparsable variables fall back to their defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let scheduler_defaults = SchedulerConfig::default();
        let notification_defaults = NotificationConfig::default();
        let pricing_defaults = PricingConfig::default();

        let reminder_thresholds = env::var("REMINDER_THRESHOLDS_MINUTES")
            .ok()
            .map(|raw| parse_thresholds(&raw))
            .filter(|list| !list.is_empty())
            .unwrap_or(scheduler_defaults.reminder_thresholds);

        Self {
            scheduler: SchedulerConfig {
                sweep_interval_secs: parsed("SWEEP_INTERVAL_SECS", scheduler_defaults.sweep_interval_secs),
                reminder_thresholds,
                retry_max_attempts: parsed("REMINDER_MAX_ATTEMPTS", scheduler_defaults.retry_max_attempts),
                retry_delay_secs: parsed("REMINDER_RETRY_DELAY_SECS", scheduler_defaults.retry_delay_secs),
                retry_multiplier: parsed("REMINDER_RETRY_MULTIPLIER", scheduler_defaults.retry_multiplier),
                retry_max_delay_secs: parsed(
                    "REMINDER_RETRY_MAX_DELAY_SECS",
                    scheduler_defaults.retry_max_delay_secs,
                ),
                payment_timeout_secs: parsed("PAYMENT_TIMEOUT_SECS", scheduler_defaults.payment_timeout_secs),
                shutdown_timeout_secs: parsed("SHUTDOWN_TIMEOUT_SECS", scheduler_defaults.shutdown_timeout_secs),
            },
            notification: NotificationConfig {
                delivery_mode: parsed("NOTIFY_DELIVERY_MODE", notification_defaults.delivery_mode),
                check_in_base_url: env::var("CHECK_IN_BASE_URL")
                    .unwrap_or(notification_defaults.check_in_base_url),
            },
            pricing: PricingConfig {
                regular_percent: parsed("PRICE_MULTIPLIER_REGULAR", pricing_defaults.regular_percent),
                outdoor_percent: parsed("PRICE_MULTIPLIER_OUTDOOR", pricing_defaults.outdoor_percent),
                vip_percent: parsed("PRICE_MULTIPLIER_VIP", pricing_defaults.vip_percent),
                max_party_size: parsed("MAX_PARTY_SIZE", pricing_defaults.max_party_size),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_thresholds_sorts_and_drops_junk() {
        assert_eq!(parse_thresholds("30, 10,abc,,0,30"), vec![10, 30]);
        assert!(parse_thresholds("").is_empty());
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.scheduler.sweep_interval(), Duration::from_secs(300));
        assert_eq!(config.scheduler.reminder_thresholds, vec![30]);
        assert_eq!(config.scheduler.payment_timeout(), chrono::Duration::minutes(15));
        assert_eq!(config.notification.delivery_mode, DeliveryMode::Redundant);
        assert_eq!(config.pricing.percent_for(TableType::Vip), 250);
    }

    #[test]
    fn test_zero_sweep_interval_is_clamped() {
        let config = SchedulerConfig {
            sweep_interval_secs: 0,
            ..SchedulerConfig::default()
        };
        assert_eq!(config.sweep_interval(), Duration::from_secs(1));
    }

    #[test]
    fn test_retry_policy_follows_multiplier_and_cap() {
        let even = SchedulerConfig::default().retry_policy();
        assert_eq!(even.next_delay(1), Some(Duration::from_secs(300)));
        assert_eq!(even.next_delay(2), Some(Duration::from_secs(300)));
        assert_eq!(even.next_delay(3), None);

        let growing = SchedulerConfig {
            retry_max_attempts: 4,
            retry_multiplier: 2.0,
            retry_max_delay_secs: 900,
            ..SchedulerConfig::default()
        }
        .retry_policy();
        assert_eq!(growing.next_delay(1), Some(Duration::from_secs(300)));
        assert_eq!(growing.next_delay(2), Some(Duration::from_secs(600)));
        assert_eq!(growing.next_delay(3), Some(Duration::from_secs(900)));

        let shrinking = SchedulerConfig {
            retry_multiplier: 0.1,
            ..SchedulerConfig::default()
        }
        .retry_policy();
        assert_eq!(shrinking.next_delay(2), Some(Duration::from_secs(300)));
    }
}
