//! Configuration types.

use std::time::Duration;

use crate::error::ConfigError;
use crate::tasks::TaskType;

/// Engine configuration: timeout thresholds, resume window, invitation TTL.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Idle time after which a running task gets a reminder.
    pub reminder_threshold: Duration,
    /// Idle time after which a running task is abandoned.
    pub abandonment_threshold: Duration,
    /// How long an abandoned snapshot can be resumed.
    pub resume_window: Duration,
    /// Lifetime of an invitation before it expires.
    pub invitation_ttl: Duration,
    /// Cadence of the timeout sweep ticker.
    pub sweep_interval: Duration,
    /// Task types the timeout monitor watches.
    pub monitored_task_types: Vec<TaskType>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            reminder_threshold: Duration::from_secs(5 * 60),
            abandonment_threshold: Duration::from_secs(15 * 60),
            resume_window: Duration::from_secs(24 * 3600),
            invitation_ttl: Duration::from_secs(7 * 24 * 3600),
            sweep_interval: Duration::from_secs(60),
            monitored_task_types: TaskType::ALL.to_vec(),
        }
    }
}

impl EngineConfig {
    /// Build from `TRAINER_ASSIST_*` environment variables, falling back to
    /// defaults for anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let reminder_threshold = env_duration(
            "TRAINER_ASSIST_REMINDER_MINUTES",
            60,
            defaults.reminder_threshold,
        )?;
        let abandonment_threshold = env_duration(
            "TRAINER_ASSIST_ABANDON_MINUTES",
            60,
            defaults.abandonment_threshold,
        )?;
        let resume_window =
            env_duration("TRAINER_ASSIST_RESUME_HOURS", 3600, defaults.resume_window)?;
        let invitation_ttl = env_duration(
            "TRAINER_ASSIST_INVITE_TTL_DAYS",
            24 * 3600,
            defaults.invitation_ttl,
        )?;
        let sweep_interval =
            env_duration("TRAINER_ASSIST_SWEEP_SECS", 1, defaults.sweep_interval)?;

        let monitored_task_types = match std::env::var("TRAINER_ASSIST_MONITORED_TASKS") {
            Ok(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| {
                    s.parse::<TaskType>().map_err(|message| ConfigError::InvalidValue {
                        key: "TRAINER_ASSIST_MONITORED_TASKS".into(),
                        message,
                    })
                })
                .collect::<Result<Vec<_>, _>>()?,
            Err(_) => defaults.monitored_task_types,
        };

        let config = Self {
            reminder_threshold,
            abandonment_threshold,
            resume_window,
            invitation_ttl,
            sweep_interval,
            monitored_task_types,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject threshold combinations that would make reminders unreachable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.reminder_threshold >= self.abandonment_threshold {
            return Err(ConfigError::InvalidValue {
                key: "TRAINER_ASSIST_REMINDER_MINUTES".into(),
                message: format!(
                    "reminder threshold ({:?}) must be shorter than abandonment threshold ({:?})",
                    self.reminder_threshold, self.abandonment_threshold
                ),
            });
        }
        if self.sweep_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: "TRAINER_ASSIST_SWEEP_SECS".into(),
                message: "sweep interval must be positive".into(),
            });
        }
        Ok(())
    }
}

/// Read an integer env var and scale it into a `Duration` (`unit_secs` per unit).
fn env_duration(key: &str, unit_secs: u64, default: Duration) -> Result<Duration, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => {
            let units: u64 = raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("expected a whole number, got '{raw}'"),
            })?;
            Ok(Duration::from_secs(units * unit_secs))
        }
        Err(_) => Ok(default),
    }
}

/// Convert a std duration into a chrono duration for timestamp arithmetic.
pub fn to_chrono(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or(chrono::Duration::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_thresholds() {
        let config = EngineConfig::default();
        assert_eq!(config.reminder_threshold, Duration::from_secs(300));
        assert_eq!(config.abandonment_threshold, Duration::from_secs(900));
        assert_eq!(config.resume_window, Duration::from_secs(86_400));
        assert_eq!(config.monitored_task_types.len(), TaskType::ALL.len());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn reminder_must_precede_abandonment() {
        let config = EngineConfig {
            reminder_threshold: Duration::from_secs(900),
            abandonment_threshold: Duration::from_secs(300),
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn to_chrono_converts() {
        assert_eq!(to_chrono(Duration::from_secs(60)), chrono::Duration::minutes(1));
    }
}
