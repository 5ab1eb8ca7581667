use std::time::Duration;

use anyhow::{bail, Context, Result};
use armada_reconcile::RetryPolicy;

use crate::db::DbConfig;
use crate::manager::{ManagerConfig, DEFAULT_CALL_TIMEOUT};
use crate::scheduler::{SchedulerBackend, FAKE_BACKEND};

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub dev_mode: bool,
    pub scheduler: SchedulerBackend,
    pub scheduler_timeout: Duration,
    pub scheduler_retries: u32,
    pub database: DbConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let log_level = lookup("ARMADA_LOG_LEVEL").unwrap_or_else(|| "info".to_string());

        let dev_mode = lookup("ARMADA_DEV")
            .map(|v| v == "1" || v.to_lowercase() == "true")
            .unwrap_or(false);

        let scheduler = match lookup("ARMADA_SCHEDULER_URL") {
            Some(setting) => SchedulerBackend::from_setting(&setting)
                .context("invalid ARMADA_SCHEDULER_URL")?,
            None if dev_mode => SchedulerBackend::from_setting(FAKE_BACKEND)?,
            None => bail!("ARMADA_SCHEDULER_URL is required (use \"fake\" for the in-memory scheduler)"),
        };

        let scheduler_timeout = match lookup("ARMADA_SCHEDULER_TIMEOUT_SECS") {
            Some(secs) => Duration::from_secs(
                secs.parse()
                    .context("ARMADA_SCHEDULER_TIMEOUT_SECS must be a number of seconds")?,
            ),
            None => DEFAULT_CALL_TIMEOUT,
        };

        let scheduler_retries = match lookup("ARMADA_SCHEDULER_RETRIES") {
            Some(n) => n.parse().context("ARMADA_SCHEDULER_RETRIES must be a number")?,
            None => armada_reconcile::DEFAULT_MAX_ATTEMPTS,
        };

        Ok(Self {
            log_level,
            dev_mode,
            scheduler,
            scheduler_timeout,
            scheduler_retries,
            database: DbConfig::from_lookup(lookup),
        })
    }

    pub fn manager(&self) -> ManagerConfig {
        ManagerConfig {
            call_timeout: self.scheduler_timeout,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.scheduler_retries.max(1),
            ..RetryPolicy::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_dev_mode_defaults_to_fake_scheduler() {
        let config = config(&[("ARMADA_DEV", "true")]).unwrap();
        assert!(config.dev_mode);
        assert_eq!(config.scheduler, SchedulerBackend::Fake);
        assert_eq!(config.scheduler_timeout, DEFAULT_CALL_TIMEOUT);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_scheduler_required_outside_dev_mode() {
        assert!(config(&[]).is_err());
    }

    #[test]
    fn test_overrides() {
        let config = config(&[
            ("ARMADA_SCHEDULER_URL", "http://fleet.local:49153"),
            ("ARMADA_SCHEDULER_TIMEOUT_SECS", "5"),
            ("ARMADA_SCHEDULER_RETRIES", "0"),
            ("DATABASE_URL", "postgres://db/armada"),
        ])
        .unwrap();
        assert!(matches!(config.scheduler, SchedulerBackend::Fleet(_)));
        assert_eq!(config.manager().call_timeout, Duration::from_secs(5));
        assert_eq!(config.retry_policy().max_attempts, 1);
        assert_eq!(config.database.database_url, "postgres://db/armada");
    }
}
