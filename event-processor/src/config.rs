use std::time::Duration;

use anyhow::{anyhow, Result};
use envconfig::Envconfig;

use crate::event::StartPosition;

/// Tuning knobs for one [`EventProcessor`](crate::EventProcessor).
#[derive(Debug, Clone)]
pub struct EventProcessorOptions {
    /// Where a reader starts when the partition has no checkpoint yet.
    pub initial_event_position: StartPosition,
    /// Events per receive call. The conservative default matches the
    /// original client; production deployments typically run 32 or more.
    pub max_batch_size: usize,
    /// Longest a receive call waits before handing back an empty batch.
    pub max_wait: Duration,
    /// Pause between control-loop ticks (one claim attempt per tick).
    pub loop_interval: Duration,
    /// Age past which an ownership record counts as abandoned.
    pub inactive_time_limit: Duration,
}

impl Default for EventProcessorOptions {
    fn default() -> Self {
        Self {
            initial_event_position: StartPosition::Earliest,
            max_batch_size: 1,
            max_wait: Duration::from_secs(60),
            loop_interval: Duration::from_secs(10),
            inactive_time_limit: Duration::from_secs(60),
        }
    }
}

/// Environment-driven configuration for services embedding the processor.
#[derive(Envconfig, Clone, Debug)]
pub struct ProcessorConfig {
    #[envconfig(default = "events")]
    pub event_hub_name: String,

    #[envconfig(default = "$default")]
    pub consumer_group_name: String,

    // "earliest" or "latest"
    #[envconfig(default = "earliest")]
    pub initial_position: String,

    #[envconfig(default = "1")]
    pub max_batch_size: usize,

    #[envconfig(default = "60")]
    pub max_wait_secs: u64,

    #[envconfig(default = "10")]
    pub load_balance_interval_secs: u64,

    #[envconfig(default = "60")]
    pub ownership_expiration_secs: u64,
}

impl ProcessorConfig {
    /// Initialize from environment variables (for production and tests)
    pub fn init_with_defaults() -> Result<Self, envconfig::Error> {
        ProcessorConfig::init_from_env()
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_secs(self.max_wait_secs)
    }

    pub fn load_balance_interval(&self) -> Duration {
        Duration::from_secs(self.load_balance_interval_secs)
    }

    pub fn ownership_expiration(&self) -> Duration {
        Duration::from_secs(self.ownership_expiration_secs)
    }

    pub fn initial_event_position(&self) -> Result<StartPosition> {
        match self.initial_position.as_str() {
            "earliest" => Ok(StartPosition::Earliest),
            "latest" => Ok(StartPosition::Latest),
            other => Err(anyhow!(
                "invalid initial_position '{other}', expected 'earliest' or 'latest'"
            )),
        }
    }

    pub fn options(&self) -> Result<EventProcessorOptions> {
        Ok(EventProcessorOptions {
            initial_event_position: self.initial_event_position()?,
            max_batch_size: self.max_batch_size,
            max_wait: self.max_wait(),
            loop_interval: self.load_balance_interval(),
            inactive_time_limit: self.ownership_expiration(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_defaults_match_the_original_client() {
        let options = EventProcessorOptions::default();
        assert_eq!(options.initial_event_position, StartPosition::Earliest);
        assert_eq!(options.max_batch_size, 1);
        assert_eq!(options.max_wait, Duration::from_secs(60));
        assert_eq!(options.loop_interval, Duration::from_secs(10));
        assert_eq!(options.inactive_time_limit, Duration::from_secs(60));
    }

    #[test]
    fn env_config_converts_to_options() {
        let mut config = ProcessorConfig::init_with_defaults().unwrap();
        config.max_batch_size = 32;
        config.initial_position = "latest".to_string();

        let options = config.options().unwrap();
        assert_eq!(options.max_batch_size, 32);
        assert_eq!(options.initial_event_position, StartPosition::Latest);
        assert_eq!(options.loop_interval, Duration::from_secs(10));
    }

    #[test]
    fn invalid_initial_position_is_rejected() {
        let mut config = ProcessorConfig::init_with_defaults().unwrap();
        config.initial_position = "yesterday".to_string();
        assert!(config.options().is_err());
    }
}
