use crate::error::{BrokerError, Result};
use std::time::Duration;

/// Top-level broker configuration.
///
/// Every retry limit and polling interval the lifecycle processors use lives
/// here rather than in scattered constants, so deployments can tune them per
/// environment.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Identity of this provider in the federation. Orders whose
    /// `target_provider` differs are dispatched through remote RPC.
    pub provider_id: String,
    pub database_url: String,
    pub processors: ProcessorConfig,
    pub retries: RetryConfig,
}

/// Sleep intervals for the per-state processing loops.
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    pub open_interval: Duration,
    pub spawning_interval: Duration,
    /// Longer than the spawning interval: fulfilled instances are stable and
    /// only need periodic health rechecks.
    pub fulfilled_interval: Duration,
    pub unable_interval: Duration,
    pub closed_interval: Duration,
    pub shutdown_timeout: Duration,
}

/// Retry counters and time budgets for the lifecycle processors.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Consecutive status-check failures tolerated in SPAWNING or FULFILLED
    /// before the order moves to UNABLE_TO_CHECK_STATUS.
    pub status_check_failure_limit: u32,
    /// Recheck attempts in UNABLE_TO_CHECK_STATUS before giving up and
    /// closing the order for cleanup.
    pub unable_retry_limit: u32,
    /// Elapsed-time budget an order may remain SPAWNING before it is forced
    /// to UNABLE_TO_CHECK_STATUS.
    pub spawning_timeout: Duration,
    /// Cleanup attempts after which the closed processor starts logging the
    /// order as a dead-letter candidate. Cleanup itself is never abandoned.
    pub cleanup_warn_threshold: u32,
    /// Timeout applied to remote federation RPC calls.
    pub remote_timeout: Duration,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            provider_id: "local-provider".to_string(),
            database_url: "postgresql://localhost/broker_development".to_string(),
            processors: ProcessorConfig::default(),
            retries: RetryConfig::default(),
        }
    }
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            open_interval: Duration::from_secs(1),
            spawning_interval: Duration::from_secs(1),
            fulfilled_interval: Duration::from_secs(10),
            unable_interval: Duration::from_secs(1),
            closed_interval: Duration::from_secs(1),
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            status_check_failure_limit: 5,
            unable_retry_limit: 10,
            spawning_timeout: Duration::from_secs(600),
            cleanup_warn_threshold: 10,
            remote_timeout: Duration::from_secs(30),
        }
    }
}

impl BrokerConfig {
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(provider_id) = std::env::var("BROKER_PROVIDER_ID") {
            config.provider_id = provider_id;
        }

        if let Ok(db_url) = std::env::var("DATABASE_URL") {
            config.database_url = db_url;
        }

        if let Ok(limit) = std::env::var("BROKER_STATUS_CHECK_FAILURE_LIMIT") {
            config.retries.status_check_failure_limit = limit.parse().map_err(|e| {
                BrokerError::ConfigurationError(format!("Invalid status_check_failure_limit: {e}"))
            })?;
        }

        if let Ok(limit) = std::env::var("BROKER_UNABLE_RETRY_LIMIT") {
            config.retries.unable_retry_limit = limit.parse().map_err(|e| {
                BrokerError::ConfigurationError(format!("Invalid unable_retry_limit: {e}"))
            })?;
        }

        if let Ok(secs) = std::env::var("BROKER_SPAWNING_TIMEOUT_SECS") {
            config.retries.spawning_timeout =
                Duration::from_secs(secs.parse().map_err(|e| {
                    BrokerError::ConfigurationError(format!("Invalid spawning_timeout_secs: {e}"))
                })?);
        }

        if let Ok(ms) = std::env::var("BROKER_OPEN_INTERVAL_MS") {
            config.processors.open_interval =
                Duration::from_millis(ms.parse().map_err(|e| {
                    BrokerError::ConfigurationError(format!("Invalid open_interval_ms: {e}"))
                })?);
        }

        if let Ok(ms) = std::env::var("BROKER_FULFILLED_INTERVAL_MS") {
            config.processors.fulfilled_interval =
                Duration::from_millis(ms.parse().map_err(|e| {
                    BrokerError::ConfigurationError(format!("Invalid fulfilled_interval_ms: {e}"))
                })?);
        }

        Ok(config)
    }

    /// Configuration with intervals short enough for tests to drive the
    /// processors to completion quickly.
    pub fn for_testing() -> Self {
        let mut config = Self::default();
        config.processors.open_interval = Duration::from_millis(10);
        config.processors.spawning_interval = Duration::from_millis(10);
        config.processors.fulfilled_interval = Duration::from_millis(10);
        config.processors.unable_interval = Duration::from_millis(10);
        config.processors.closed_interval = Duration::from_millis(10);
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Env vars are process-global; any test that mutates the BROKER_* vars
    // must hold this lock so parallel `from_env` callers cannot observe a
    // half-written environment.
    static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

    #[test]
    fn defaults_are_sane() {
        let config = BrokerConfig::default();
        assert!(config.processors.fulfilled_interval > config.processors.spawning_interval);
        assert!(config.retries.status_check_failure_limit > 0);
        assert!(config.retries.spawning_timeout > config.processors.spawning_interval);
    }

    #[test]
    fn env_override_rejects_garbage() {
        let _env = ENV_LOCK.lock().unwrap();
        std::env::set_var("BROKER_STATUS_CHECK_FAILURE_LIMIT", "not-a-number");
        let result = BrokerConfig::from_env();
        std::env::remove_var("BROKER_STATUS_CHECK_FAILURE_LIMIT");
        assert!(matches!(result, Err(BrokerError::ConfigurationError(_))));
    }

    #[test]
    fn env_override_applies_valid_values() {
        let _env = ENV_LOCK.lock().unwrap();
        std::env::set_var("BROKER_UNABLE_RETRY_LIMIT", "3");
        let config = BrokerConfig::from_env().unwrap();
        std::env::remove_var("BROKER_UNABLE_RETRY_LIMIT");
        assert_eq!(config.retries.unable_retry_limit, 3);
    }
}
