//! Settler configuration.

use std::time::Duration;

use marketsettle_common::{MarketError, Result};

/// Entity lock configuration.
#[derive(Debug, Clone)]
pub struct LockConfig {
    /// How long a lock stays valid once taken.
    pub default_duration: Duration,
    /// How long a trade waits for its locks before giving up.
    pub acquisition_timeout: Duration,
    /// Pause between acquisition attempts.
    pub retry_interval: Duration,
    /// Expired-lock sweep interval.
    pub cleanup_interval: Duration,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            default_duration: Duration::from_secs(30),
            acquisition_timeout: Duration::from_secs(5),
            retry_interval: Duration::from_millis(5),
            cleanup_interval: Duration::from_secs(1),
        }
    }
}

/// Settlement processing configuration.
#[derive(Debug, Clone)]
pub struct SettlementConfig {
    /// Refuse trades whose seller is not the product's current owner.
    pub enforce_seller_ownership: bool,
    /// Append to participants' acquired/sold lists on settlement.
    pub record_ownership_history: bool,
    /// How long `stop` waits for in-flight trades.
    pub drain_timeout: Duration,
}

impl Default for SettlementConfig {
    fn default() -> Self {
        Self {
            enforce_seller_ownership: true,
            record_ownership_history: false,
            drain_timeout: Duration::from_secs(30),
        }
    }
}

/// Main settler configuration.
#[derive(Debug, Clone)]
pub struct SettlerConfig {
    /// Node ID, generated at startup if absent.
    pub node_id: Option<String>,
    /// Lock configuration.
    pub lock_config: LockConfig,
    /// Settlement configuration.
    pub settlement_config: SettlementConfig,
    /// Log level used when `RUST_LOG` is unset.
    pub log_level: String,
    /// Emit JSON log lines instead of plain text.
    pub log_json: bool,
}

impl Default for SettlerConfig {
    fn default() -> Self {
        Self {
            node_id: None,
            lock_config: LockConfig::default(),
            settlement_config: SettlementConfig::default(),
            log_level: "info".to_string(),
            log_json: true,
        }
    }
}

impl SettlerConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(node_id) = lookup("SETTLER_NODE_ID") {
            config.node_id = Some(node_id);
        }

        if let Some(ms) = lookup("SETTLER_LOCK_TIMEOUT_MS") {
            config.lock_config.acquisition_timeout = parse_millis("SETTLER_LOCK_TIMEOUT_MS", &ms)?;
        }

        if let Some(ms) = lookup("SETTLER_LOCK_DURATION_MS") {
            config.lock_config.default_duration = parse_millis("SETTLER_LOCK_DURATION_MS", &ms)?;
        }

        if let Some(flag) = lookup("SETTLER_ENFORCE_SELLER_OWNERSHIP") {
            config.settlement_config.enforce_seller_ownership =
                parse_flag("SETTLER_ENFORCE_SELLER_OWNERSHIP", &flag)?;
        }

        if let Some(flag) = lookup("SETTLER_RECORD_OWNERSHIP_HISTORY") {
            config.settlement_config.record_ownership_history =
                parse_flag("SETTLER_RECORD_OWNERSHIP_HISTORY", &flag)?;
        }

        if let Some(level) = lookup("LOG_LEVEL") {
            config.log_level = level;
        }

        if let Some(format) = lookup("LOG_FORMAT") {
            config.log_json = match format.to_ascii_lowercase().as_str() {
                "json" => true,
                "plain" | "text" => false,
                other => {
                    return Err(MarketError::Configuration(format!(
                        "LOG_FORMAT must be json or plain, got {other}"
                    )))
                }
            };
        }

        Ok(config)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<()> {
        let locks = &self.lock_config;

        if locks.default_duration.is_zero() {
            return Err(MarketError::Configuration(
                "Lock duration cannot be zero".to_string(),
            ));
        }

        if locks.acquisition_timeout.is_zero() {
            return Err(MarketError::Configuration(
                "Lock acquisition timeout cannot be zero".to_string(),
            ));
        }

        if locks.cleanup_interval.is_zero() {
            return Err(MarketError::Configuration(
                "Lock cleanup interval cannot be zero".to_string(),
            ));
        }

        if locks.retry_interval >= locks.acquisition_timeout {
            return Err(MarketError::Configuration(
                "Lock retry interval must be shorter than the acquisition timeout".to_string(),
            ));
        }

        Ok(())
    }
}

fn parse_millis(key: &str, value: &str) -> Result<Duration> {
    value
        .trim()
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|e| MarketError::Configuration(format!("{key}: {e}")))
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(MarketError::Configuration(format!(
            "{key}: expected a boolean, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = SettlerConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.settlement_config.enforce_seller_ownership);
        assert!(!config.settlement_config.record_ownership_history);
    }

    #[test]
    fn test_from_lookup() {
        let config = SettlerConfig::from_lookup(lookup(&[
            ("SETTLER_NODE_ID", "settler-7"),
            ("SETTLER_LOCK_TIMEOUT_MS", "250"),
            ("SETTLER_RECORD_OWNERSHIP_HISTORY", "true"),
            ("LOG_FORMAT", "plain"),
        ]))
        .unwrap();

        assert_eq!(config.node_id.as_deref(), Some("settler-7"));
        assert_eq!(config.lock_config.acquisition_timeout, Duration::from_millis(250));
        assert!(config.settlement_config.record_ownership_history);
        assert!(!config.log_json);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_bad_values_refused() {
        let err = SettlerConfig::from_lookup(lookup(&[("SETTLER_LOCK_TIMEOUT_MS", "soon")]))
            .unwrap_err();
        assert_eq!(err.error_code(), "CONFIGURATION_ERROR");

        assert!(SettlerConfig::from_lookup(lookup(&[(
            "SETTLER_ENFORCE_SELLER_OWNERSHIP",
            "maybe"
        )]))
        .is_err());
    }

    #[test]
    fn test_invalid_config() {
        let mut config = SettlerConfig::default();
        config.lock_config.default_duration = Duration::ZERO;
        assert!(config.validate().is_err());

        let mut config = SettlerConfig::default();
        config.lock_config.retry_interval = config.lock_config.acquisition_timeout;
        assert!(config.validate().is_err());
    }
}
