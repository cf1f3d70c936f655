//! Bot process config: token, API URL, log path, history database and polling.
//! Loaded from env: BOT_TOKEN (required), TELEGRAM_API_URL, LOG_FILE, HISTORY_DATABASE_URL,
//! POLL_TIMEOUT_SECS, SHORT_POLL_INTERVAL_SECS, LONG_POLL_INTERVAL_SECS, IDLE_THRESHOLD_SECS,
//! MAX_IN_FLIGHT_UPDATES.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Result;
use tebo::PollConfig;

pub const DEFAULT_HISTORY_DATABASE_URL: &str = "./tebo_history.db";

#[derive(Debug, Clone, PartialEq)]
pub struct TelegramConfig {
    /// BOT_TOKEN
    pub bot_token: String,
    /// TELEGRAM_API_URL (e.g. a local Bot API server)
    pub telegram_api_url: Option<String>,
    /// LOG_FILE; logs go to stdout only when unset
    pub log_file: Option<String>,
    /// HISTORY_DATABASE_URL: `sqlite:` URL or plain file path
    pub history_database_url: String,
    /// Server-side long-poll timeout of getUpdates
    pub poll_timeout_secs: u64,
    pub short_poll_interval_secs: u64,
    pub long_poll_interval_secs: u64,
    /// Idle time after which polling switches to the long interval
    pub idle_threshold_secs: u64,
    pub max_in_flight_updates: usize,
}

impl TelegramConfig {
    /// Loads from environment variables; BOT_TOKEN is required, everything else has defaults.
    pub fn from_env() -> Result<Self> {
        let bot_token = env::var("BOT_TOKEN").map_err(|_| anyhow::anyhow!("BOT_TOKEN not set"))?;
        let defaults = Self::with_token(bot_token);

        Ok(Self {
            telegram_api_url: env::var("TELEGRAM_API_URL").ok(),
            log_file: env::var("LOG_FILE").ok(),
            history_database_url: env::var("HISTORY_DATABASE_URL")
                .unwrap_or(defaults.history_database_url.clone()),
            poll_timeout_secs: env_or("POLL_TIMEOUT_SECS", defaults.poll_timeout_secs),
            short_poll_interval_secs: env_or(
                "SHORT_POLL_INTERVAL_SECS",
                defaults.short_poll_interval_secs,
            ),
            long_poll_interval_secs: env_or(
                "LONG_POLL_INTERVAL_SECS",
                defaults.long_poll_interval_secs,
            ),
            idle_threshold_secs: env_or("IDLE_THRESHOLD_SECS", defaults.idle_threshold_secs),
            max_in_flight_updates: env_or("MAX_IN_FLIGHT_UPDATES", defaults.max_in_flight_updates),
            ..defaults
        })
    }

    /// Config with the given token and defaults for everything else.
    pub fn with_token(bot_token: impl Into<String>) -> Self {
        let poll = PollConfig::default();
        Self {
            bot_token: bot_token.into(),
            telegram_api_url: None,
            log_file: None,
            history_database_url: DEFAULT_HISTORY_DATABASE_URL.to_string(),
            poll_timeout_secs: 25,
            short_poll_interval_secs: poll.short_interval.as_secs(),
            long_poll_interval_secs: poll.long_interval.as_secs(),
            idle_threshold_secs: poll.idle_threshold.as_secs(),
            max_in_flight_updates: poll.max_in_flight,
        }
    }

    /// Rejects an empty token, a malformed API URL and a zero in-flight limit.
    pub fn validate(&self) -> Result<()> {
        if self.bot_token.trim().is_empty() {
            anyhow::bail!("BOT_TOKEN is empty");
        }
        if let Some(ref url_str) = self.telegram_api_url {
            if reqwest::Url::parse(url_str).is_err() {
                anyhow::bail!("TELEGRAM_API_URL is set but not a valid URL: {}", url_str);
            }
        }
        if self.max_in_flight_updates == 0 {
            anyhow::bail!("MAX_IN_FLIGHT_UPDATES must be at least 1");
        }
        Ok(())
    }

    pub fn poll_config(&self) -> PollConfig {
        PollConfig {
            short_interval: Duration::from_secs(self.short_poll_interval_secs),
            long_interval: Duration::from_secs(self.long_poll_interval_secs),
            idle_threshold: Duration::from_secs(self.idle_threshold_secs),
            max_in_flight: self.max_in_flight_updates,
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: &[&str] = &[
        "BOT_TOKEN",
        "TELEGRAM_API_URL",
        "LOG_FILE",
        "HISTORY_DATABASE_URL",
        "POLL_TIMEOUT_SECS",
        "SHORT_POLL_INTERVAL_SECS",
        "LONG_POLL_INTERVAL_SECS",
        "IDLE_THRESHOLD_SECS",
        "MAX_IN_FLIGHT_UPDATES",
    ];

    fn clear_env() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    #[test]
    fn test_with_token() {
        let config = TelegramConfig::with_token("test_token");
        assert_eq!(config.bot_token, "test_token");
        assert!(config.telegram_api_url.is_none());
        assert!(config.log_file.is_none());
        assert_eq!(config.poll_config(), PollConfig::default());
    }

    #[test]
    #[serial]
    fn test_from_env_defaults() {
        clear_env();
        env::set_var("BOT_TOKEN", "env_token");

        let config = TelegramConfig::from_env().unwrap();

        assert_eq!(config, TelegramConfig::with_token("env_token"));
        assert_eq!(config.history_database_url, "./tebo_history.db");
        assert_eq!(config.poll_timeout_secs, 25);
        assert_eq!(config.max_in_flight_updates, 64);
        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_custom_values() {
        clear_env();
        env::set_var("BOT_TOKEN", "custom_token");
        env::set_var("TELEGRAM_API_URL", "http://localhost:8081");
        env::set_var("HISTORY_DATABASE_URL", "sqlite::memory:");
        env::set_var("SHORT_POLL_INTERVAL_SECS", "1");
        env::set_var("LONG_POLL_INTERVAL_SECS", "30");
        env::set_var("IDLE_THRESHOLD_SECS", "120");
        env::set_var("MAX_IN_FLIGHT_UPDATES", "8");
        env::set_var("POLL_TIMEOUT_SECS", "not-a-number");

        let config = TelegramConfig::from_env().unwrap();

        assert_eq!(config.telegram_api_url.as_deref(), Some("http://localhost:8081"));
        assert_eq!(config.history_database_url, "sqlite::memory:");
        assert_eq!(config.poll_timeout_secs, 25);
        let poll = config.poll_config();
        assert_eq!(poll.short_interval, Duration::from_secs(1));
        assert_eq!(poll.long_interval, Duration::from_secs(30));
        assert_eq!(poll.idle_threshold, Duration::from_secs(120));
        assert_eq!(poll.max_in_flight, 8);
        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_requires_token() {
        clear_env();
        assert!(TelegramConfig::from_env().is_err());
    }

    #[test]
    fn test_validate() {
        let mut config = TelegramConfig::with_token("t");
        assert!(config.validate().is_ok());

        config.telegram_api_url = Some("not a url".to_string());
        assert!(config.validate().is_err());

        config.telegram_api_url = None;
        config.max_in_flight_updates = 0;
        assert!(config.validate().is_err());

        assert!(TelegramConfig::with_token(" ").validate().is_err());
    }
}
