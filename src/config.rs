use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

pub const API_KEY_ENV: &str = "PL_API_KEY";
const DATA_URL: &str = "https://api.planet.com/data/v1/";
const ORDERS_URL: &str = "https://api.planet.com/compute/ops/orders/v2";

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct Config {
    /// Falls back to this when `PL_API_KEY` is unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_data_url")]
    pub data_url: String,

    #[serde(default = "default_orders_url")]
    pub orders_url: String,

    #[serde(default)]
    pub retry: RetryPolicy,

    #[serde(default)]
    pub poll: PollConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            data_url: default_data_url(),
            orders_url: default_orders_url(),
            retry: RetryPolicy::default(),
            poll: PollConfig::default(),
        }
    }
}

/// Bounded exponential backoff applied to rate-limited and transient failures.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

/// How long to wait for an order to reach a terminal state.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct PollConfig {
    #[serde(default = "default_max_polls")]
    pub max_polls: u32,

    #[serde(default = "default_poll_interval", with = "duration_serde")]
    pub interval: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            max_polls: default_max_polls(),
            interval: default_poll_interval(),
        }
    }
}

impl Config {
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::read(path),
            None => Ok(Self::default()),
        }
    }

    /// The environment variable takes precedence over the file.
    pub fn api_key(&self) -> Result<String> {
        pick_api_key(std::env::var(API_KEY_ENV).ok(), self.api_key.as_deref())
    }
}

fn pick_api_key(from_env: Option<String>, from_file: Option<&str>) -> Result<String> {
    from_env
        .filter(|key| !key.trim().is_empty())
        .or_else(|| {
            from_file
                .filter(|key| !key.trim().is_empty())
                .map(str::to_owned)
        })
        .ok_or(anyhow!(
            "Couldn't find the Planet API key; set {} or api_key in the config file",
            API_KEY_ENV
        ))
}

fn default_data_url() -> String {
    DATA_URL.to_string()
}

fn default_orders_url() -> String {
    ORDERS_URL.to_string()
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(10)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_max_polls() -> u32 {
    100
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(30)
}

// Durations are stored as whole seconds
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
