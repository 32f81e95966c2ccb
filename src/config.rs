use serde::Serialize;
use std::{env, path::PathBuf, str::FromStr};
use tracing::warn;

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_DATA_PATH: &str = "data/state.json";

/// Which tracked tabs the global clock charges on each tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TickPolicy {
    /// Only the foreground tab, and only when it is tracked.
    #[default]
    ActiveTab,
    /// Every tracked tab, regardless of focus.
    PerTab,
}

impl FromStr for TickPolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "active-tab" | "active" | "global" => Ok(TickPolicy::ActiveTab),
            "per-tab" | "all" => Ok(TickPolicy::PerTab),
            other => Err(format!("unknown tick policy '{other}'")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub data_path: PathBuf,
    pub tick_policy: TickPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            data_path: PathBuf::from(DEFAULT_DATA_PATH),
            tick_policy: TickPolicy::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Config::default();

        if let Some(value) = lookup("PORT") {
            match value.parse::<u16>() {
                Ok(port) => config.port = port,
                Err(_) => warn!("ignoring invalid PORT '{value}'"),
            }
        }

        if let Some(path) = lookup("APP_DATA_PATH") {
            config.data_path = PathBuf::from(path);
        }

        if let Some(value) = lookup("TICK_POLICY") {
            match value.parse() {
                Ok(policy) => config.tick_policy = policy,
                Err(err) => warn!("{err}, using {:?}", config.tick_policy),
            }
        }

        config
    }
}
