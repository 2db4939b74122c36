//! Service configuration.
//!
//! Loaded from TOML; every field has a default so an empty file is valid.
//! Environment variables of the form `TIMETABLE__SECTION__KEY` override
//! individual values after the file is read.
//!
//! ```
//! use sched_core::config::SchedulingConfig;
//!
//! let cfg = SchedulingConfig::from_toml_str(r#"
//!     [optimizer]
//!     generations = 250
//!
//!     [runs]
//!     max_duration_secs = 600
//! "#).unwrap();
//! assert_eq!(cfg.optimizer.generations, 250);
//! assert_eq!(cfg.optimizer.population_size, 50);
//! assert_eq!(cfg.runs.max_duration_secs, 600);
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const ENV_PREFIX: &str = "TIMETABLE__";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct SchedulingConfig {
    pub server: ServerConfig,
    pub optimizer: OptimizerConfig,
    pub runs: RunsConfig,
    pub rules: RulesConfig,
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    pub body_limit_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            body_limit_bytes: 2 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct OptimizerConfig {
    pub population_size: usize,
    pub generations: usize,
    pub mutation_rate: f64,
    pub crossover_rate: f64,
    pub tournament_size: usize,
    pub default_seed: u64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            population_size: 50,
            generations: 100,
            mutation_rate: 0.1,
            crossover_rate: 0.3,
            tournament_size: 3,
            default_seed: 0,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RunsConfig {
    pub max_duration_secs: u64,
    pub sweep_interval_secs: u64,
    pub retention_days: i64,
    pub max_submissions_per_window: usize,
    pub submission_window_secs: u64,
}

impl Default for RunsConfig {
    fn default() -> Self {
        Self {
            max_duration_secs: 2 * 60 * 60,
            sweep_interval_secs: 60,
            retention_days: 90,
            max_submissions_per_window: 5,
            submission_window_secs: 60 * 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RulesConfig {
    pub default_daily_limit: u32,
    /// Last period of the morning band, inclusive.
    pub morning_last_period: u32,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            default_daily_limit: 2,
            morning_last_period: 3,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct StoreConfig {
    pub fixture: Option<PathBuf>,
}

impl SchedulingConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let cfg: Self = toml::from_str(s)?;
        cfg.check()?;
        Ok(cfg)
    }

    /// Reads `path` when given (defaults otherwise), then applies
    /// `TIMETABLE__*` variables from the process environment.
    pub fn load_with_env(path: Option<&Path>) -> Result<Self, ConfigError> {
        let base = match path {
            Some(p) => std::fs::read_to_string(p)?,
            None => String::new(),
        };
        Self::from_toml_with_overrides(&base, std::env::vars())
    }

    pub fn from_toml_with_overrides(
        s: &str,
        vars: impl IntoIterator<Item = (String, String)>,
    ) -> Result<Self, ConfigError> {
        let mut root: toml::Table = toml::from_str(s)?;
        for (name, raw) in vars {
            let Some(rest) = name.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let mut parts = rest.splitn(2, "__");
            let (Some(section), Some(key)) = (parts.next(), parts.next()) else {
                return Err(ConfigError::Invalid(format!("malformed override {name}")));
            };
            let section = section.to_ascii_lowercase();
            let key = key.to_ascii_lowercase();
            let entry = root
                .entry(section.clone())
                .or_insert(toml::Value::Table(toml::Table::new()));
            let toml::Value::Table(table) = entry else {
                return Err(ConfigError::Invalid(format!("{section} is not a table")));
            };
            table.insert(key, env_value(&raw));
        }
        let cfg: Self = toml::Value::Table(root).try_into()?;
        cfg.check()?;
        Ok(cfg)
    }

    fn check(&self) -> Result<(), ConfigError> {
        let o = &self.optimizer;
        if o.population_size == 0 {
            return Err(ConfigError::Invalid("optimizer.population_size must be > 0".into()));
        }
        if o.tournament_size == 0 {
            return Err(ConfigError::Invalid("optimizer.tournament_size must be > 0".into()));
        }
        let rates = [("mutation_rate", o.mutation_rate), ("crossover_rate", o.crossover_rate)];
        for (name, v) in rates {
            if !(0.0..=1.0).contains(&v) {
                return Err(ConfigError::Invalid(format!("optimizer.{name} must be in [0, 1]")));
            }
        }
        if self.rules.morning_last_period == 0 {
            return Err(ConfigError::Invalid("rules.morning_last_period must be >= 1".into()));
        }
        if self.runs.submission_window_secs == 0 {
            return Err(ConfigError::Invalid("runs.submission_window_secs must be > 0".into()));
        }
        Ok(())
    }
}

fn env_value(raw: &str) -> toml::Value {
    if let Ok(i) = raw.parse::<i64>() {
        toml::Value::Integer(i)
    } else if let Ok(f) = raw.parse::<f64>() {
        toml::Value::Float(f)
    } else if let Ok(b) = raw.parse::<bool>() {
        toml::Value::Boolean(b)
    } else {
        toml::Value::String(raw.to_string())
    }
}
