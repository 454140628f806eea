use std::env;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name} must be within [0, 1], got {value}")]
    ThresholdOutOfRange { name: &'static str, value: f64 },
    #[error("{0} must be at least 1")]
    Zero(&'static str),
    #[error("cannot parse environment variable {var}={value:?}")]
    BadEnv { var: &'static str, value: String },
}

/// Tunables of the inference. Everything here can come from a config file, the environment
/// or the command line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Calls a function needs before it's classified at all.
    pub min_calls: u64,
    /// Fraction of calls a slot must be read in to count as a parameter.
    pub slot_threshold: f64,
    /// Fraction of calls that must produce a value for the function to count as returning.
    pub return_threshold: f64,
    /// Distinct functions tracked before new ones fall back to the unknown sentinel.
    pub max_functions: usize,
    /// Live frames kept per shadow stack before the oldest are forgotten.
    pub max_depth: usize,
    /// The first calls of every function are not attributed.
    pub warmup_calls: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            min_calls: 500,
            slot_threshold: 0.10,
            return_threshold: 0.05,
            max_functions: 100_000,
            max_depth: 1000,
            warmup_calls: 3,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("slot_threshold", self.slot_threshold),
            ("return_threshold", self.return_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::ThresholdOutOfRange { name, value });
            }
        }
        if self.max_depth == 0 {
            return Err(ConfigError::Zero("max_depth"));
        }
        if self.min_calls == 0 {
            return Err(ConfigError::Zero("min_calls"));
        }
        Ok(())
    }

    /// Overrides fields from `SONDE_*` variables that are set.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        read_env("SONDE_MIN_CALLS", &mut self.min_calls)?;
        read_env("SONDE_SLOT_THRESHOLD", &mut self.slot_threshold)?;
        read_env("SONDE_RETURN_THRESHOLD", &mut self.return_threshold)?;
        read_env("SONDE_MAX_FUNCTIONS", &mut self.max_functions)?;
        read_env("SONDE_MAX_DEPTH", &mut self.max_depth)?;
        read_env("SONDE_WARMUP_CALLS", &mut self.warmup_calls)?;
        Ok(())
    }
}

fn read_env<T: FromStr>(var: &'static str, dest: &mut T) -> Result<(), ConfigError> {
    if let Ok(value) = env::var(var) {
        match value.trim().parse().ok() {
            Some(parsed) => *dest = parsed,
            None => return Err(ConfigError::BadEnv { var, value }),
        }
    }
    Ok(())
}
