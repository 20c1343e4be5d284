//! Configuration types for FaultLine.

mod rules;
mod tcp;

pub use rules::{FailureConfig, RuleConfig};
pub use tcp::{TcpFaults, TcpRule};

use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::Path;

pub const DEFAULT_CONFIG_FILE: &str = "faultline.yaml";
pub const DEFAULT_RULES_FILE: &str = "faultline-rules.json";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// HTTP rules seeding the store when no persisted rule file exists yet.
    #[serde(default)]
    pub rules: Vec<RuleConfig>,

    /// One TCP proxy per entry, immutable after startup.
    #[serde(default, rename = "tcpRules")]
    pub tcp_rules: Vec<TcpRule>,

    /// Override for the persisted rule file path.
    #[serde(default, rename = "rulesFile", skip_serializing_if = "Option::is_none")]
    pub rules_file: Option<String>,
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load the default configuration file, treating its absence as an
    /// empty configuration. Used when no `--config` flag was given.
    pub fn load_or_default(path: &str) -> Result<Self, anyhow::Error> {
        match std::fs::read_to_string(path) {
            Ok(contents) => {
                let config: Config = serde_yaml::from_str(&contents)?;
                config.validate()?;
                Ok(config)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn rules_file(&self) -> &str {
        self.rules_file.as_deref().unwrap_or(DEFAULT_RULES_FILE)
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        for rule in &self.rules {
            rule.validate()?;
        }
        for tcp_rule in &self.tcp_rules {
            tcp_rule.validate()?;
        }
        Ok(())
    }
}
