//! Broker config loader (strict parsing).

pub mod schema;

use std::fs;

use wsrelay_core::{RelayError, Result};

pub use schema::{BrokerConfig, BrokerSection};

pub fn load_from_file(path: &str) -> Result<BrokerConfig> {
    let s = fs::read_to_string(path)
        .map_err(|e| RelayError::BadConfig(format!("read config failed: {e}")))?;
    load_from_str(&s)
}

pub fn load_from_str(s: &str) -> Result<BrokerConfig> {
    let cfg: BrokerConfig =
        serde_yaml::from_str(s).map_err(|e| RelayError::BadConfig(format!("invalid yaml: {e}")))?;
    cfg.validate()?;
    Ok(cfg)
}
