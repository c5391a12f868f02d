use serde::Deserialize;
use wsrelay_core::{RelayError, Result};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BrokerConfig {
    pub version: u32,

    #[serde(default)]
    pub broker: BrokerSection,
}

impl BrokerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(RelayError::BadConfig(
                "version must be 1".into(),
            ));
        }
        self.broker.validate()?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BrokerSection {
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Reassembly cap per logical message; exceeding it closes the session.
    #[serde(default = "default_max_message_bytes")]
    pub max_message_bytes: usize,

    /// Bound of each session's outbound queue. A full queue drops frames
    /// (best-effort delivery).
    #[serde(default = "default_session_queue_depth")]
    pub session_queue_depth: usize,
}

impl Default for BrokerSection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            max_message_bytes: default_max_message_bytes(),
            session_queue_depth: default_session_queue_depth(),
        }
    }
}

impl BrokerSection {
    pub fn validate(&self) -> Result<()> {
        if !(1024..=64 * 1024 * 1024).contains(&self.max_message_bytes) {
            return Err(RelayError::BadConfig(
                "broker.max_message_bytes must be between 1024 and 67108864".into(),
            ));
        }
        if !(1..=65536).contains(&self.session_queue_depth) {
            return Err(RelayError::BadConfig(
                "broker.session_queue_depth must be between 1 and 65536".into(),
            ));
        }
        Ok(())
    }
}

fn default_listen() -> String {
    "0.0.0.0:8080".into()
}
fn default_max_message_bytes() -> usize {
    1024 * 1024
}
fn default_session_queue_depth() -> usize {
    256
}
