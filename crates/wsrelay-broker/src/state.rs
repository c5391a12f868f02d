//! Shared application state for the wsRelay broker.

use std::sync::Arc;

use crate::config::BrokerConfig;
use crate::group::GroupRegistry;

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    cfg: BrokerConfig,
    registry: GroupRegistry,
}

impl AppState {
    pub fn new(cfg: BrokerConfig) -> Self {
        let registry = GroupRegistry::new(cfg.broker.session_queue_depth);
        Self {
            inner: Arc::new(AppStateInner { cfg, registry }),
        }
    }

    pub fn cfg(&self) -> &BrokerConfig {
        &self.inner.cfg
    }

    pub fn registry(&self) -> &GroupRegistry {
        &self.inner.registry
    }
}
