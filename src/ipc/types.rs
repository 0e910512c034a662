use crate::config::Config;
use crate::engine::Engine;
use crate::remote::RecordClient;
use serde::Deserialize;
use std::sync::{Arc, RwLock};

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// The active record source and the engine bound to it.
pub struct Source {
    pub label: String,
    pub engine: Engine,
}

impl Source {
    pub fn new(client: Arc<dyn RecordClient>, config: &Config) -> Self {
        Self {
            label: client.describe(),
            engine: Engine::new(client, config.limits.clone()),
        }
    }
}

pub struct AppState {
    pub config: Config,
    source: RwLock<Option<Arc<Source>>>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            source: RwLock::new(None),
        }
    }

    pub fn source(&self) -> Option<Arc<Source>> {
        match self.source.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Replaces the active source. Requests already holding the old one finish against it.
    pub fn install(&self, source: Source) -> Arc<Source> {
        let source = Arc::new(source);
        let mut slot = self
            .source
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *slot = Some(source.clone());
        source
    }
}
