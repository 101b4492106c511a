use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;

use serde::{Deserialize, Serialize};
use vellum_engine::EngineConfig;
use vellum_search::SearchConfig;

use crate::error::{ServerError, ServerResult};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Serve `POST /v1/search` and object reads to callers without a user
    /// header.
    pub allow_anonymous_read: bool,
    /// Largest accepted request body, in bytes.
    pub max_body_bytes: usize,
    pub engine: EngineConfig,
    pub search: SearchConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 8080)),
            allow_anonymous_read: true,
            max_body_bytes: 2 * 1024 * 1024,
            engine: EngineConfig::default(),
            search: SearchConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn from_toml_str(source: &str) -> ServerResult<Self> {
        let config: Self =
            toml::from_str(source).map_err(|e| ServerError::Config(e.to_string()))?;
        config.engine.validate()?;
        config.search.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> ServerResult<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }
}
