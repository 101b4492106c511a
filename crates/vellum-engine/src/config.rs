use serde::{Deserialize, Serialize};
use vellum_guard::GuardConfig;

use crate::error::{EngineError, EngineResult};

/// Configuration for the mutation engine.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Worker bits stamped into minted ids (0..=1023). A random worker is
    /// chosen when unset.
    pub worker_id: Option<u16>,
    /// Largest batch accepted by one call.
    pub max_batch_size: usize,
    pub guard: GuardConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            worker_id: None,
            max_batch_size: 100,
            guard: GuardConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Parse a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(source: &str) -> EngineResult<Self> {
        let config: Self = toml::from_str(source).map_err(|e| EngineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.max_batch_size == 0 {
            return Err(EngineError::Config("max_batch_size must be positive".into()));
        }
        if self.worker_id.is_some_and(|w| w > 1023) {
            return Err(EngineError::Config("worker_id must be at most 1023".into()));
        }
        Ok(())
    }
}
