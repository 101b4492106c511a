use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{SearchError, SearchResult};

/// Configuration for the search pipeline.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Requests asking for more edges are clamped to this.
    pub max_take: u64,
    /// Lifetime of a cached ranking window.
    pub cache_ttl_secs: u64,
    /// Consult and fill the embedding cache on hybrid searches.
    pub cache_enabled: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_take: 100,
            cache_ttl_secs: 300,
            cache_enabled: true,
        }
    }
}

impl SearchConfig {
    pub fn from_toml_str(source: &str) -> SearchResult<Self> {
        let config: Self = toml::from_str(source).map_err(|e| SearchError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> SearchResult<()> {
        if self.max_take == 0 {
            return Err(SearchError::Config("max_take must be at least 1".into()));
        }
        if self.cache_enabled && self.cache_ttl_secs == 0 {
            return Err(SearchError::Config(
                "cache_ttl_secs must be positive when the cache is enabled".into(),
            ));
        }
        Ok(())
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = SearchConfig::default();
        assert_eq!(c.max_take, 100);
        assert_eq!(c.cache_ttl(), Duration::from_secs(300));
        assert!(c.cache_enabled);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let c = SearchConfig::from_toml_str("max_take = 25").unwrap();
        assert_eq!(c.max_take, 25);
        assert_eq!(c.cache_ttl_secs, 300);
    }

    #[test]
    fn rejects_zero_take() {
        assert!(matches!(
            SearchConfig::from_toml_str("max_take = 0"),
            Err(SearchError::Config(_))
        ));
    }
}
