use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{DataError, DataResult};

/// Settings for scroll-style pagination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrollConfig {
    /// Keep-alive requested for a scroll lease on every continuation
    pub timeout_secs: u64,

    /// Rows requested per page
    pub page_size: usize,
}

impl Default for ScrollConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 60,
            page_size: 100,
        }
    }
}

impl ScrollConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Configuration for a [`DataContext`](crate::DataContext)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataContextConfig {
    pub scroll: ScrollConfig,

    /// Allow count queries to be answered by scanning every row locally
    pub allow_count_materialization: bool,

    /// Maximum number of rows a local sort may buffer (unbounded when absent)
    pub sort_buffer_limit: Option<usize>,
}

impl Default for DataContextConfig {
    fn default() -> Self {
        Self {
            scroll: ScrollConfig::default(),
            allow_count_materialization: true,
            sort_buffer_limit: None,
        }
    }
}

impl DataContextConfig {
    pub fn from_toml_str(content: &str) -> DataResult<Self> {
        let config: DataContextConfig =
            toml::from_str(content).map_err(|e| DataError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> DataResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        tracing::debug!("Loaded data context configuration from {}", path.display());
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> DataResult<()> {
        if self.scroll.page_size == 0 {
            return Err(DataError::Config("scroll.page_size must be positive".to_string()));
        }
        if self.scroll.timeout_secs == 0 {
            return Err(DataError::Config("scroll.timeout_secs must be positive".to_string()));
        }
        Ok(())
    }
}
