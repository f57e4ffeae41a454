//! Specdb Config - Configuration Structures
//!
//! Configuration for an in-memory store. Supports programmatic construction
//! with builder methods and loading from TOML.
//!
//! @version 0.1.0
//! @author Specdb Development Team

use crate::error::{Result, SpecdbError};
use serde::{Deserialize, Serialize};
use std::path::Path;

// =============================================================================
// Store Configuration
// =============================================================================

/// Configuration for a memory store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Events buffered per watch stream before the oldest are dropped.
    pub stream_capacity: usize,
    /// Whether the planner may turn filters into index scans.
    pub use_indexes: bool,
    /// Largest number of documents accepted by a single insert call.
    pub max_batch_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            stream_capacity: 1024,
            use_indexes: true,
            max_batch_size: 10_000,
        }
    }
}

impl StoreConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stream_capacity(mut self, capacity: usize) -> Self {
        self.stream_capacity = capacity;
        self
    }

    pub fn with_indexes(mut self, enabled: bool) -> Self {
        self.use_indexes = enabled;
        self
    }

    pub fn with_max_batch_size(mut self, size: usize) -> Self {
        self.max_batch_size = size;
        self
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| SpecdbError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| SpecdbError::Configuration(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    /// Reject settings the store cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.stream_capacity == 0 {
            return Err(SpecdbError::Configuration(
                "stream_capacity must be greater than zero".to_string(),
            ));
        }
        if self.max_batch_size == 0 {
            return Err(SpecdbError::Configuration(
                "max_batch_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = StoreConfig::default();
        assert_eq!(config.stream_capacity, 1024);
        assert!(config.use_indexes);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_toml_partial() {
        let config = StoreConfig::from_toml_str("stream_capacity = 8\n").unwrap();
        assert_eq!(config.stream_capacity, 8);
        assert!(config.use_indexes);
        assert_eq!(config.max_batch_size, 10_000);
    }

    #[test]
    fn test_invalid_config() {
        let err = StoreConfig::from_toml_str("stream_capacity = 0\n").unwrap_err();
        assert!(matches!(err, SpecdbError::Configuration(_)));

        let err = StoreConfig::from_toml_str("use_indexes = \"yes\"\n").unwrap_err();
        assert!(matches!(err, SpecdbError::Configuration(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = StoreConfig::from_file("/nonexistent/specdb.toml").unwrap_err();
        assert!(matches!(err, SpecdbError::Configuration(_)));
    }
}
