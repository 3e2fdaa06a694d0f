//! Store configuration for memrel
//!
//! Settings shared by the table registry and the default persistence channel.

use std::path::PathBuf;

use crate::error::{Error, Result};

/// Default base directory for persisted tables
pub const DEFAULT_VAR_LIB_DIR: &str = "/var/lib";

/// Default data directory name under the base directory
pub const DEFAULT_DATA_DIR_NAME: &str = "memrel";

/// Default proportion of spare buckets reserved next to a table's capacity
pub const DEFAULT_CONFLICT_PROPORTION: f32 = 0.2;

/// Default cap on the key generation loop
pub const DEFAULT_KEY_GENERATION_ATTEMPTS: usize = 1000;

/// Store configuration
#[derive(Debug, Clone, PartialEq)]
pub struct StoreConfig {
    /// Base directory for persisted data
    pub var_lib_dir: PathBuf,
    /// Data directory name, joined to `var_lib_dir`
    pub data_dir_name: String,
    /// Spare bucket proportion used by tables created through the registry
    pub conflict_proportion: f32,
    /// Maximum number of generated keys tried before an insert gives up
    pub key_generation_attempts: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            var_lib_dir: PathBuf::from(DEFAULT_VAR_LIB_DIR),
            data_dir_name: DEFAULT_DATA_DIR_NAME.to_string(),
            conflict_proportion: DEFAULT_CONFLICT_PROPORTION,
            key_generation_attempts: DEFAULT_KEY_GENERATION_ATTEMPTS,
        }
    }
}

impl StoreConfig {
    /// Create a new store config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a config from the defaults overlaid with `MEMREL_*` environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(dir) = std::env::var("MEMREL_VAR_LIB_DIR") {
            config = config.var_lib_dir(dir);
        }
        if let Ok(name) = std::env::var("MEMREL_DATA_DIR_NAME") {
            config = config.data_dir_name(name);
        }
        if let Ok(raw) = std::env::var("MEMREL_CONFLICT_PROPORTION") {
            let proportion = raw.parse::<f32>().map_err(|_| {
                Error::Config(format!("MEMREL_CONFLICT_PROPORTION: invalid value '{}'", raw))
            })?;
            config = config.conflict_proportion(proportion);
        }
        if let Ok(raw) = std::env::var("MEMREL_KEY_ATTEMPTS") {
            let attempts = raw.parse::<usize>().map_err(|_| {
                Error::Config(format!("MEMREL_KEY_ATTEMPTS: invalid value '{}'", raw))
            })?;
            config = config.key_generation_attempts(attempts);
        }

        config.validate()?;
        Ok(config)
    }

    /// Set the base directory
    pub fn var_lib_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.var_lib_dir = dir.into();
        self
    }

    /// Set the data directory name
    pub fn data_dir_name(mut self, name: impl Into<String>) -> Self {
        self.data_dir_name = name.into();
        self
    }

    /// Set the spare bucket proportion
    pub fn conflict_proportion(mut self, proportion: f32) -> Self {
        self.conflict_proportion = proportion;
        self
    }

    /// Set the key generation cap
    pub fn key_generation_attempts(mut self, attempts: usize) -> Self {
        self.key_generation_attempts = attempts;
        self
    }

    /// Directory holding persisted tables
    pub fn data_dir(&self) -> PathBuf {
        self.var_lib_dir.join(&self.data_dir_name)
    }

    /// Check the settings are usable
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.conflict_proportion) {
            return Err(Error::Config(format!(
                "conflict proportion must be within [0, 1], got {}",
                self.conflict_proportion
            )));
        }
        if self.key_generation_attempts == 0 {
            return Err(Error::Config(
                "key generation attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = StoreConfig::new();
        assert_eq!(config.data_dir(), PathBuf::from("/var/lib/memrel"));
        assert_eq!(config.key_generation_attempts, 1000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_setters() {
        let config = StoreConfig::new()
            .var_lib_dir("")
            .data_dir_name("tmp")
            .conflict_proportion(0.5)
            .key_generation_attempts(3);

        assert_eq!(config.data_dir(), PathBuf::from("tmp"));
        assert_eq!(config.conflict_proportion, 0.5);
        assert_eq!(config.key_generation_attempts, 3);
    }

    #[test]
    fn test_invalid_config() {
        let config = StoreConfig::new().conflict_proportion(1.5);
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let config = StoreConfig::new().key_generation_attempts(0);
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }
}
