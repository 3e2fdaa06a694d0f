//! Persistence module
//!
//! Tables are saved to and loaded from named channels. A `PersistenceRegistry` maps
//! channel names to implementations and is seeded with a JSON file channel under
//! `DEFAULT`.

pub mod json;

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::{Arc, RwLock};

use crate::error::{Error, Result};
use crate::storage::Table;

pub use json::JsonFile;

/// Name of the channel used when none is given
pub const DEFAULT: &str = "default";

/// A place tables can be persisted to and loaded from
pub trait Persistence: Send + Sync + Debug {
    /// Save the declaration and rows of `table` under `name`
    fn persist(&self, name: &str, table: &Table) -> Result<()>;

    /// Rebuild a created table saved under `name`
    fn load(&self, name: &str) -> Result<Table>;
}

/// Channel name to persistence implementation
#[derive(Debug)]
pub struct PersistenceRegistry {
    channels: RwLock<HashMap<String, Arc<dyn Persistence>>>,
}

impl PersistenceRegistry {
    /// Create a registry whose `DEFAULT` channel is `default`
    pub fn new(default: Arc<dyn Persistence>) -> Self {
        let mut channels: HashMap<String, Arc<dyn Persistence>> = HashMap::new();
        channels.insert(DEFAULT.to_string(), default);
        Self {
            channels: RwLock::new(channels),
        }
    }

    /// Replace the `DEFAULT` channel
    pub fn set_default_channel(&self, channel: Arc<dyn Persistence>) -> &Self {
        self.set_channel(DEFAULT, channel)
    }

    /// Register or replace a named channel
    pub fn set_channel(&self, name: &str, channel: Arc<dyn Persistence>) -> &Self {
        self.channels
            .write()
            .unwrap()
            .insert(name.to_string(), channel);
        self
    }

    /// Get a channel by name
    pub fn get_channel(&self, name: &str) -> Result<Arc<dyn Persistence>> {
        self.channels
            .read()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::ChannelNotFound(name.to_string()))
    }

    /// Registered channel names
    pub fn channel_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.channels.read().unwrap().keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_channel_is_seeded() {
        let registry = PersistenceRegistry::new(Arc::new(JsonFile::new("/tmp/memrel-a")));
        assert!(registry.get_channel(DEFAULT).is_ok());
        assert_eq!(registry.channel_names(), vec![DEFAULT.to_string()]);
    }

    #[test]
    fn test_named_channels() {
        let registry = PersistenceRegistry::new(Arc::new(JsonFile::new("/tmp/memrel-a")));
        assert!(matches!(
            registry.get_channel("backup"),
            Err(Error::ChannelNotFound(_))
        ));

        registry.set_channel("backup", Arc::new(JsonFile::new("/tmp/memrel-b")));
        assert!(registry.get_channel("backup").is_ok());

        registry.set_default_channel(Arc::new(JsonFile::new("/tmp/memrel-c")));
        assert_eq!(registry.channel_names().len(), 2);
    }
}
