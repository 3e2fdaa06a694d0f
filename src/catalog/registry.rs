//! Table registry for memrel
//!
//! This module owns every table by name and mediates their lifecycle: creation,
//! lookup, destruction and persistence.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

use crate::config::StoreConfig;
use crate::error::{Error, Result};
use crate::persistence::{JsonFile, PersistenceRegistry, DEFAULT};
use crate::storage::Table;

static NEXT_REGISTRY_ID: AtomicU64 = AtomicU64::new(1);

/// Proof that a table destruction comes from its registry
#[derive(Debug)]
pub struct DestroyToken {
    registry_id: u64,
}

impl DestroyToken {
    pub(crate) fn registry_id(&self) -> u64 {
        self.registry_id
    }
}

/// Table registry - owns all tables by name
#[derive(Debug)]
pub struct TableRegistry {
    /// Identity stamped on the tables this registry creates
    id: u64,
    /// Store settings
    config: StoreConfig,
    /// Tables by name
    tables: RwLock<HashMap<String, Arc<Table>>>,
    /// Persistence channels
    persistence: PersistenceRegistry,
}

impl TableRegistry {
    /// Create an empty registry; the `DEFAULT` channel writes JSON files to the
    /// configured data directory
    pub fn new(config: StoreConfig) -> Result<Self> {
        config.validate()?;
        let persistence = PersistenceRegistry::new(Arc::new(JsonFile::from_config(&config)));
        Ok(Self {
            id: NEXT_REGISTRY_ID.fetch_add(1, Ordering::Relaxed),
            config,
            tables: RwLock::new(HashMap::new()),
            persistence,
        })
    }

    /// Store settings
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Persistence channels
    pub fn persistence(&self) -> &PersistenceRegistry {
        &self.persistence
    }

    fn token(&self) -> DestroyToken {
        DestroyToken {
            registry_id: self.id,
        }
    }

    /// Declare a new table using the configured conflict proportion
    pub fn create_table(&self, name: &str, capacity: usize) -> Result<Arc<Table>> {
        self.create_table_with_conflict(name, capacity, self.config.conflict_proportion)
    }

    /// Declare a new table with its own conflict proportion
    pub fn create_table_with_conflict(
        &self,
        name: &str,
        capacity: usize,
        conflict_proportion: f32,
    ) -> Result<Arc<Table>> {
        let mut tables = self.tables.write().unwrap();

        if tables.contains_key(name) {
            return Err(Error::TableAlreadyExists(name.to_string()));
        }

        let table = Arc::new(
            Table::new(name, capacity)
                .conflict_proportion(conflict_proportion)
                .key_generation_attempts(self.config.key_generation_attempts)
                .owned_by(self.id),
        );
        tables.insert(name.to_string(), table.clone());
        info!(table = name, capacity, "Table registered");
        Ok(table)
    }

    /// Get a table by name
    pub fn get_table(&self, name: &str) -> Result<Arc<Table>> {
        let tables = self.tables.read().unwrap();
        tables
            .get(name)
            .cloned()
            .ok_or_else(|| Error::TableNotFound(name.to_string()))
    }

    /// Check if a table exists
    pub fn has_table(&self, name: &str) -> bool {
        let tables = self.tables.read().unwrap();
        tables.contains_key(name)
    }

    /// List all table names, sorted
    pub fn list_tables(&self) -> Vec<String> {
        let tables = self.tables.read().unwrap();
        let mut names: Vec<String> = tables.keys().cloned().collect();
        names.sort();
        names
    }

    /// Destroy a table and forget it
    pub fn destroy(&self, name: &str) -> Result<bool> {
        let table = self
            .tables
            .write()
            .unwrap()
            .remove(name)
            .ok_or_else(|| Error::TableNotFound(name.to_string()))?;
        table.destroy(&self.token())
    }

    /// Persist a table through the `DEFAULT` channel
    pub fn persist(&self, name: &str) -> Result<()> {
        self.persist_to(name, DEFAULT)
    }

    /// Persist a table through a named channel
    pub fn persist_to(&self, name: &str, channel: &str) -> Result<()> {
        let table = self.get_table(name)?;
        self.persistence.get_channel(channel)?.persist(name, &table)
    }

    /// Load a table from the `DEFAULT` channel
    pub fn load(&self, name: &str) -> Result<Arc<Table>> {
        self.load_from(name, DEFAULT)
    }

    /// Load a table from a named channel, replacing any table registered under `name`
    pub fn load_from(&self, name: &str, channel: &str) -> Result<Arc<Table>> {
        let loaded = self.persistence.get_channel(channel)?.load(name)?;
        let table = Arc::new(
            loaded
                .key_generation_attempts(self.config.key_generation_attempts)
                .owned_by(self.id),
        );

        let replaced = self
            .tables
            .write()
            .unwrap()
            .insert(name.to_string(), table.clone());
        if let Some(previous) = replaced {
            warn!(table = name, channel, "Loaded table replaces a registered one");
            previous.destroy(&self.token())?;
        }
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Column, ColumnType};
    use crate::storage::Value;
    use tempfile::TempDir;

    fn registry(dir: &TempDir) -> TableRegistry {
        TableRegistry::new(StoreConfig::new().var_lib_dir(dir.path())).unwrap()
    }

    #[test]
    fn test_create_table() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir);

        let table = registry.create_table("users", 10).unwrap();
        assert_eq!(table.name(), "users");
        assert!(registry.has_table("users"));
        assert!(matches!(
            registry.create_table("users", 10),
            Err(Error::TableAlreadyExists(_))
        ));
    }

    #[test]
    fn test_get_missing_table() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir);
        assert!(matches!(
            registry.get_table("nope"),
            Err(Error::TableNotFound(_))
        ));
        assert!(matches!(registry.destroy("nope"), Err(Error::TableNotFound(_))));
    }

    #[test]
    fn test_list_tables() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir);
        registry.create_table("b", 1).unwrap();
        registry.create_table("a", 1).unwrap();
        assert_eq!(registry.list_tables(), vec!["a", "b"]);
    }

    #[test]
    fn test_destroy() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir);
        let table = registry.create_table("users", 10).unwrap();
        table
            .add_column(Column::new("name", ColumnType::String, 8).unwrap())
            .unwrap();
        table.create().unwrap();

        assert!(registry.destroy("users").unwrap());
        assert!(!registry.has_table("users"));
        assert!(!table.is_created());
    }

    #[test]
    fn test_destroy_with_foreign_token() {
        let dir = TempDir::new().unwrap();
        let owner = registry(&dir);
        let other = registry(&dir);
        let table = owner.create_table("users", 10).unwrap();

        assert!(matches!(
            table.destroy(&other.token()),
            Err(Error::ForbiddenAction(_))
        ));
        assert!(table.destroy(&owner.token()).is_ok());
    }

    #[test]
    fn test_load_replaces_registered_table() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir);
        let table = registry.create_table("users", 10).unwrap();
        table
            .add_column(Column::new("name", ColumnType::String, 8).unwrap())
            .unwrap();
        table.create().unwrap();
        table
            .set(Some("u1"), [("name", Value::from("ada"))], false)
            .unwrap();
        registry.persist("users").unwrap();

        table
            .set(Some("u2"), [("name", Value::from("bob"))], false)
            .unwrap();
        let loaded = registry.load("users").unwrap();
        assert_eq!(loaded.count().unwrap(), 1);
        assert!(!table.is_created());
        assert!(Arc::ptr_eq(&loaded, &registry.get_table("users").unwrap()));

        // A loaded table is owned by the registry that loaded it
        assert!(registry.destroy("users").unwrap());
    }

    #[test]
    fn test_load_uses_configured_conflict_proportion() {
        let dir = TempDir::new().unwrap();
        let registry = TableRegistry::new(
            StoreConfig::new()
                .var_lib_dir(dir.path())
                .conflict_proportion(0.5),
        )
        .unwrap();
        let table = registry.create_table("users", 10).unwrap();
        assert_eq!(table.spare_proportion(), 0.5);
        table
            .add_column(Column::new("name", ColumnType::String, 8).unwrap())
            .unwrap();
        table.create().unwrap();
        registry.persist("users").unwrap();

        let loaded = registry.load("users").unwrap();
        assert_eq!(loaded.spare_proportion(), 0.5);
    }

    #[test]
    fn test_unknown_channel() {
        let dir = TempDir::new().unwrap();
        let registry = registry(&dir);
        registry.create_table("users", 10).unwrap();
        assert!(matches!(
            registry.persist_to("users", "backup"),
            Err(Error::ChannelNotFound(_))
        ));
    }
}
