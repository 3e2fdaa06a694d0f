//! Joins for memrel selectors

use crate::catalog::TableRegistry;
use crate::error::Result;
use crate::storage::{RecordCollection, Resultset};

/// Follow a foreign key of `from_table` and tag the related rows with `alias`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Join {
    from_table: String,
    foreign_key: String,
    alias: String,
    /// Alias of the `from_table` record in the incoming tuple; defaults to the table name
    from_alias: Option<String>,
}

impl Join {
    pub fn new(
        from_table: impl Into<String>,
        foreign_key: impl Into<String>,
        alias: impl Into<String>,
    ) -> Self {
        Self {
            from_table: from_table.into(),
            foreign_key: foreign_key.into(),
            alias: alias.into(),
            from_alias: None,
        }
    }

    /// Read the `from_table` record under `alias` instead of the table name
    pub fn from_alias(mut self, alias: impl Into<String>) -> Self {
        self.from_alias = Some(alias.into());
        self
    }

    pub fn from_table_name(&self) -> &str {
        &self.from_table
    }

    pub fn foreign_key_name(&self) -> &str {
        &self.foreign_key
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// Name of the table the join leads to
    pub fn to_table_name(&self, registry: &TableRegistry) -> Result<String> {
        registry
            .get_table(&self.from_table)?
            .get_foreign_table(&self.foreign_key)
    }

    /// Related rows for one incoming tuple, each in its own collection under `alias`
    pub fn get(&self, registry: &TableRegistry, from: &RecordCollection) -> Result<Resultset> {
        let table = registry.get_table(&self.from_table)?;
        let from_alias = self.from_alias.as_deref().unwrap_or(&self.from_table);
        let record = from.record(from_alias)?;
        table.get_joined_records(registry, &self.foreign_key, record, &self.alias)
    }
}
