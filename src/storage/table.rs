//! Table storage for memrel
//!
//! This module combines the schema, the row store, secondary indexes and foreign keys
//! to provide table operations. A table is declared (columns, indexes, foreign keys),
//! then created, after which rows can be written. Every part of the table sits behind
//! its own lock so a table can be shared as `Arc<Table>`.

use indexmap::{IndexMap, IndexSet};
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, info, warn};

use super::foreign_key::{key_anchored_target, ForeignKey, ForeignKeyDirection, ForeignKeyPair};
use super::id::IdGenerator;
use super::index::{Index, Operator};
use super::record::{Record, Resultset};
use super::row_store::RowStore;
use super::value::Value;
use crate::catalog::{Column, DestroyToken, Schema, TableRegistry, KEY_COL_NAME};
use crate::config::{DEFAULT_CONFLICT_PROPORTION, DEFAULT_KEY_GENERATION_ATTEMPTS};
use crate::error::{Error, Result};

/// Separator between field names in an index key
pub const INDEX_FIELD_SEPARATOR: &str = "|";

/// A `field operator value` predicate answered through the table's indexes
#[derive(Debug, Clone, PartialEq)]
pub struct IndexFilter {
    pub operator: Operator,
    pub field: String,
    pub value: Value,
}

impl IndexFilter {
    pub fn new(operator: Operator, field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            operator,
            field: field.into(),
            value: value.into(),
        }
    }

    /// Check the predicate against a record; incomparable values never match
    pub fn matches(&self, record: &Record) -> Result<bool> {
        let value = record.get_value(&self.field)?;
        Ok(value
            .compare(&self.value)
            .map_or(false, |ord| self.operator.matches(ord)))
    }
}

/// A fixed-capacity table
#[derive(Debug)]
pub struct Table {
    /// Table name
    name: String,
    /// Maximum number of rows
    capacity: usize,
    /// Spare bucket proportion handed to the row store
    conflict_proportion: f32,
    /// Cap on generated key retries
    key_generation_attempts: usize,
    /// Registry allowed to destroy the table
    owner: Option<u64>,
    /// Column layout
    schema: RwLock<Schema>,
    /// Indexes keyed by their `|`-joined field list
    indexes: RwLock<IndexMap<String, Index>>,
    /// Foreign key views keyed by name
    foreign_keys: RwLock<IndexMap<String, ForeignKey>>,
    /// Row storage, present once the table is created
    store: RwLock<Option<Arc<RowStore>>>,
    /// Key source for rows inserted without a key
    id_generator: RwLock<Option<Arc<dyn IdGenerator>>>,
    /// Serializes row writes so index entries and links follow the stored rows
    writer: Mutex<()>,
}

impl Table {
    /// Declare a table holding at most `capacity` rows
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        Self {
            name: name.into(),
            capacity,
            conflict_proportion: DEFAULT_CONFLICT_PROPORTION,
            key_generation_attempts: DEFAULT_KEY_GENERATION_ATTEMPTS,
            owner: None,
            schema: RwLock::new(Schema::new()),
            indexes: RwLock::new(IndexMap::new()),
            foreign_keys: RwLock::new(IndexMap::new()),
            store: RwLock::new(None),
            id_generator: RwLock::new(None),
            writer: Mutex::new(()),
        }
    }

    /// Set the spare bucket proportion used when the table is created
    pub fn conflict_proportion(mut self, proportion: f32) -> Self {
        self.conflict_proportion = proportion;
        self
    }

    /// Set how many generated keys are tried before an insert gives up
    pub fn key_generation_attempts(mut self, attempts: usize) -> Self {
        self.key_generation_attempts = attempts;
        self
    }

    pub(crate) fn owned_by(mut self, registry_id: u64) -> Self {
        self.owner = Some(registry_id);
        self
    }

    /// Get table name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Maximum number of rows
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Spare bucket proportion handed to the row store
    pub fn spare_proportion(&self) -> f32 {
        self.conflict_proportion
    }

    /// Whether `create` has been called
    pub fn is_created(&self) -> bool {
        self.store.read().unwrap().is_some()
    }

    fn store(&self) -> Result<Arc<RowStore>> {
        self.store
            .read()
            .unwrap()
            .clone()
            .ok_or_else(|| Error::TableNotCreated(self.name.clone()))
    }

    // ========== Declaration ==========

    /// Add a column; only allowed before the table is created
    pub fn add_column(&self, column: Column) -> Result<()> {
        if self.is_created() {
            return Err(Error::TableAlreadyCreated(self.name.clone()));
        }
        self.schema.write().unwrap().add_column(column, &self.name)
    }

    /// Check if a column exists
    pub fn has_column(&self, name: &str) -> bool {
        self.schema.read().unwrap().has_column(name)
    }

    /// Columns in declaration order
    pub fn columns(&self) -> Vec<Column> {
        self.schema.read().unwrap().columns().cloned().collect()
    }

    /// Column names in declaration order
    pub fn column_names(&self) -> Vec<String> {
        self.schema.read().unwrap().column_names()
    }

    /// Width of one encoded row
    pub fn row_size(&self) -> usize {
        self.schema.read().unwrap().row_size()
    }

    /// Use `generator` for rows inserted without a key
    pub fn unique_id(&self, generator: Arc<dyn IdGenerator>) -> &Self {
        *self.id_generator.write().unwrap() = Some(generator);
        self
    }

    /// Allocate the row store; columns are frozen from now on
    pub fn create(&self) -> Result<()> {
        let schema = self.schema.read().unwrap();
        let mut store = self.store.write().unwrap();
        if store.is_some() {
            return Err(Error::TableAlreadyCreated(self.name.clone()));
        }
        if schema.column_count() == 0 {
            return Err(Error::SyntaxError(format!(
                "table '{}' has no column",
                self.name
            )));
        }

        *store = Some(Arc::new(RowStore::new(
            self.name.clone(),
            self.capacity,
            self.conflict_proportion,
            schema.row_size(),
        )));
        info!(
            table = %self.name,
            capacity = self.capacity,
            row_size = schema.row_size(),
            "Table created"
        );
        Ok(())
    }

    // ========== Indexes ==========

    /// Declare an index over `fields`; existing rows are indexed immediately
    pub fn add_index(&self, fields: &[&str]) -> Result<()> {
        if fields.is_empty() {
            return Err(Error::IndexDefinition(format!(
                "index on table '{}' needs at least one field",
                self.name
            )));
        }
        {
            let schema = self.schema.read().unwrap();
            for field in fields {
                if !schema.has_column(field) {
                    return Err(Error::IndexDefinition(format!(
                        "unknown field '{}' in table '{}'",
                        field, self.name
                    )));
                }
            }
        }

        let index_key = fields.join(INDEX_FIELD_SEPARATOR);
        let mut indexes = self.indexes.write().unwrap();
        if indexes.contains_key(&index_key) {
            return Ok(());
        }

        let fields: Vec<String> = fields.iter().map(|f| f.to_string()).collect();
        let mut index = Index::new(format!("{}_index_{}", self.name, index_key), fields);

        let created = self.store.read().unwrap().clone();
        if let Some(store) = created {
            let schema = self.schema.read().unwrap();
            for key in store.keys() {
                // Rows deleted since the key snapshot are skipped
                let Some(row) = store.get(&key) else {
                    continue;
                };
                let values = schema.decode_row(&row, &self.name)?;
                index.insert(&key, composite(&index, &values));
            }
            debug!(table = %self.name, index = %index_key, entries = index.len(), "Index backfilled");
        }

        indexes.insert(index_key, index);
        Ok(())
    }

    /// Check if an index covers exactly `fields`
    pub fn has_index(&self, fields: &[&str]) -> bool {
        let index_key = fields.join(INDEX_FIELD_SEPARATOR);
        self.indexes.read().unwrap().contains_key(&index_key)
    }

    /// Declared index field lists
    pub fn index_fields(&self) -> Vec<Vec<String>> {
        self.indexes
            .read()
            .unwrap()
            .values()
            .map(|index| index.fields().to_vec())
            .collect()
    }

    /// Query the index declared over exactly `fields`
    pub fn index_lookup(
        &self,
        fields: &[&str],
        operator: Operator,
        values: &[Value],
    ) -> Result<IndexSet<String>> {
        let index_key = fields.join(INDEX_FIELD_SEPARATOR);
        let indexes = self.indexes.read().unwrap();
        let index = indexes.get(&index_key).ok_or_else(|| {
            Error::IndexDefinition(format!(
                "no index on '{}' in table '{}'",
                index_key, self.name
            ))
        })?;
        Ok(index.get_keys(operator, values))
    }

    // ========== Foreign keys ==========

    /// Declare `from_field` as referencing `to_table.to_field`.
    ///
    /// The reflected view is registered on the target table under `"{table}s"` when
    /// `to_field` is `_key`, and under `to_field` otherwise.
    pub fn add_foreign_key(
        &self,
        registry: &TableRegistry,
        name: &str,
        to_table: &str,
        from_field: &str,
        to_field: &str,
    ) -> Result<()> {
        if from_field != KEY_COL_NAME && !self.has_column(from_field) {
            return Err(Error::ColumnNotFound(from_field.to_string(), self.name.clone()));
        }
        let target = registry.get_table(to_table)?;
        if to_field != KEY_COL_NAME && !target.has_column(to_field) {
            return Err(Error::ColumnNotFound(to_field.to_string(), to_table.to_string()));
        }

        let reflection_name = if to_field == KEY_COL_NAME {
            format!("{}s", self.name)
        } else {
            to_field.to_string()
        };
        if self.foreign_keys.read().unwrap().contains_key(name) {
            return Err(Error::SyntaxError(format!(
                "foreign key '{}' already declared on table '{}'",
                name, self.name
            )));
        }
        let self_reference = target.name == self.name;
        if target.foreign_keys.read().unwrap().contains_key(&reflection_name)
            || (self_reference && reflection_name == name)
        {
            return Err(Error::SyntaxError(format!(
                "foreign key '{}' already declared on table '{}'",
                reflection_name, to_table
            )));
        }

        if to_field != KEY_COL_NAME {
            target.add_index(&[to_field])?;
            if from_field != KEY_COL_NAME {
                self.add_index(&[from_field])?;
            }
        }

        let pair = ForeignKeyPair::new(name, self.name.clone(), from_field, to_table, to_field);
        let declared = ForeignKey::new(pair.clone(), ForeignKeyDirection::From);
        let reflected = declared.reflected();

        // Separate lock scopes: the target may be this very table
        self.foreign_keys
            .write()
            .unwrap()
            .insert(name.to_string(), declared.clone());
        target
            .foreign_keys
            .write()
            .unwrap()
            .insert(reflection_name.clone(), reflected);

        if pair.is_key_anchored() && self.is_created() {
            let rows = self.records()?;
            let linked = declared.backfill(&rows);
            debug!(table = %self.name, foreign_key = name, linked, "Foreign key backfilled");
        }

        info!(
            table = %self.name,
            foreign_key = name,
            to_table,
            reflection = %reflection_name,
            "Foreign key added"
        );
        Ok(())
    }

    /// Get a foreign key view by name
    pub fn foreign_key(&self, name: &str) -> Result<ForeignKey> {
        self.foreign_keys
            .read()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::ForeignKeyNotFound(name.to_string(), self.name.clone()))
    }

    /// Names of the foreign key views held by this table
    pub fn foreign_key_names(&self) -> Vec<String> {
        self.foreign_keys.read().unwrap().keys().cloned().collect()
    }

    /// Name of the table a foreign key leads to
    pub fn get_foreign_table(&self, foreign_key_name: &str) -> Result<String> {
        Ok(self.foreign_key(foreign_key_name)?.to_table_name().to_string())
    }

    /// Rows of the foreign table related to `from`, each under `alias`
    pub fn get_joined_records(
        &self,
        registry: &TableRegistry,
        foreign_key_name: &str,
        from: &Record,
        alias: &str,
    ) -> Result<Resultset> {
        self.foreign_key(foreign_key_name)?
            .get_foreign_records(registry, from, alias)
    }

    // ========== Rows ==========

    /// Insert or update a row and return its key.
    ///
    /// Without a key, one is drawn from the id generator. Fields not given keep their
    /// current value on update and are null on insert. With `abs`, a negative value for
    /// an unsigned column is stored as its magnitude instead of being rejected.
    pub fn set<I, K, V>(&self, key: Option<&str>, values: I, abs: bool) -> Result<String>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let store = self.store()?;
        let _writer = self.writer.lock().unwrap();
        let schema = self.schema.read().unwrap();

        let mut given = IndexMap::new();
        for (field, value) in values {
            let field = field.into();
            if !schema.has_column(&field) {
                return Err(Error::ColumnNotFound(field, self.name.clone()));
            }
            given.insert(field, value.into());
        }

        let key = match key {
            Some(key) => key.to_string(),
            None => self.generate_key(&store)?,
        };

        let previous = match store.get(&key) {
            Some(row) => Some(schema.decode_row(&row, &self.name)?),
            None => None,
        };

        let mut merged = IndexMap::with_capacity(schema.column_count());
        for name in schema.column_names() {
            let value = given
                .shift_remove(&name)
                .or_else(|| previous.as_ref().and_then(|row| row.get(&name).cloned()))
                .unwrap_or(Value::Null);
            merged.insert(name, value);
        }

        let row = schema.encode(&merged, abs)?.freeze();
        let stored = schema.decode_row(&row, &self.name)?;
        drop(schema);

        self.unlink_row(&key, previous.as_ref());
        self.link_row(&key, &stored);

        if let Err(e) = store.set(&key, row) {
            warn!(table = %self.name, key = %key, error = %e, "Row rejected, restoring links");
            self.unlink_row(&key, Some(&stored));
            if let Some(previous) = &previous {
                self.link_row(&key, previous);
            }
            return Err(e);
        }

        debug!(table = %self.name, key = %key, update = previous.is_some(), "Row set");
        Ok(key)
    }

    fn generate_key(&self, store: &RowStore) -> Result<String> {
        let generator = self
            .id_generator
            .read()
            .unwrap()
            .clone()
            .ok_or_else(|| Error::MissingKeyGenerator(self.name.clone()))?;

        for _ in 0..self.key_generation_attempts {
            let key = generator.generate()?;
            if !store.exists(&key) {
                return Ok(key);
            }
        }
        Err(Error::KeyGenerationExhausted(
            self.name.clone(),
            self.key_generation_attempts,
        ))
    }

    /// Add index entries then key-anchored links for a stored row
    fn link_row(&self, key: &str, values: &IndexMap<String, Value>) {
        {
            let mut indexes = self.indexes.write().unwrap();
            for index in indexes.values_mut() {
                let composite = composite(index, values);
                index.insert(key, composite);
            }
        }

        let foreign_keys = self.foreign_keys.read().unwrap();
        for fk in foreign_keys.values() {
            if fk.direction() != ForeignKeyDirection::From || !fk.pair().is_key_anchored() {
                continue;
            }
            if let Some(target) = key_anchored_target(fk.from_field(), key, values) {
                fk.add_to_foreign_index(key, &target);
            }
        }
    }

    /// Remove key-anchored links then index entries of a stored row
    fn unlink_row(&self, key: &str, values: Option<&IndexMap<String, Value>>) {
        let Some(values) = values else {
            return;
        };

        {
            let foreign_keys = self.foreign_keys.read().unwrap();
            for fk in foreign_keys.values() {
                if fk.direction() == ForeignKeyDirection::From && fk.pair().is_key_anchored() {
                    fk.delete_from_foreign_index(key);
                }
            }
        }

        let mut indexes = self.indexes.write().unwrap();
        for index in indexes.values_mut() {
            let composite = composite(index, values);
            index.remove(key, composite);
        }
    }

    /// Get a decoded row; nullable fields that are null come back as `Value::Null`
    pub fn get_row(&self, key: &str) -> Result<IndexMap<String, Value>> {
        let store = self.store()?;
        let row = store
            .get(key)
            .ok_or_else(|| Error::RecordNotFound(key.to_string(), self.name.clone()))?;
        self.schema.read().unwrap().decode_row(&row, &self.name)
    }

    /// Get one field; a null field raises `FieldValueIsNull`
    pub fn get(&self, key: &str, field: &str) -> Result<Value> {
        let store = self.store()?;
        let row = store
            .get(key)
            .ok_or_else(|| Error::RecordNotFound(key.to_string(), self.name.clone()))?;
        if field == KEY_COL_NAME {
            return Ok(Value::String(key.to_string()));
        }
        self.schema
            .read()
            .unwrap()
            .decode_field(&row, field, &self.name)
    }

    /// Get a row as a record
    pub fn get_record(&self, key: &str) -> Result<Record> {
        self.find_record(key)?
            .ok_or_else(|| Error::RecordNotFound(key.to_string(), self.name.clone()))
    }

    /// Get a row as a record, if present
    pub fn find_record(&self, key: &str) -> Result<Option<Record>> {
        let store = self.store()?;
        let Some(row) = store.get(key) else {
            return Ok(None);
        };
        let values = self.schema.read().unwrap().decode_row(&row, &self.name)?;
        Ok(Some(Record::new(self.name.clone(), key, values)))
    }

    /// Check if a row exists
    pub fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.store()?.exists(key))
    }

    /// Delete a row, dropping its links and index entries first.
    /// Returns whether the row existed.
    pub fn del(&self, key: &str) -> Result<bool> {
        let store = self.store()?;
        let _writer = self.writer.lock().unwrap();
        let Some(row) = store.get(key) else {
            return Ok(false);
        };
        let values = self.schema.read().unwrap().decode_row(&row, &self.name)?;

        {
            let foreign_keys = self.foreign_keys.read().unwrap();
            for fk in foreign_keys.values() {
                fk.delete_from_foreign_index(key);
            }
        }
        {
            let mut indexes = self.indexes.write().unwrap();
            for index in indexes.values_mut() {
                let composite = composite(index, &values);
                index.remove(key, composite);
            }
        }

        let existed = store.del(key).is_some();
        debug!(table = %self.name, key, existed, "Row deleted");
        Ok(existed)
    }

    /// Number of rows
    pub fn count(&self) -> Result<usize> {
        Ok(self.store()?.len())
    }

    /// Snapshot of the row keys in insertion order
    pub fn keys(&self) -> Result<Vec<String>> {
        Ok(self.store()?.keys())
    }

    /// Iterate over the rows present when the iterator was created.
    /// Rows deleted meanwhile are skipped.
    pub fn iter(&self) -> Result<TableIter<'_>> {
        Ok(TableIter {
            table: self,
            keys: self.keys()?.into_iter(),
        })
    }

    /// Every row as a record
    pub fn records(&self) -> Result<Vec<Record>> {
        self.iter()?.collect()
    }

    /// Export rows, optionally restricted to `select` columns
    pub fn rows(&self, select: Option<&[&str]>) -> Result<Vec<(String, IndexMap<String, Value>)>> {
        if let Some(select) = select {
            for field in select {
                if !self.has_column(field) {
                    return Err(Error::ColumnNotFound(field.to_string(), self.name.clone()));
                }
            }
        }

        let mut rows = Vec::new();
        for record in self.iter()? {
            let record = record?;
            let key = record.key().to_string();
            let mut values = record.values().clone();
            if let Some(select) = select {
                values.retain(|field, _| select.contains(&field.as_str()));
            }
            rows.push((key, values));
        }
        Ok(rows)
    }

    // ========== Queries ==========

    /// Rows matching every filter.
    ///
    /// Each index is probed, per operator, with the longest prefix of its fields covered
    /// by filters using that operator; the resulting key sets are intersected. Without a
    /// usable index the table is scanned. Candidates are re-checked against all filters.
    pub fn filter_with_index(&self, filters: &[IndexFilter]) -> Result<Vec<Record>> {
        if filters.is_empty() {
            return Ok(Vec::new());
        }
        for filter in filters {
            if filter.field != KEY_COL_NAME && !self.has_column(&filter.field) {
                return Err(Error::ColumnNotFound(filter.field.clone(), self.name.clone()));
            }
        }
        let store = self.store()?;

        let mut key_sets: Vec<IndexSet<String>> = Vec::new();
        {
            let indexes = self.indexes.read().unwrap();
            for index in indexes.values() {
                for operator in Operator::ALL {
                    let mut probe = Vec::new();
                    for field in index.fields() {
                        let covering = filters
                            .iter()
                            .find(|f| f.operator == operator && &f.field == field);
                        match covering {
                            Some(filter) => probe.push(filter.value.clone()),
                            None => break,
                        }
                    }
                    if !probe.is_empty() {
                        key_sets.push(index.get_keys(operator, &probe));
                    }
                }
            }
        }

        let candidates: Vec<String> = match key_sets.split_first() {
            Some((first, rest)) => first
                .iter()
                .filter(|key| rest.iter().all(|set| set.contains(*key)))
                .cloned()
                .collect(),
            None => {
                debug!(table = %self.name, filters = filters.len(), "No usable index, scanning");
                store.keys()
            }
        };

        let mut records = Vec::with_capacity(candidates.len());
        for key in candidates {
            let Some(record) = self.find_record(&key)? else {
                continue;
            };
            let mut keep = true;
            for filter in filters {
                if !filter.matches(&record)? {
                    keep = false;
                    break;
                }
            }
            if keep {
                records.push(record);
            }
        }
        Ok(records)
    }

    // ========== Lifecycle ==========

    /// Release the storage, indexes and links. Only the owning registry can mint `token`.
    pub fn destroy(&self, token: &DestroyToken) -> Result<bool> {
        if self.owner != Some(token.registry_id()) {
            return Err(Error::ForbiddenAction(format!(
                "table '{}' must be destroyed through its registry",
                self.name
            )));
        }

        let store = self.store.write().unwrap().take();
        let Some(store) = store else {
            return Ok(false);
        };

        {
            let foreign_keys = self.foreign_keys.read().unwrap();
            for key in store.keys() {
                for fk in foreign_keys.values() {
                    fk.delete_from_foreign_index(&key);
                }
            }
        }
        for index in self.indexes.write().unwrap().values_mut() {
            index.clear();
        }
        store.clear();

        info!(table = %self.name, "Table destroyed");
        Ok(true)
    }
}

/// Composite index value of a row
fn composite(index: &Index, values: &IndexMap<String, Value>) -> Vec<Value> {
    index
        .fields()
        .iter()
        .map(|field| values.get(field).cloned().unwrap_or(Value::Null))
        .collect()
}

/// Iterator over a key snapshot of a table
pub struct TableIter<'a> {
    table: &'a Table,
    keys: std::vec::IntoIter<String>,
}

impl Iterator for TableIter<'_> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        for key in self.keys.by_ref() {
            match self.table.find_record(&key) {
                Ok(Some(record)) => return Some(Ok(record)),
                Ok(None) => continue,
                Err(e) => return Some(Err(e)),
            }
        }
        None
    }
}
