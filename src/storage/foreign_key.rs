//! Foreign keys for memrel
//!
//! A declared foreign key and its reflection are two views over one
//! `ForeignKeyPair`. The pair owns both directional link maps behind a single lock,
//! so a link is always added to or removed from both directions at once.

use indexmap::{IndexMap, IndexSet};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::index::Operator;
use super::record::{Record, RecordCollection, Resultset};
use super::value::Value;
use crate::catalog::{TableRegistry, KEY_COL_NAME};
use crate::error::Result;

/// Side of the pair a view starts from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForeignKeyDirection {
    /// Declared direction: from the referencing table to the referenced one
    From,
    /// Reflected direction: from the referenced table back to the referencing one
    To,
}

#[derive(Debug, Default)]
struct Links {
    /// Referencing row key to referenced row keys
    forward: HashMap<String, IndexSet<String>>,
    /// Referenced row key to referencing row keys
    backward: HashMap<String, IndexSet<String>>,
}

impl Links {
    fn remove_all(
        primary: &mut HashMap<String, IndexSet<String>>,
        mirror: &mut HashMap<String, IndexSet<String>>,
        key: &str,
    ) -> usize {
        let Some(targets) = primary.remove(key) else {
            return 0;
        };
        for target in &targets {
            if let Some(sources) = mirror.get_mut(target) {
                sources.shift_remove(key);
                if sources.is_empty() {
                    mirror.remove(target);
                }
            }
        }
        targets.len()
    }
}

/// A foreign key declaration with both directional link maps
#[derive(Debug)]
pub struct ForeignKeyPair {
    name: String,
    from_table: String,
    from_field: String,
    to_table: String,
    to_field: String,
    links: Mutex<Links>,
}

impl ForeignKeyPair {
    /// Declare `from_table.from_field` as referencing `to_table.to_field`
    pub fn new(
        name: impl Into<String>,
        from_table: impl Into<String>,
        from_field: impl Into<String>,
        to_table: impl Into<String>,
        to_field: impl Into<String>,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            from_table: from_table.into(),
            from_field: from_field.into(),
            to_table: to_table.into(),
            to_field: to_field.into(),
            links: Mutex::new(Links::default()),
        })
    }

    /// Whether links target the referenced table's row key and are kept in the maps
    pub fn is_key_anchored(&self) -> bool {
        self.to_field == KEY_COL_NAME
    }

    /// Record `from_key -> to_key` in both directions
    pub fn link(&self, from_key: &str, to_key: &str) {
        let mut links = self.links.lock().unwrap();
        links
            .forward
            .entry(from_key.to_string())
            .or_default()
            .insert(to_key.to_string());
        links
            .backward
            .entry(to_key.to_string())
            .or_default()
            .insert(from_key.to_string());
    }

    /// Drop every link leaving `from_key`; returns the number of links removed
    pub fn unlink_from(&self, from_key: &str) -> usize {
        let mut links = self.links.lock().unwrap();
        let Links { forward, backward } = &mut *links;
        Links::remove_all(forward, backward, from_key)
    }

    /// Drop every link reaching `to_key`; returns the number of links removed
    pub fn unlink_to(&self, to_key: &str) -> usize {
        let mut links = self.links.lock().unwrap();
        let Links { forward, backward } = &mut *links;
        Links::remove_all(backward, forward, to_key)
    }

    fn forward_keys(&self, from_key: &str) -> Vec<String> {
        let links = self.links.lock().unwrap();
        links
            .forward
            .get(from_key)
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn backward_keys(&self, to_key: &str) -> Vec<String> {
        let links = self.links.lock().unwrap();
        links
            .backward
            .get(to_key)
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of stored links
    pub fn link_count(&self) -> usize {
        let links = self.links.lock().unwrap();
        links.forward.values().map(IndexSet::len).sum()
    }

    /// Whether `key` appears on either side of a stored link
    pub fn references(&self, key: &str) -> bool {
        let links = self.links.lock().unwrap();
        links.forward.contains_key(key)
            || links.backward.contains_key(key)
            || links.forward.values().any(|keys| keys.contains(key))
            || links.backward.values().any(|keys| keys.contains(key))
    }
}

/// One table's view of a foreign key pair
#[derive(Debug, Clone)]
pub struct ForeignKey {
    pair: Arc<ForeignKeyPair>,
    direction: ForeignKeyDirection,
}

impl ForeignKey {
    /// View `pair` in `direction`
    pub fn new(pair: Arc<ForeignKeyPair>, direction: ForeignKeyDirection) -> Self {
        Self { pair, direction }
    }

    /// Declared name of the pair
    pub fn name(&self) -> &str {
        &self.pair.name
    }

    pub fn direction(&self) -> ForeignKeyDirection {
        self.direction
    }

    /// Shared pair
    pub fn pair(&self) -> &Arc<ForeignKeyPair> {
        &self.pair
    }

    /// Table this view starts from
    pub fn from_table_name(&self) -> &str {
        match self.direction {
            ForeignKeyDirection::From => &self.pair.from_table,
            ForeignKeyDirection::To => &self.pair.to_table,
        }
    }

    /// Field this view starts from
    pub fn from_field(&self) -> &str {
        match self.direction {
            ForeignKeyDirection::From => &self.pair.from_field,
            ForeignKeyDirection::To => &self.pair.to_field,
        }
    }

    /// Table this view leads to
    pub fn to_table_name(&self) -> &str {
        match self.direction {
            ForeignKeyDirection::From => &self.pair.to_table,
            ForeignKeyDirection::To => &self.pair.from_table,
        }
    }

    /// Field this view leads to
    pub fn to_field(&self) -> &str {
        match self.direction {
            ForeignKeyDirection::From => &self.pair.to_field,
            ForeignKeyDirection::To => &self.pair.from_field,
        }
    }

    /// The opposite view over the same pair
    pub fn reflected(&self) -> ForeignKey {
        let direction = match self.direction {
            ForeignKeyDirection::From => ForeignKeyDirection::To,
            ForeignKeyDirection::To => ForeignKeyDirection::From,
        };
        ForeignKey::new(self.pair.clone(), direction)
    }

    /// Link a row of this view's table to a row of the other table, in both directions
    pub fn add_to_foreign_index(&self, from_key: &str, to_key: &str) {
        match self.direction {
            ForeignKeyDirection::From => self.pair.link(from_key, to_key),
            ForeignKeyDirection::To => self.pair.link(to_key, from_key),
        }
    }

    /// Drop every link of a row of this view's table, in both directions
    pub fn delete_from_foreign_index(&self, key: &str) -> usize {
        match self.direction {
            ForeignKeyDirection::From => self.pair.unlink_from(key),
            ForeignKeyDirection::To => self.pair.unlink_to(key),
        }
    }

    /// Keys of the rows related to `record` in the other table
    pub fn related_keys(&self, registry: &TableRegistry, record: &Record) -> Result<Vec<String>> {
        if self.pair.is_key_anchored() {
            return Ok(match self.direction {
                ForeignKeyDirection::From => self.pair.forward_keys(record.key()),
                ForeignKeyDirection::To => self.pair.backward_keys(record.key()),
            });
        }

        let value = record.get_value(self.from_field())?;
        if value.is_null() {
            return Ok(Vec::new());
        }

        let target = registry.get_table(self.to_table_name())?;
        if self.to_field() == KEY_COL_NAME {
            let key = value.to_string();
            return Ok(if target.exists(&key)? { vec![key] } else { Vec::new() });
        }
        let keys = target.index_lookup(&[self.to_field()], Operator::Equal, &[value])?;
        Ok(keys.into_iter().collect())
    }

    /// Related rows in the other table, each in its own collection under `alias`
    pub fn get_foreign_records(
        &self,
        registry: &TableRegistry,
        record: &Record,
        alias: &str,
    ) -> Result<Resultset> {
        let target = registry.get_table(self.to_table_name())?;
        let mut resultset = Resultset::new();
        for key in self.related_keys(registry, record)? {
            // Links may outlive a row deleted concurrently
            if let Some(related) = target.find_record(&key)? {
                resultset.push(RecordCollection::single(alias, related));
            }
        }
        Ok(resultset)
    }

    /// Link every existing row of the referencing table; returns the number of links made
    pub(crate) fn backfill(&self, rows: &[Record]) -> usize {
        let mut linked = 0;
        for row in rows {
            if let Some(target) =
                key_anchored_target(&self.pair.from_field, row.key(), row.values())
            {
                self.pair.link(row.key(), &target);
                linked += 1;
            }
        }
        linked
    }
}

/// Referenced key for a row of the referencing table, if the value is set
pub(crate) fn key_anchored_target(
    from_field: &str,
    key: &str,
    values: &IndexMap<String, Value>,
) -> Option<String> {
    if from_field == KEY_COL_NAME {
        return Some(key.to_string());
    }
    match values.get(from_field) {
        None | Some(Value::Null) => None,
        Some(other) => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair() -> Arc<ForeignKeyPair> {
        ForeignKeyPair::new("author", "post", "author_id", "user", KEY_COL_NAME)
    }

    #[test]
    fn test_views_are_mirrored() {
        let declared = ForeignKey::new(pair(), ForeignKeyDirection::From);
        let reflected = declared.reflected();

        assert_eq!(declared.from_table_name(), "post");
        assert_eq!(declared.to_table_name(), "user");
        assert_eq!(reflected.from_table_name(), "user");
        assert_eq!(reflected.from_field(), KEY_COL_NAME);
        assert_eq!(reflected.to_field(), "author_id");
        assert_eq!(reflected.reflected().direction(), ForeignKeyDirection::From);
    }

    #[test]
    fn test_link_is_symmetric() {
        let declared = ForeignKey::new(pair(), ForeignKeyDirection::From);
        declared.add_to_foreign_index("p1", "u1");
        declared.add_to_foreign_index("p2", "u1");

        let pair = declared.pair();
        assert_eq!(pair.forward_keys("p1"), vec!["u1"]);
        assert_eq!(pair.backward_keys("u1"), vec!["p1", "p2"]);

        // Linking through the reflection lands in the same maps
        declared.reflected().add_to_foreign_index("u2", "p3");
        assert_eq!(pair.forward_keys("p3"), vec!["u2"]);
        assert_eq!(pair.link_count(), 3);
    }

    #[test]
    fn test_delete_from_either_side() {
        let declared = ForeignKey::new(pair(), ForeignKeyDirection::From);
        declared.add_to_foreign_index("p1", "u1");
        declared.add_to_foreign_index("p2", "u1");

        assert_eq!(declared.delete_from_foreign_index("p1"), 1);
        assert!(!declared.pair().references("p1"));
        assert_eq!(declared.pair().backward_keys("u1"), vec!["p2"]);

        assert_eq!(declared.reflected().delete_from_foreign_index("u1"), 1);
        assert!(!declared.pair().references("u1"));
        assert!(!declared.pair().references("p2"));
        assert_eq!(declared.pair().link_count(), 0);
    }
}
