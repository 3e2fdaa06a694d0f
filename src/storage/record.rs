//! Records and result sets for memrel
//!
//! A `Record` is one decoded row, a `RecordCollection` is one joined tuple keyed by
//! table alias, and a `Resultset` is an ordered list of joined tuples.

use indexmap::IndexMap;
use std::cmp::Ordering;

use super::value::Value;
use crate::catalog::KEY_COL_NAME;
use crate::error::{Error, Result};
use crate::selector::{OrderByCollection, OrderDirection};

/// A decoded row
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    table: String,
    key: String,
    values: IndexMap<String, Value>,
}

impl Record {
    /// Create a record
    pub fn new(
        table: impl Into<String>,
        key: impl Into<String>,
        values: IndexMap<String, Value>,
    ) -> Self {
        Self {
            table: table.into(),
            key: key.into(),
            values,
        }
    }

    /// Table the record was read from
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Row key
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Decoded values in column order
    pub fn values(&self) -> &IndexMap<String, Value> {
        &self.values
    }

    /// Get a field; `_key` yields the row key
    pub fn get_value(&self, field: &str) -> Result<Value> {
        if field == KEY_COL_NAME {
            return Ok(Value::String(self.key.clone()));
        }
        self.values
            .get(field)
            .cloned()
            .ok_or_else(|| Error::ColumnNotFound(field.to_string(), self.table.clone()))
    }
}

/// One joined tuple: table alias to record, in join order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordCollection {
    records: IndexMap<String, Record>,
}

impl RecordCollection {
    /// Create an empty collection
    pub fn new() -> Self {
        Self::default()
    }

    /// Collection holding a single aliased record
    pub fn single(alias: impl Into<String>, record: Record) -> Self {
        let mut collection = Self::new();
        collection.insert(alias, record);
        collection
    }

    /// Add or replace the record under `alias`
    pub fn insert(&mut self, alias: impl Into<String>, record: Record) {
        self.records.insert(alias.into(), record);
    }

    /// Get the record under `alias`
    pub fn get(&self, alias: &str) -> Option<&Record> {
        self.records.get(alias)
    }

    /// Get the record under `alias`, failing when absent
    pub fn record(&self, alias: &str) -> Result<&Record> {
        self.get(alias)
            .ok_or_else(|| Error::AliasNotFound(alias.to_string()))
    }

    /// Resolve `alias.field`
    pub fn value(&self, alias: &str, field: &str) -> Result<Value> {
        self.record(alias)?.get_value(field)
    }

    /// Aliases in insertion order
    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        self.records.keys().map(String::as_str)
    }

    /// Iterate over (alias, record) pairs
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Record)> {
        self.records.iter().map(|(alias, record)| (alias.as_str(), record))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Ordered list of joined tuples
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Resultset {
    rows: Vec<RecordCollection>,
}

impl Resultset {
    /// Create an empty result set
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a tuple
    pub fn push(&mut self, collection: RecordCollection) {
        self.rows.push(collection);
    }

    /// Get a tuple by position
    pub fn get(&self, index: usize) -> Option<&RecordCollection> {
        self.rows.get(index)
    }

    /// Iterate over the tuples
    pub fn iter(&self) -> std::slice::Iter<'_, RecordCollection> {
        self.rows.iter()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Keep only tuples for which `keep` returns true, propagating the first error
    pub fn try_retain<F>(&mut self, mut keep: F) -> Result<()>
    where
        F: FnMut(&RecordCollection) -> Result<bool>,
    {
        let mut kept = Vec::with_capacity(self.rows.len());
        for row in self.rows.drain(..) {
            if keep(&row)? {
                kept.push(row);
            }
        }
        self.rows = kept;
        Ok(())
    }

    /// Stable multi-key sort. Every sort value is resolved before sorting, so an
    /// unknown alias or field fails the whole call and leaves the set untouched.
    pub fn order_by(&mut self, order_by: &OrderByCollection) -> Result<&mut Self> {
        if order_by.is_empty() {
            return Ok(self);
        }

        let mut sort_values = Vec::with_capacity(self.rows.len());
        for row in &self.rows {
            sort_values.push(
                order_by
                    .iter()
                    .map(|field| field.translate_get_value(row))
                    .collect::<Result<Vec<_>>>()?,
            );
        }
        let rows = std::mem::take(&mut self.rows);
        let mut keyed: Vec<(Vec<Value>, RecordCollection)> =
            sort_values.into_iter().zip(rows).collect();

        keyed.sort_by(|(a, _), (b, _)| {
            for (field, (va, vb)) in order_by.iter().zip(a.iter().zip(b.iter())) {
                let ord = va.sort_cmp(vb);
                if ord != Ordering::Equal {
                    return match field.direction {
                        OrderDirection::Ascending => ord,
                        OrderDirection::Descending => ord.reverse(),
                    };
                }
            }
            Ordering::Equal
        });

        self.rows = keyed.into_iter().map(|(_, row)| row).collect();
        Ok(self)
    }
}

impl IntoIterator for Resultset {
    type Item = RecordCollection;
    type IntoIter = std::vec::IntoIter<RecordCollection>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

impl<'a> IntoIterator for &'a Resultset {
    type Item = &'a RecordCollection;
    type IntoIter = std::slice::Iter<'a, RecordCollection>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

impl FromIterator<RecordCollection> for Resultset {
    fn from_iter<I: IntoIterator<Item = RecordCollection>>(iter: I) -> Self {
        Self {
            rows: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selector::OrderByField;

    fn tuple(key: &str, a: i64, b: i64) -> RecordCollection {
        let mut values = IndexMap::new();
        values.insert("a".to_string(), Value::Int(a));
        values.insert("b".to_string(), Value::Int(b));
        RecordCollection::single("t", Record::new("t", key, values))
    }

    fn pairs(set: &Resultset) -> Vec<(i64, i64)> {
        set.iter()
            .map(|row| {
                let a = row.value("t", "a").unwrap().as_i64().unwrap();
                let b = row.value("t", "b").unwrap().as_i64().unwrap();
                (a, b)
            })
            .collect()
    }

    #[test]
    fn test_record_key_field() {
        let record = Record::new("t", "k1", IndexMap::new());
        assert_eq!(record.get_value("_key").unwrap(), Value::from("k1"));
        assert!(matches!(
            record.get_value("missing"),
            Err(Error::ColumnNotFound(_, _))
        ));
    }

    #[test]
    fn test_multi_key_ascending() {
        let mut set: Resultset = vec![tuple("x", 2, 1), tuple("y", 1, 5), tuple("z", 1, 2)]
            .into_iter()
            .collect();
        let mut order = OrderByCollection::new();
        order.push(OrderByField::new("t", "a"));
        order.push(OrderByField::new("t", "b"));

        set.order_by(&order).unwrap();
        assert_eq!(pairs(&set), vec![(1, 2), (1, 5), (2, 1)]);
    }

    #[test]
    fn test_descending_and_key_ordering() {
        let mut set: Resultset = vec![tuple("b", 1, 0), tuple("c", 1, 0), tuple("a", 2, 0)]
            .into_iter()
            .collect();
        let mut order = OrderByCollection::new();
        order.push(OrderByField::new("t", "a").descending());
        order.push(OrderByField::new("t", "_key").descending());

        set.order_by(&order).unwrap();
        let keys: Vec<&str> = set.iter().map(|row| row.get("t").unwrap().key()).collect();
        assert_eq!(keys, vec!["a", "c", "b"]);
    }

    #[test]
    fn test_sort_is_stable() {
        let mut set: Resultset = vec![tuple("first", 1, 9), tuple("second", 1, 8)]
            .into_iter()
            .collect();
        let mut order = OrderByCollection::new();
        order.push(OrderByField::new("t", "a"));

        set.order_by(&order).unwrap();
        let keys: Vec<&str> = set.iter().map(|row| row.get("t").unwrap().key()).collect();
        assert_eq!(keys, vec!["first", "second"]);
    }

    #[test]
    fn test_unknown_alias_fails_fast() {
        let mut set: Resultset = vec![tuple("x", 1, 1), tuple("y", 2, 2)].into_iter().collect();
        let mut order = OrderByCollection::new();
        order.push(OrderByField::new("missing", "a"));

        assert!(matches!(set.order_by(&order), Err(Error::AliasNotFound(_))));
        assert_eq!(set.len(), 2);

        let mut order = OrderByCollection::new();
        order.push(OrderByField::new("t", "nope"));
        assert!(matches!(set.order_by(&order), Err(Error::ColumnNotFound(_, _))));
        assert_eq!(set.len(), 2);
    }
}
