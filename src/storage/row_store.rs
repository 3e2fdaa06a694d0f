//! Row store for memrel
//!
//! A fixed-capacity concurrent key to row-image map. Each operation on a single row
//! is atomic; sequences of operations are not.

use bytes::Bytes;
use indexmap::IndexMap;
use std::sync::RwLock;

use crate::error::{Error, Result};

/// Fixed-capacity map from row key to encoded row image
#[derive(Debug)]
pub struct RowStore {
    /// Owning table name, used in errors
    table_name: String,
    /// Maximum number of live rows
    capacity: usize,
    /// Width every row image must have
    row_size: usize,
    /// Rows in insertion order
    rows: RwLock<IndexMap<String, Bytes>>,
}

impl RowStore {
    /// Allocate a store; spare buckets are reserved next to the capacity to limit rehashing
    pub fn new(
        table_name: impl Into<String>,
        capacity: usize,
        conflict_proportion: f32,
        row_size: usize,
    ) -> Self {
        let spare = (capacity as f64 * conflict_proportion.max(0.0) as f64).ceil() as usize;
        Self {
            table_name: table_name.into(),
            capacity,
            row_size,
            rows: RwLock::new(IndexMap::with_capacity(capacity + spare)),
        }
    }

    /// Maximum number of rows
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Get a row image
    pub fn get(&self, key: &str) -> Option<Bytes> {
        self.rows.read().unwrap().get(key).cloned()
    }

    /// Insert or overwrite a row; a new key is rejected once the store is full
    pub fn set(&self, key: &str, row: Bytes) -> Result<()> {
        if row.len() != self.row_size {
            return Err(Error::CorruptedRow(format!(
                "{}: expected {} bytes, got {}",
                key,
                self.row_size,
                row.len()
            )));
        }

        let mut rows = self.rows.write().unwrap();
        if let Some(slot) = rows.get_mut(key) {
            *slot = row;
            return Ok(());
        }
        if rows.len() >= self.capacity {
            return Err(Error::CapacityExceeded(self.table_name.clone(), self.capacity));
        }
        rows.insert(key.to_string(), row);
        Ok(())
    }

    /// Delete a row, keeping the order of the remaining rows
    pub fn del(&self, key: &str) -> Option<Bytes> {
        self.rows.write().unwrap().shift_remove(key)
    }

    /// Check if a key exists
    pub fn exists(&self, key: &str) -> bool {
        self.rows.read().unwrap().contains_key(key)
    }

    /// Number of live rows
    pub fn len(&self) -> usize {
        self.rows.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the current keys in store order
    pub fn keys(&self) -> Vec<String> {
        self.rows.read().unwrap().keys().cloned().collect()
    }

    /// Drop every row
    pub fn clear(&self) {
        self.rows.write().unwrap().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(byte: u8) -> Bytes {
        Bytes::from(vec![byte; 4])
    }

    #[test]
    fn test_set_get_del() {
        let store = RowStore::new("t", 4, 0.2, 4);
        store.set("a", image(1)).unwrap();
        assert!(store.exists("a"));
        assert_eq!(store.get("a"), Some(image(1)));

        store.set("a", image(2)).unwrap();
        assert_eq!(store.get("a"), Some(image(2)));
        assert_eq!(store.len(), 1);

        assert_eq!(store.del("a"), Some(image(2)));
        assert!(!store.exists("a"));
        assert_eq!(store.del("a"), None);
    }

    #[test]
    fn test_capacity_is_fixed() {
        let store = RowStore::new("t", 2, 0.2, 4);
        store.set("a", image(1)).unwrap();
        store.set("b", image(1)).unwrap();

        assert!(matches!(
            store.set("c", image(1)),
            Err(Error::CapacityExceeded(_, 2))
        ));
        // Overwrites still succeed when full
        store.set("b", image(3)).unwrap();
    }

    #[test]
    fn test_key_order_survives_delete() {
        let store = RowStore::new("t", 8, 0.0, 4);
        for key in ["k1", "k2", "k3", "k4"] {
            store.set(key, image(0)).unwrap();
        }
        store.del("k2");
        assert_eq!(store.keys(), vec!["k1", "k3", "k4"]);
    }

    #[test]
    fn test_row_width_checked() {
        let store = RowStore::new("t", 8, 0.0, 4);
        assert!(matches!(
            store.set("a", Bytes::from_static(b"xy")),
            Err(Error::CorruptedRow(_))
        ));
    }
}
