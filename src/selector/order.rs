//! Result ordering for memrel selectors

use crate::error::Result;
use crate::storage::{RecordCollection, Value};

/// Sort direction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OrderDirection {
    #[default]
    Ascending,
    Descending,
}

/// One sort key: `alias.field` in a given direction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderByField {
    pub alias: String,
    pub field: String,
    pub direction: OrderDirection,
}

impl OrderByField {
    /// Ascending key on `alias.field`; `_key` sorts by row key
    pub fn new(alias: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            field: field.into(),
            direction: OrderDirection::Ascending,
        }
    }

    pub fn ascending(mut self) -> Self {
        self.direction = OrderDirection::Ascending;
        self
    }

    pub fn descending(mut self) -> Self {
        self.direction = OrderDirection::Descending;
        self
    }

    /// Value this key sorts a joined tuple by
    pub fn translate_get_value(&self, collection: &RecordCollection) -> Result<Value> {
        collection.value(&self.alias, &self.field)
    }
}

/// Ordered list of sort keys; earlier keys take precedence
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderByCollection {
    fields: Vec<OrderByField>,
}

impl OrderByCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a sort key
    pub fn push(&mut self, field: OrderByField) -> &mut Self {
        self.fields.push(field);
        self
    }

    pub fn iter(&self) -> std::slice::Iter<'_, OrderByField> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl FromIterator<OrderByField> for OrderByCollection {
    fn from_iter<I: IntoIterator<Item = OrderByField>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}
